//! Camera Session CLI
//!
//! Opens a capture session against a simulated camera, feeds it frames and
//! logs what the session reports.

use camera_session::{
    capture::{ConfigError, FileConfig, Frame, MockBackend, MockSurfaceSource},
    metrics::{MetricsError, MetricsRegistry},
    session::{CameraEvents, CameraSession, CameraThread, SessionContext, SessionError},
};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Run a camera capture session on a simulated device.
#[derive(Debug, Parser)]
#[command(name = "camera-session", version, about)]
struct Args {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Stop after this many frames.
    #[arg(short = 'n', long)]
    frames: Option<u32>,

    /// Run until interrupted.
    #[arg(long)]
    continuous: bool,

    #[arg(long)]
    camera_id: Option<u32>,

    #[arg(long)]
    width: Option<u32>,

    #[arg(long)]
    height: Option<u32>,

    #[arg(long)]
    fps: Option<u32>,

    /// Capture to surface textures instead of raw buffers.
    #[arg(long)]
    texture: bool,

    /// Display rotation in degrees.
    #[arg(long)]
    rotation: Option<u32>,

    /// Port for the Prometheus endpoint (0 disables).
    #[arg(long)]
    metrics_port: Option<u16>,
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Metrics(#[from] MetricsError),
    #[error("failed to start camera thread: {0}")]
    Thread(#[from] std::io::Error),
    #[error("failed to install Ctrl-C handler: {0}")]
    Signal(#[from] ctrlc::Error),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("camera thread exited before the session opened")]
    ThreadExited,
}

/// Terminal notifications forwarded from the camera thread.
#[derive(Debug)]
enum Notice {
    Error(String),
    Disconnected,
    Closed,
}

struct LoggingEvents {
    registry: Arc<MetricsRegistry>,
    frames: AtomicU64,
    notices: flume::Sender<Notice>,
}

impl LoggingEvents {
    fn new(registry: Arc<MetricsRegistry>, notices: flume::Sender<Notice>) -> Self {
        Self {
            registry,
            frames: AtomicU64::new(0),
            notices,
        }
    }

    fn notify(&self, notice: Notice) {
        let _ = self.notices.send(notice);
    }
}

impl CameraEvents for LoggingEvents {
    fn on_camera_opening(&self) {
        info!("Camera opening");
        self.registry.record_event("opening");
    }

    fn on_frame_captured(&self, _session: &CameraSession, frame: &Frame) {
        let count = self.frames.fetch_add(1, Ordering::Relaxed) + 1;
        self.registry.record_event("frame");
        debug!(
            frame = count,
            width = frame.width(),
            height = frame.height(),
            rotation = frame.rotation(),
            timestamp_ns = frame.timestamp_ns(),
            "Frame captured"
        );
    }

    fn on_camera_error(&self, _session: &CameraSession, message: &str) {
        error!("Camera error: {}", message);
        self.registry.record_event("error");
        self.notify(Notice::Error(message.to_string()));
    }

    fn on_camera_disconnected(&self, _session: &CameraSession) {
        warn!("Camera disconnected");
        self.registry.record_event("disconnected");
        self.notify(Notice::Disconnected);
    }

    fn on_camera_closed(&self, _session: &CameraSession) {
        info!("Camera closed");
        self.registry.record_event("closed");
        self.notify(Notice::Closed);
    }
}

fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();
    info!("Camera Session v{}", camera_session::VERSION);

    if let Err(e) = run(args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn load_config(args: &Args) -> Result<FileConfig, CliError> {
    let mut config = match &args.config {
        Some(path) => FileConfig::from_file(path)?,
        None => FileConfig::default(),
    };

    let session = &mut config.session;
    if let Some(id) = args.camera_id {
        session.camera_id = id;
    }
    if let Some(width) = args.width {
        session.width = width;
    }
    if let Some(height) = args.height {
        session.height = height;
    }
    if let Some(fps) = args.fps {
        session.framerate = fps;
    }
    if let Some(rotation) = args.rotation {
        session.display_rotation = rotation;
    }
    if args.texture {
        session.capture_to_texture = true;
    }
    session.validate()?;

    if let Some(frames) = args.frames {
        config.output.frame_count = frames;
    }
    if args.continuous {
        config.output.continuous = true;
    }
    if let Some(port) = args.metrics_port {
        config.output.metrics_port = port;
    }
    Ok(config)
}

fn run(args: Args) -> Result<(), CliError> {
    let config = load_config(&args)?;
    let registry = Arc::new(MetricsRegistry::new()?);
    start_metrics_server(Arc::clone(&registry), config.output.metrics_port);

    let backend = Arc::new(
        MockBackend::new().with_camera(config.session.camera_id, config.simulation.spec()),
    );
    let surface = Arc::new(MockSurfaceSource::new());
    let (notice_tx, notice_rx) = flume::unbounded();
    let events = Arc::new(LoggingEvents::new(Arc::clone(&registry), notice_tx));

    let rotation = config.session.display_rotation;
    let context = SessionContext::new(backend.clone(), surface.clone(), events.clone())
        .with_stats(registry.clone())
        .with_display_rotation(move || rotation);

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = Arc::clone(&running);
        ctrlc::set_handler(move || running.store(false, Ordering::SeqCst))?;
    }

    let (thread, worker) = CameraThread::spawn("camera")?;
    let (open_tx, open_rx) = flume::bounded(1);
    CameraSession::create(&thread, context, config.session.request(), move |result| {
        let _ = open_tx.send(result);
    });
    let session = open_rx.recv().map_err(|_| CliError::ThreadExited)??;
    info!(
        format = %session.capture_format(),
        picture = %session.picture_size(),
        texture = session.captures_to_texture(),
        "Session started"
    );

    let device = backend.last_opened();
    let simulation = &config.simulation;
    let output = &config.output;
    let interval = Duration::from_secs_f64(1.0 / f64::from(config.session.framerate));
    let mut delivered = 0u32;

    while running.load(Ordering::SeqCst)
        && (output.continuous || delivered < output.frame_count)
    {
        if let Ok(notice) = notice_rx.try_recv() {
            info!(?notice, "Session ended");
            break;
        }

        let sent = if session.captures_to_texture() {
            surface.deliver_frame()
        } else {
            device.as_ref().is_some_and(|device| device.deliver_frame())
        };
        if sent {
            delivered += 1;
            if simulation.error_after_frames > 0 && delivered == simulation.error_after_frames {
                if let Some(device) = &device {
                    warn!(code = simulation.error_code, "Injecting hardware error");
                    device.raise_error(simulation.error_code);
                }
            }
        }
        std::thread::sleep(interval);
    }

    let stopping = session.clone();
    if thread.invoke(move || stopping.stop()).is_none() {
        warn!("Camera thread exited before stop");
    }
    thread.shutdown();
    if worker.join().is_err() {
        warn!("Camera thread panicked");
    }

    info!(
        delivered,
        captured = events.frames.load(Ordering::Relaxed),
        buffers = ?session.buffer_stats(),
        "Done"
    );
    println!("{}", registry.encode()?);
    Ok(())
}

#[cfg(feature = "metrics")]
fn start_metrics_server(registry: Arc<MetricsRegistry>, port: u16) {
    use camera_session::metrics::{MetricsServer, MetricsServerConfig};

    if port == 0 {
        return;
    }
    std::thread::spawn(move || {
        let runtime = match tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(e) => {
                warn!(error = %e, "Failed to start metrics runtime");
                return;
            }
        };
        let server = MetricsServer::new(MetricsServerConfig::with_port(port), registry);
        if let Err(e) = runtime.block_on(server.run()) {
            warn!(error = %e, "Metrics server stopped");
        }
    });
}

#[cfg(not(feature = "metrics"))]
fn start_metrics_server(_registry: Arc<MetricsRegistry>, port: u16) {
    debug!(port, "Built without the metrics feature, not serving metrics");
}
