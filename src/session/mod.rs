//! The capture session state machine.
//!
//! A session is opened asynchronously on its [`CameraThread`], runs until
//! [`CameraSession::stop`] or a hardware error, and is then discarded.
//! Frames arrive either as surface textures or as raw buffers from a
//! [`BufferRecycler`] pool, depending on the request.
//!
//! ```text
//! create ──► open ──► negotiate ──► RUNNING ──► stop / hardware error ──► STOPPED
//!              │           │
//!              └───────────┴──► failure callback (device released)
//! ```
//!
//! Device, surface and autofocus callbacks may fire on any thread. They
//! only post tasks to the camera thread. The error, preview and surface
//! registrations hold the session strongly, so a running session stays
//! alive without caller handles until it stops and releases the device.
//! Frame release hooks and autofocus completions hold weak references.

mod controls;
mod error;
mod events;
mod recycler;
mod thread;

pub use controls::{zoom_index, FOCUS_AREA_WEIGHT};
pub use error::{FailureKind, SessionError};
pub use events::CameraEvents;
pub use recycler::{BufferRecycler, BufferStats, Recycled, DEFAULT_BUFFER_COUNT};
pub use thread::CameraThread;

use crate::capture::{
    monotonic_nanos, CameraBackend, CameraDevice, Capabilities, CaptureBuffer, DeviceInstanceId,
    Frame, FrameBuffer, FocusMode, HardwareError, RawBuffer, SurfaceFrame, SurfaceFrameSource,
    TextureFrame, Transform,
};
use crate::format::{negotiate, resolution_sample, CaptureFormat, Size};
use crate::metrics::{NoopStats, StatsSink, RESOLUTION, START_TIME_MS, STOP_TIME_MS};
use crate::orientation::{DeviceInfo, Facing};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Lifecycle state of an opened session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Capturing. Frames and errors are delivered.
    Running,
    /// Terminal. The device has been released.
    Stopped,
}

/// What to open and how to capture from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionRequest {
    /// Backend camera id.
    pub camera_id: u32,
    /// Requested preview width; the closest supported size is used.
    pub width: u32,
    /// Requested preview height.
    pub height: u32,
    /// Frames per second.
    pub framerate: u32,
    /// Deliver surface textures instead of raw buffers.
    pub capture_to_texture: bool,
    /// Raw buffers kept in rotation with the device.
    pub buffer_count: usize,
}

impl SessionRequest {
    /// Raw-buffer capture with the default pool size.
    pub fn new(camera_id: u32, width: u32, height: u32, framerate: u32) -> Self {
        Self {
            camera_id,
            width,
            height,
            framerate,
            capture_to_texture: false,
            buffer_count: DEFAULT_BUFFER_COUNT,
        }
    }

    /// Selects texture (`true`) or raw-buffer (`false`) delivery.
    pub fn to_texture(mut self, capture_to_texture: bool) -> Self {
        self.capture_to_texture = capture_to_texture;
        self
    }
}

/// Returns the current display rotation in degrees.
pub type DisplayRotation = Arc<dyn Fn() -> u32 + Send + Sync>;

/// Collaborators a session is opened against.
#[derive(Clone)]
pub struct SessionContext {
    /// Opens the device.
    pub backend: Arc<dyn CameraBackend>,
    /// Texture transport, used only in texture mode.
    pub surface: Arc<dyn SurfaceFrameSource>,
    /// Receives lifecycle notifications and frames.
    pub events: Arc<dyn CameraEvents>,
    /// Receives timing and resolution samples.
    pub stats: Arc<dyn StatsSink>,
    /// Queried for every frame.
    pub display_rotation: DisplayRotation,
}

impl SessionContext {
    /// Context with no stats and an unrotated display.
    pub fn new(
        backend: Arc<dyn CameraBackend>,
        surface: Arc<dyn SurfaceFrameSource>,
        events: Arc<dyn CameraEvents>,
    ) -> Self {
        Self {
            backend,
            surface,
            events,
            stats: Arc::new(NoopStats),
            display_rotation: Arc::new(|| 0),
        }
    }

    /// Replaces the stats sink.
    pub fn with_stats(mut self, stats: Arc<dyn StatsSink>) -> Self {
        self.stats = stats;
        self
    }

    /// Replaces the display rotation source.
    pub fn with_display_rotation<F>(mut self, rotation: F) -> Self
    where
        F: Fn() -> u32 + Send + Sync + 'static,
    {
        self.display_rotation = Arc::new(rotation);
        self
    }
}

struct Inner {
    state: SessionState,
    device: Box<dyn CameraDevice>,
    recycler: Option<BufferRecycler>,
    first_frame_reported: bool,
}

struct Shared {
    thread: CameraThread,
    context: SessionContext,
    camera_id: u32,
    capture_to_texture: bool,
    device_id: DeviceInstanceId,
    info: DeviceInfo,
    capabilities: Capabilities,
    format: CaptureFormat,
    picture_size: Size,
    construction_time: Instant,
    inner: Mutex<Inner>,
}

/// Handle to an opened capture session. Clones refer to the same session.
#[derive(Clone)]
pub struct CameraSession {
    shared: Arc<Shared>,
}

/// Everything negotiated and applied before the session object exists.
struct Prepared {
    info: DeviceInfo,
    capabilities: Capabilities,
    format: CaptureFormat,
    picture_size: Size,
    recycler: Option<BufferRecycler>,
}

impl CameraSession {
    /// Opens a session on `thread` and reports the outcome to `callback`.
    ///
    /// Returns immediately; the open sequence, the callback and every later
    /// notification run on `thread`. On failure the device, if it was
    /// acquired, has been released before `callback` runs.
    pub fn create<F>(
        thread: &CameraThread,
        context: SessionContext,
        request: SessionRequest,
        callback: F,
    ) where
        F: FnOnce(Result<CameraSession, SessionError>) + Send + 'static,
    {
        let construction_time = Instant::now();
        let owner = thread.clone();
        thread.post(move || {
            let result = Self::open(owner, context, request, construction_time);
            if let Err(e) = &result {
                warn!(camera_id = request.camera_id, error = %e, "Failed to open camera");
            }
            callback(result);
        });
    }

    fn open(
        thread: CameraThread,
        context: SessionContext,
        request: SessionRequest,
        construction_time: Instant,
    ) -> Result<CameraSession, SessionError> {
        thread.check_is_current();
        info!(camera_id = request.camera_id, "Open camera");
        context.events.on_camera_opening();

        let mut device = match context.backend.open(request.camera_id) {
            Ok(Some(device)) => device,
            Ok(None) => {
                return Err(SessionError::DeviceUnavailable(format!(
                    "open returned no device for camera id = {}",
                    request.camera_id
                )))
            }
            Err(e) => return Err(SessionError::DeviceUnavailable(e.to_string())),
        };

        let prepared = match Self::prepare(device.as_mut(), &context, &request) {
            Ok(prepared) => prepared,
            Err(e) => {
                device.release();
                return Err(e);
            }
        };

        debug!(camera_id = request.camera_id, "Create new camera session");
        let format = prepared.format;
        let session = CameraSession {
            shared: Arc::new(Shared {
                thread,
                camera_id: request.camera_id,
                capture_to_texture: request.capture_to_texture,
                device_id: device.instance_id(),
                info: prepared.info,
                capabilities: prepared.capabilities,
                format,
                picture_size: prepared.picture_size,
                construction_time,
                inner: Mutex::new(Inner {
                    state: SessionState::Running,
                    device,
                    recycler: prepared.recycler,
                    first_frame_reported: false,
                }),
                context,
            }),
        };
        session
            .shared
            .context
            .surface
            .set_target_size(format.width, format.height);
        session.start_capturing();
        Ok(session)
    }

    /// Binds, negotiates and configures the device. The caller releases
    /// the device on error.
    fn prepare(
        device: &mut dyn CameraDevice,
        context: &SessionContext,
        request: &SessionRequest,
    ) -> Result<Prepared, SessionError> {
        device
            .set_preview_target(&context.surface.target())
            .map_err(SessionError::configuration)?;

        let info = device.info();
        let capabilities = device.capabilities().map_err(SessionError::configuration)?;

        let negotiated = negotiate(
            &capabilities.framerate_ranges,
            &capabilities.preview_sizes,
            &capabilities.picture_sizes,
            request.width,
            request.height,
            request.framerate,
        )?;
        let format = negotiated.format;
        context
            .stats
            .record_sample(RESOLUTION, resolution_sample(format.size()));

        let mut settings = device.settings().map_err(SessionError::configuration)?;
        settings.preview_fps_range = Some(format.framerate);
        settings.preview_size = Some(format.size());
        settings.picture_size = Some(negotiated.picture_size);
        if !request.capture_to_texture {
            settings.preview_format = Some(format.pixel_format);
        }
        if capabilities.video_stabilization_supported {
            settings.video_stabilization = true;
        }
        if capabilities.focus_modes.contains(&FocusMode::ContinuousVideo) {
            settings.focus_mode = FocusMode::ContinuousVideo;
        }
        device
            .apply_settings(&settings)
            .map_err(SessionError::configuration)?;
        debug!(
            preview = %format.size(),
            picture = %negotiated.picture_size,
            fps = %format.framerate,
            "Applied camera parameters"
        );

        let recycler = if request.capture_to_texture {
            None
        } else {
            let mut recycler =
                BufferRecycler::new(format.frame_size_bytes(), request.buffer_count.max(1));
            recycler.submit_all(device);
            Some(recycler)
        };

        // Rotation is attached to each frame instead.
        device
            .set_display_orientation(0)
            .map_err(SessionError::configuration)?;

        Ok(Prepared {
            info,
            capabilities,
            format,
            picture_size: negotiated.picture_size,
            recycler,
        })
    }

    fn start_capturing(&self) {
        debug!(camera_id = self.shared.camera_id, "Start capturing");
        self.shared.thread.check_is_current();

        // These registrations own the session until stop_internal releases
        // the device and the surface listener.
        {
            let mut inner = self.lock();
            let session = self.clone();
            inner.device.set_error_callback(Box::new(move |code, _source| {
                session.post(move |session| session.on_hardware_error(code));
            }));

            if !self.shared.capture_to_texture {
                let session = self.clone();
                inner
                    .device
                    .set_preview_callback(Box::new(move |buffer, source| {
                        session.post(move |session| session.on_preview_frame(buffer, source));
                    }));
            }
        }

        if self.shared.capture_to_texture {
            let session = self.clone();
            self.shared
                .context
                .surface
                .start_listening(Box::new(move |frame| {
                    session.post(move |session| session.on_texture_frame(frame));
                }));
        }

        let started = self.lock().device.start_preview();
        if let Err(e) = started {
            error!(camera_id = self.shared.camera_id, error = %e, "Failed to start preview");
            self.stop_internal();
            self.shared.context.events.on_camera_error(self, &e.to_string());
        }
    }

    /// Stops capture and releases the device.
    ///
    /// Must be called on the session's camera thread. Calling it again, or
    /// from inside an event callback, is a no-op.
    pub fn stop(&self) {
        debug!(camera_id = self.shared.camera_id, "Stop camera session");
        self.shared.thread.check_is_current();
        let started = Instant::now();
        if self.stop_internal() {
            let elapsed = started.elapsed().as_millis() as u64;
            self.shared.context.stats.record_sample(STOP_TIME_MS, elapsed);
        }
    }

    /// Returns false if the session was already stopped.
    fn stop_internal(&self) -> bool {
        debug!("Stop internal");
        self.shared.thread.check_is_current();
        {
            let mut inner = self.lock();
            if inner.state == SessionState::Stopped {
                debug!("Camera is already stopped");
                return false;
            }
            inner.state = SessionState::Stopped;
            self.shared.context.surface.stop_listening();
            inner.device.stop_preview();
            inner.device.release();
        }
        self.shared.context.events.on_camera_closed(self);
        info!(camera_id = self.shared.camera_id, "Stop done");
        true
    }

    fn on_hardware_error(&self, code: i32) {
        self.shared.thread.check_is_current();
        if self.state() == SessionState::Stopped {
            debug!(code, "Hardware error after stop ignored");
            return;
        }

        let hardware = HardwareError::from_code(code);
        error!(camera_id = self.shared.camera_id, code, "{}", hardware);
        self.stop_internal();

        let events = &self.shared.context.events;
        match SessionError::from(hardware) {
            SessionError::Disconnected => events.on_camera_disconnected(self),
            other => events.on_camera_error(self, &other.to_string()),
        }
    }

    fn on_texture_frame(&self, frame: SurfaceFrame) {
        self.shared.thread.check_is_current();
        if !self.begin_frame() {
            debug!("Texture frame captured but camera is no longer running.");
            return;
        }

        // Undo the mirror the driver applies to front camera previews.
        let transform = if self.shared.info.facing == Facing::Front {
            frame.transform.multiply(&Transform::horizontal_mirror())
        } else {
            frame.transform
        };
        let format = &self.shared.format;
        let modified = Frame::new(
            FrameBuffer::Texture(TextureFrame::new(
                frame.texture,
                transform,
                format.width,
                format.height,
            )),
            self.frame_rotation(),
            frame.timestamp_ns,
        );
        self.shared.context.events.on_frame_captured(self, &modified);
    }

    fn on_preview_frame(&self, buffer: CaptureBuffer, source: DeviceInstanceId) {
        self.shared.thread.check_is_current();

        if source != self.shared.device_id {
            error!(
                expected = self.shared.device_id.get(),
                actual = source.get(),
                "Callback from a different camera. This should never happen."
            );
            return;
        }

        {
            let mut inner = self.lock();
            if inner.state != SessionState::Running {
                debug!("Bytebuffer frame captured but camera is no longer running.");
                if let Some(recycler) = inner.recycler.as_mut() {
                    recycler.discard(buffer);
                }
                return;
            }
            let accepted = match inner.recycler.as_mut() {
                Some(recycler) => recycler.on_delivered(&buffer),
                None => false,
            };
            if !accepted {
                return;
            }
        }

        let capture_time_ns = monotonic_nanos();
        self.begin_frame();

        let (weak, thread) = self.callback_handles();
        let format = &self.shared.format;
        let raw = RawBuffer::new(buffer, format.width, format.height, move |buffer| {
            thread.post(move || match CameraSession::upgrade(&weak) {
                Some(session) => session.return_buffer(buffer),
                None => drop(buffer),
            });
        });
        let frame = Frame::new(FrameBuffer::Raw(raw), self.frame_rotation(), capture_time_ns);
        self.shared.context.events.on_frame_captured(self, &frame);
    }

    /// Checks the session is running and reports first-frame latency once.
    fn begin_frame(&self) -> bool {
        let first = {
            let mut inner = self.lock();
            if inner.state != SessionState::Running {
                return false;
            }
            !std::mem::replace(&mut inner.first_frame_reported, true)
        };
        if first {
            let elapsed = self.shared.construction_time.elapsed().as_millis() as u64;
            debug!(elapsed_ms = elapsed, "First frame");
            self.shared.context.stats.record_sample(START_TIME_MS, elapsed);
        }
        true
    }

    fn return_buffer(&self, buffer: CaptureBuffer) {
        self.shared.thread.check_is_current();
        let mut guard = self.lock();
        let Inner {
            state,
            device,
            recycler,
            ..
        } = &mut *guard;
        let Some(recycler) = recycler.as_mut() else {
            return;
        };
        let target: Option<&mut dyn CameraDevice> = if *state == SessionState::Running {
            Some(device.as_mut())
        } else {
            None
        };
        recycler.on_released(buffer, target);
    }

    fn frame_rotation(&self) -> u32 {
        self.shared
            .info
            .frame_rotation((self.shared.context.display_rotation)())
    }

    /// Runs `task` on the camera thread with a strong handle to this session.
    fn post<F>(&self, task: F)
    where
        F: FnOnce(&CameraSession) + Send + 'static,
    {
        let session = self.clone();
        self.shared.thread.post(move || task(&session));
    }

    fn callback_handles(&self) -> (Weak<Shared>, CameraThread) {
        (Arc::downgrade(&self.shared), self.shared.thread.clone())
    }

    fn upgrade(weak: &Weak<Shared>) -> Option<CameraSession> {
        weak.upgrade().map(|shared| CameraSession { shared })
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.shared
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.lock().state
    }

    /// Shorthand for `state() == SessionState::Running`.
    pub fn is_running(&self) -> bool {
        self.state() == SessionState::Running
    }

    /// Preview size negotiated for this session.
    pub fn preview_size(&self) -> Size {
        self.shared.format.size()
    }

    /// Negotiated capture format.
    pub fn capture_format(&self) -> CaptureFormat {
        self.shared.format
    }

    /// Negotiated still picture size.
    pub fn picture_size(&self) -> Size {
        self.shared.picture_size
    }

    /// Facing and mount orientation of the device.
    pub fn device_info(&self) -> DeviceInfo {
        self.shared.info
    }

    /// Backend camera id this session opened.
    pub fn camera_id(&self) -> u32 {
        self.shared.camera_id
    }

    /// True if frames arrive as textures.
    pub fn captures_to_texture(&self) -> bool {
        self.shared.capture_to_texture
    }

    /// Raw buffer pool counters, `None` in texture mode.
    pub fn buffer_stats(&self) -> Option<BufferStats> {
        self.lock().recycler.as_ref().map(BufferRecycler::stats)
    }

    /// The camera thread this session is bound to.
    pub fn thread(&self) -> &CameraThread {
        &self.shared.thread
    }
}

impl fmt::Debug for CameraSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CameraSession")
            .field("camera_id", &self.shared.camera_id)
            .field("format", &self.shared.format)
            .field("capture_to_texture", &self.shared.capture_to_texture)
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod testing;
