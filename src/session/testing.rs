//! Recording collaborators and a harness for session tests.

use super::{CameraEvents, CameraSession, CameraThread, SessionContext, SessionError, SessionRequest};
use crate::capture::{Frame, MockBackend, MockCameraSpec, MockDevice, MockSurfaceSource, Transform};
use crate::metrics::StatsSink;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Event {
    Opening,
    Frame {
        width: u32,
        height: u32,
        rotation: u32,
        raw: bool,
        transform: Option<Transform>,
    },
    Error(String),
    Disconnected,
    Closed,
}

#[derive(Default)]
pub(crate) struct RecordingEvents {
    events: Mutex<Vec<Event>>,
    retained: Mutex<Vec<Frame>>,
    retain_frames: bool,
    stop_on_frame: bool,
    stop_on_error: bool,
}

impl RecordingEvents {
    pub(crate) fn retaining() -> Self {
        Self {
            retain_frames: true,
            ..Self::default()
        }
    }

    pub(crate) fn stopping_on_frame() -> Self {
        Self {
            stop_on_frame: true,
            ..Self::default()
        }
    }

    pub(crate) fn stopping_on_error() -> Self {
        Self {
            stop_on_error: true,
            ..Self::default()
        }
    }

    pub(crate) fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub(crate) fn count(&self, matcher: impl Fn(&Event) -> bool) -> usize {
        self.events.lock().unwrap().iter().filter(|e| matcher(e)).count()
    }

    pub(crate) fn frames(&self) -> usize {
        self.count(|e| matches!(e, Event::Frame { .. }))
    }

    pub(crate) fn closed(&self) -> usize {
        self.count(|e| *e == Event::Closed)
    }

    /// Drops retained frames, releasing their buffers.
    pub(crate) fn release_retained(&self) -> usize {
        let frames: Vec<Frame> = std::mem::take(&mut *self.retained.lock().unwrap());
        frames.len()
    }

    fn push(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }
}

impl CameraEvents for RecordingEvents {
    fn on_camera_opening(&self) {
        self.push(Event::Opening);
    }

    fn on_frame_captured(&self, session: &CameraSession, frame: &Frame) {
        self.push(Event::Frame {
            width: frame.width(),
            height: frame.height(),
            rotation: frame.rotation(),
            raw: frame.raw_data().is_some(),
            transform: frame.texture().map(|t| t.transform()),
        });
        if self.retain_frames {
            self.retained.lock().unwrap().push(frame.clone());
        }
        if self.stop_on_frame {
            session.stop();
        }
    }

    fn on_camera_error(&self, session: &CameraSession, message: &str) {
        self.push(Event::Error(message.to_string()));
        if self.stop_on_error {
            session.stop();
        }
    }

    fn on_camera_disconnected(&self, _session: &CameraSession) {
        self.push(Event::Disconnected);
    }

    fn on_camera_closed(&self, _session: &CameraSession) {
        self.push(Event::Closed);
    }
}

#[derive(Default)]
pub(crate) struct RecordingStats {
    samples: Mutex<Vec<(String, u64)>>,
}

impl RecordingStats {
    pub(crate) fn count(&self, name: &str) -> usize {
        self.samples
            .lock()
            .unwrap()
            .iter()
            .filter(|(n, _)| n == name)
            .count()
    }

    pub(crate) fn last(&self, name: &str) -> Option<u64> {
        self.samples
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| *v)
    }
}

impl StatsSink for RecordingStats {
    fn record_sample(&self, name: &str, value: u64) {
        self.samples.lock().unwrap().push((name.to_string(), value));
    }
}

/// A manually driven camera thread with mock collaborators.
pub(crate) struct Harness {
    pub(crate) thread: CameraThread,
    pub(crate) backend: Arc<MockBackend>,
    pub(crate) surface: Arc<MockSurfaceSource>,
    pub(crate) events: Arc<RecordingEvents>,
    pub(crate) stats: Arc<RecordingStats>,
    pub(crate) display_rotation: u32,
}

impl Harness {
    pub(crate) fn new(spec: MockCameraSpec) -> Self {
        Self::with_events(spec, RecordingEvents::default())
    }

    pub(crate) fn with_events(spec: MockCameraSpec, events: RecordingEvents) -> Self {
        Self {
            thread: CameraThread::new("camera-test"),
            backend: Arc::new(MockBackend::new().with_camera(0, spec)),
            surface: Arc::new(MockSurfaceSource::new()),
            events: Arc::new(events),
            stats: Arc::new(RecordingStats::default()),
            display_rotation: 0,
        }
    }

    pub(crate) fn context(&self) -> SessionContext {
        let rotation = self.display_rotation;
        SessionContext::new(
            self.backend.clone(),
            self.surface.clone(),
            self.events.clone(),
        )
        .with_stats(self.stats.clone())
        .with_display_rotation(move || rotation)
    }

    /// Opens a session and drains the camera thread.
    pub(crate) fn open(&self, request: SessionRequest) -> Result<CameraSession, SessionError> {
        let slot = Arc::new(Mutex::new(None));
        let out = Arc::clone(&slot);
        CameraSession::create(&self.thread, self.context(), request, move |result| {
            *out.lock().unwrap() = Some(result);
        });
        self.thread.run_until_idle();
        let result = slot.lock().unwrap().take();
        result.expect("create callback did not run")
    }

    pub(crate) fn device(&self) -> MockDevice {
        self.backend.last_opened().expect("no device opened")
    }

    /// Runs `task` on the camera thread, then drains it.
    pub(crate) fn exec<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.thread.post(task);
        self.thread.run_until_idle();
    }

    pub(crate) fn run(&self) -> usize {
        self.thread.run_until_idle()
    }
}
