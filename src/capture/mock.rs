//! Scriptable in-memory camera hardware.
//!
//! Used by tests and by the demo binary. The mock records every call the
//! session makes and lets the caller inject frames, hardware errors and
//! autofocus completions. Callbacks are invoked on the calling thread with
//! no internal lock held.

use super::device::{
    AutoFocusCallback, BufferId, CameraBackend, CameraDevice, Capabilities, CaptureBuffer,
    DeviceError, DeviceInstanceId, FocusMode, Settings,
};
use super::surface::{FrameListener, SurfaceFrame, SurfaceFrameSource, SurfaceTarget, TextureBuffer, Transform};
use super::frame::monotonic_nanos;
use crate::format::{FramerateRange, Size};
use crate::orientation::{DeviceInfo, Facing};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Failures a mock camera can be told to produce.
#[derive(Debug, Clone, Default)]
pub struct MockFaults {
    /// `open` returns [`DeviceError::OpenFailed`].
    pub fail_open: bool,
    /// `open` returns `Ok(None)`.
    pub open_returns_none: bool,
    /// Binding the preview target fails.
    pub fail_bind: bool,
    /// Every settings block is rejected.
    pub reject_settings: bool,
    /// Setting the display orientation fails.
    pub fail_display_orientation: bool,
    /// `start_preview` fails.
    pub fail_start_preview: bool,
}

/// Static description of a mock camera.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MockCameraSpec {
    /// Facing and mount orientation.
    pub info: DeviceInfo,
    /// What the camera reports it supports.
    pub capabilities: Capabilities,
    /// Injected failures. Never loaded from configuration.
    #[serde(skip)]
    pub faults: MockFaults,
}

impl MockCameraSpec {
    /// A rear camera with a typical phone capability set.
    pub fn back() -> Self {
        Self {
            info: DeviceInfo::new(Facing::Back, 90),
            capabilities: Capabilities {
                preview_sizes: vec![
                    Size::new(320, 240),
                    Size::new(640, 480),
                    Size::new(1280, 720),
                    Size::new(1920, 1080),
                ],
                picture_sizes: vec![
                    Size::new(640, 480),
                    Size::new(1280, 960),
                    Size::new(2592, 1944),
                ],
                framerate_ranges: vec![
                    FramerateRange::new(15000, 15000),
                    FramerateRange::new(15000, 30000),
                    FramerateRange::new(30000, 30000),
                ],
                focus_modes: vec![FocusMode::Auto, FocusMode::ContinuousVideo, FocusMode::Fixed],
                zoom_supported: true,
                zoom_ratios: (0..10).map(|i| 100 + i * 50).collect(),
                video_stabilization_supported: true,
                max_focus_areas: 1,
                max_metering_areas: 1,
            },
            faults: MockFaults::default(),
        }
    }

    /// A selfie camera without zoom or focus areas.
    pub fn front() -> Self {
        let mut spec = Self::back();
        spec.info = DeviceInfo::new(Facing::Front, 270);
        spec.capabilities.focus_modes = vec![FocusMode::Fixed];
        spec.capabilities.zoom_supported = false;
        spec.capabilities.zoom_ratios.clear();
        spec.capabilities.video_stabilization_supported = false;
        spec.capabilities.max_focus_areas = 0;
        spec.capabilities.max_metering_areas = 0;
        spec
    }

    /// Replaces the injected failures.
    pub fn with_faults(mut self, faults: MockFaults) -> Self {
        self.faults = faults;
        self
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Backend serving a fixed set of mock cameras.
#[derive(Default)]
pub struct MockBackend {
    cameras: HashMap<u32, MockCameraSpec>,
    opened: Mutex<Vec<MockDevice>>,
}

impl MockBackend {
    /// A backend with no cameras.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a camera under `camera_id`.
    pub fn with_camera(mut self, camera_id: u32, spec: MockCameraSpec) -> Self {
        self.cameras.insert(camera_id, spec);
        self
    }

    /// Number of devices successfully opened.
    pub fn open_count(&self) -> usize {
        lock(&self.opened).len()
    }

    /// Handle to the most recently opened device.
    pub fn last_opened(&self) -> Option<MockDevice> {
        lock(&self.opened).last().cloned()
    }
}

impl CameraBackend for MockBackend {
    fn open(&self, camera_id: u32) -> Result<Option<Box<dyn CameraDevice>>, DeviceError> {
        let spec = self
            .cameras
            .get(&camera_id)
            .ok_or(DeviceError::NotFound(camera_id))?;

        if spec.faults.fail_open {
            return Err(DeviceError::OpenFailed(format!("camera {} is busy", camera_id)));
        }
        if spec.faults.open_returns_none {
            return Ok(None);
        }

        let device = MockDevice::new(spec.clone());
        lock(&self.opened).push(device.clone());
        tracing::debug!(camera_id, instance = device.id.get(), "MockBackend opened camera");
        Ok(Some(Box::new(device)))
    }
}

type SharedErrorCallback = Arc<dyn Fn(i32, DeviceInstanceId) + Send + Sync>;
type SharedPreviewCallback = Arc<dyn Fn(CaptureBuffer, DeviceInstanceId) + Send + Sync>;

#[derive(Default)]
struct MockDeviceState {
    settings: Settings,
    target: Option<SurfaceTarget>,
    display_orientation: Option<u32>,
    queued: VecDeque<CaptureBuffer>,
    buffers_added: usize,
    buffers_added_after_release: usize,
    apply_count: usize,
    error_callback: Option<SharedErrorCallback>,
    preview_callback: Option<SharedPreviewCallback>,
    auto_focus: Option<AutoFocusCallback>,
    auto_focus_count: usize,
    cancel_auto_focus_count: usize,
    previewing: bool,
    stop_preview_count: usize,
    release_count: usize,
    frame_counter: u8,
}

/// Handle to a mock device. Clones observe the same device.
#[derive(Clone)]
pub struct MockDevice {
    id: DeviceInstanceId,
    spec: Arc<MockCameraSpec>,
    state: Arc<Mutex<MockDeviceState>>,
}

impl MockDevice {
    /// Creates an open, idle device with a fresh instance id.
    pub fn new(spec: MockCameraSpec) -> Self {
        Self {
            id: DeviceInstanceId::next(),
            spec: Arc::new(spec),
            state: Arc::new(Mutex::new(MockDeviceState::default())),
        }
    }

    /// Instance id reported with every callback.
    pub fn id(&self) -> DeviceInstanceId {
        self.id
    }

    /// Fills the next queued buffer and delivers it as this device.
    ///
    /// Returns false if previewing is off or no buffer is queued.
    pub fn deliver_frame(&self) -> bool {
        self.deliver_frame_as(self.id)
    }

    /// Like [`MockDevice::deliver_frame`] but reports `source` as the
    /// originating device instance.
    pub fn deliver_frame_as(&self, source: DeviceInstanceId) -> bool {
        let (mut buffer, callback, fill) = {
            let mut state = lock(&self.state);
            if !state.previewing || state.release_count > 0 {
                return false;
            }
            let Some(callback) = state.preview_callback.clone() else {
                return false;
            };
            let Some(buffer) = state.queued.pop_front() else {
                return false;
            };
            state.frame_counter = state.frame_counter.wrapping_add(1);
            (buffer, callback, state.frame_counter)
        };
        buffer.data_mut().fill(fill);
        callback(buffer, source);
        true
    }

    /// Reports a hardware error code through the registered callback.
    pub fn raise_error(&self, code: i32) -> bool {
        let callback = lock(&self.state).error_callback.clone();
        match callback {
            Some(callback) => {
                callback(code, self.id);
                true
            }
            None => false,
        }
    }

    /// Completes a pending autofocus request.
    pub fn complete_auto_focus(&self, success: bool) -> bool {
        let callback = lock(&self.state).auto_focus.take();
        match callback {
            Some(callback) => {
                callback(success);
                true
            }
            None => false,
        }
    }

    /// Last applied settings.
    pub fn settings_snapshot(&self) -> Settings {
        lock(&self.state).settings.clone()
    }

    /// Bound preview target, if any.
    pub fn target(&self) -> Option<SurfaceTarget> {
        lock(&self.state).target
    }

    /// Last display orientation set.
    pub fn display_orientation(&self) -> Option<u32> {
        lock(&self.state).display_orientation
    }

    /// Buffers waiting to be filled.
    pub fn queued_buffers(&self) -> usize {
        lock(&self.state).queued.len()
    }

    /// Total `add_callback_buffer` calls.
    pub fn buffers_added(&self) -> usize {
        lock(&self.state).buffers_added
    }

    /// Buffers queued after the device was released.
    pub fn buffers_added_after_release(&self) -> usize {
        lock(&self.state).buffers_added_after_release
    }

    /// Settings blocks accepted.
    pub fn apply_count(&self) -> usize {
        lock(&self.state).apply_count
    }

    /// Autofocus requests started.
    pub fn auto_focus_count(&self) -> usize {
        lock(&self.state).auto_focus_count
    }

    /// Autofocus cancellations.
    pub fn cancel_auto_focus_count(&self) -> usize {
        lock(&self.state).cancel_auto_focus_count
    }

    /// True between a successful `start_preview` and `stop_preview`.
    pub fn is_previewing(&self) -> bool {
        lock(&self.state).previewing
    }

    /// `stop_preview` calls.
    pub fn stop_preview_count(&self) -> usize {
        lock(&self.state).stop_preview_count
    }

    /// `release` calls. More than one is a session bug.
    pub fn release_count(&self) -> usize {
        lock(&self.state).release_count
    }

    /// True once released.
    pub fn is_released(&self) -> bool {
        self.release_count() > 0
    }

    fn check_open(state: &MockDeviceState) -> Result<(), DeviceError> {
        if state.release_count > 0 {
            Err(DeviceError::Released)
        } else {
            Ok(())
        }
    }
}

impl CameraDevice for MockDevice {
    fn instance_id(&self) -> DeviceInstanceId {
        self.id
    }

    fn info(&self) -> DeviceInfo {
        self.spec.info
    }

    fn capabilities(&self) -> Result<Capabilities, DeviceError> {
        Self::check_open(&lock(&self.state))?;
        Ok(self.spec.capabilities.clone())
    }

    fn settings(&self) -> Result<Settings, DeviceError> {
        let state = lock(&self.state);
        Self::check_open(&state)?;
        Ok(state.settings.clone())
    }

    fn apply_settings(&mut self, settings: &Settings) -> Result<(), DeviceError> {
        let mut state = lock(&self.state);
        Self::check_open(&state)?;
        if self.spec.faults.reject_settings {
            return Err(DeviceError::Rejected("setParameters failed".into()));
        }
        let caps = &self.spec.capabilities;
        if let Some(size) = settings.preview_size {
            if !caps.preview_sizes.contains(&size) {
                return Err(DeviceError::Rejected(format!("unsupported preview size {}", size)));
            }
        }
        if let Some(range) = settings.preview_fps_range {
            if !caps.framerate_ranges.contains(&range) {
                return Err(DeviceError::Rejected(format!("unsupported fps range {}", range)));
            }
        }
        if caps.zoom_supported && settings.zoom >= caps.zoom_ratios.len().max(1) {
            return Err(DeviceError::Rejected(format!("zoom index {} out of range", settings.zoom)));
        }
        state.settings = settings.clone();
        state.apply_count += 1;
        Ok(())
    }

    fn set_preview_target(&mut self, target: &SurfaceTarget) -> Result<(), DeviceError> {
        if self.spec.faults.fail_bind {
            return Err(DeviceError::BindFailed("surface abandoned".into()));
        }
        lock(&self.state).target = Some(*target);
        Ok(())
    }

    fn set_display_orientation(&mut self, degrees: u32) -> Result<(), DeviceError> {
        if self.spec.faults.fail_display_orientation {
            return Err(DeviceError::Rejected("setDisplayOrientation failed".into()));
        }
        lock(&self.state).display_orientation = Some(degrees);
        Ok(())
    }

    fn add_callback_buffer(&mut self, buffer: CaptureBuffer) {
        let mut state = lock(&self.state);
        if state.release_count > 0 {
            state.buffers_added_after_release += 1;
            return;
        }
        state.buffers_added += 1;
        state.queued.push_back(buffer);
    }

    fn set_error_callback(&mut self, callback: super::device::ErrorCallback) {
        lock(&self.state).error_callback = Some(Arc::from(callback));
    }

    fn set_preview_callback(&mut self, callback: super::device::PreviewCallback) {
        lock(&self.state).preview_callback = Some(Arc::from(callback));
    }

    fn start_preview(&mut self) -> Result<(), DeviceError> {
        let mut state = lock(&self.state);
        Self::check_open(&state)?;
        if self.spec.faults.fail_start_preview {
            return Err(DeviceError::PreviewFailed("startPreview failed".into()));
        }
        state.previewing = true;
        Ok(())
    }

    fn stop_preview(&mut self) {
        let mut state = lock(&self.state);
        state.previewing = false;
        state.stop_preview_count += 1;
    }

    fn release(&mut self) {
        let mut state = lock(&self.state);
        state.release_count += 1;
        state.previewing = false;
        state.queued.clear();
        state.error_callback = None;
        state.preview_callback = None;
        state.auto_focus = None;
    }

    fn cancel_auto_focus(&mut self) {
        let mut state = lock(&self.state);
        state.cancel_auto_focus_count += 1;
        state.auto_focus = None;
    }

    fn auto_focus(&mut self, callback: AutoFocusCallback) {
        let mut state = lock(&self.state);
        state.auto_focus_count += 1;
        state.auto_focus = Some(callback);
    }
}

#[derive(Default)]
struct MockSurfaceState {
    size: Option<Size>,
    listener: Option<Arc<dyn Fn(SurfaceFrame) + Send + Sync>>,
    start_count: usize,
    stop_count: usize,
}

/// In-memory surface transport.
pub struct MockSurfaceSource {
    target: SurfaceTarget,
    state: Mutex<MockSurfaceState>,
    next_texture: AtomicU64,
    delivered: AtomicUsize,
    returned: Arc<AtomicUsize>,
}

impl MockSurfaceSource {
    /// A source with a fresh target and no listener.
    pub fn new() -> Self {
        static NEXT_TARGET: AtomicU64 = AtomicU64::new(1);
        Self {
            target: SurfaceTarget(NEXT_TARGET.fetch_add(1, Ordering::Relaxed)),
            state: Mutex::new(MockSurfaceState::default()),
            next_texture: AtomicU64::new(1),
            delivered: AtomicUsize::new(0),
            returned: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Produces a texture frame for the current listener.
    ///
    /// Returns false if nobody is listening.
    pub fn deliver_frame(&self) -> bool {
        let (listener, size) = {
            let state = lock(&self.state);
            match &state.listener {
                Some(listener) => (Arc::clone(listener), state.size.unwrap_or_default()),
                None => return false,
            }
        };
        let returned = Arc::clone(&self.returned);
        let id = self.next_texture.fetch_add(1, Ordering::Relaxed);
        let texture = TextureBuffer::new(id, size).with_release(move |_| {
            returned.fetch_add(1, Ordering::SeqCst);
        });
        self.delivered.fetch_add(1, Ordering::SeqCst);
        listener(SurfaceFrame {
            texture: Arc::new(texture),
            transform: Transform::IDENTITY,
            timestamp_ns: monotonic_nanos(),
        });
        true
    }

    /// Size requested by the session.
    pub fn target_size(&self) -> Option<Size> {
        lock(&self.state).size
    }

    /// True while a listener is registered.
    pub fn is_listening(&self) -> bool {
        lock(&self.state).listener.is_some()
    }

    /// `start_listening` calls.
    pub fn start_count(&self) -> usize {
        lock(&self.state).start_count
    }

    /// `stop_listening` calls.
    pub fn stop_count(&self) -> usize {
        lock(&self.state).stop_count
    }

    /// Textures handed out so far.
    pub fn delivered_textures(&self) -> usize {
        self.delivered.load(Ordering::SeqCst)
    }

    /// Textures whose last reference has been dropped.
    pub fn returned_textures(&self) -> usize {
        self.returned.load(Ordering::SeqCst)
    }
}

impl Default for MockSurfaceSource {
    fn default() -> Self {
        Self::new()
    }
}

impl SurfaceFrameSource for MockSurfaceSource {
    fn target(&self) -> SurfaceTarget {
        self.target
    }

    fn set_target_size(&self, width: u32, height: u32) {
        lock(&self.state).size = Some(Size::new(width, height));
    }

    fn start_listening(&self, listener: FrameListener) {
        let mut state = lock(&self.state);
        state.listener = Some(Arc::from(listener));
        state.start_count += 1;
    }

    fn stop_listening(&self) {
        let mut state = lock(&self.state);
        state.listener = None;
        state.stop_count += 1;
    }
}

/// Allocates a buffer outside any pool, for tests that feed devices by hand.
pub fn loose_buffer(id: usize, len: usize) -> CaptureBuffer {
    CaptureBuffer::new(BufferId(id), len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_open_unknown_camera() {
        let backend = MockBackend::new();
        assert!(matches!(backend.open(3), Err(DeviceError::NotFound(3))));
    }

    #[test]
    fn test_backend_open_failure_injected() {
        let faults = crate::capture::MockFaults {
            fail_open: true,
            ..Default::default()
        };
        let spec = MockCameraSpec::back().with_faults(faults);
        let backend = crate::capture::MockBackend::new().with_camera(0, spec);

        assert!(matches!(backend.open(0), Err(DeviceError::OpenFailed(_))));
        assert_eq!(backend.open_count(), 0);
    }

    #[test]
    fn test_backend_tracks_opened_devices() {
        let backend = MockBackend::new().with_camera(0, MockCameraSpec::back());
        let device = backend.open(0).unwrap().unwrap();

        assert_eq!(backend.open_count(), 1);
        assert_eq!(backend.last_opened().unwrap().id(), device.instance_id());
    }

    #[test]
    fn test_device_rejects_unsupported_size() {
        let mut device = MockDevice::new(MockCameraSpec::back());
        let settings = Settings {
            preview_size: Some(Size::new(123, 45)),
            ..Settings::default()
        };
        assert!(matches!(
            device.apply_settings(&settings),
            Err(DeviceError::Rejected(_))
        ));
    }

    #[test]
    fn test_released_device_ignores_buffers() {
        let mut device = MockDevice::new(MockCameraSpec::back());
        device.add_callback_buffer(loose_buffer(0, 8));
        device.release();
        device.add_callback_buffer(loose_buffer(1, 8));

        assert_eq!(device.queued_buffers(), 0);
        assert_eq!(device.buffers_added(), 1);
        assert_eq!(device.buffers_added_after_release(), 1);
        assert_eq!(device.settings(), Err(DeviceError::Released));
    }

    #[test]
    fn test_surface_without_listener() {
        let surface = MockSurfaceSource::new();
        assert!(!surface.deliver_frame());
        assert_eq!(surface.delivered_textures(), 0);
    }
}
