//! Camera device abstraction.
//!
//! A backend opens devices by id. An opened device exposes a read-only
//! capability snapshot, a mutable settings block and a handful of driver
//! entry points. Notifications from the driver are plain closures; they may
//! fire on any thread.

use super::surface::SurfaceTarget;
use crate::format::{FramerateRange, PixelFormat, Size};
use crate::orientation::DeviceInfo;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

/// Unspecified driver error.
pub const CAMERA_ERROR_UNKNOWN: i32 = 1;
/// Another client took the device.
pub const CAMERA_ERROR_EVICTED: i32 = 2;
/// The camera service process died.
pub const CAMERA_ERROR_SERVER_DIED: i32 = 100;

/// Errors raised by device and backend calls.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    /// No camera with this id.
    #[error("camera device not found: {0}")]
    NotFound(u32),
    /// The device exists but could not be acquired.
    #[error("failed to open camera: {0}")]
    OpenFailed(String),
    /// The preview surface could not be attached.
    #[error("failed to bind preview target: {0}")]
    BindFailed(String),
    /// A settings block or orientation was refused.
    #[error("camera rejected parameters: {0}")]
    Rejected(String),
    /// The driver would not start streaming.
    #[error("failed to start preview: {0}")]
    PreviewFailed(String),
    /// Called after [`CameraDevice::release`].
    #[error("camera has been released")]
    Released,
}

/// A hardware error reported asynchronously by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HardwareError {
    /// The camera service crashed.
    ServerDied,
    /// Another client took ownership of the device.
    Evicted,
    /// Any other driver error code.
    Other(i32),
}

impl HardwareError {
    /// Classifies a raw driver error code.
    pub fn from_code(code: i32) -> Self {
        match code {
            CAMERA_ERROR_SERVER_DIED => HardwareError::ServerDied,
            CAMERA_ERROR_EVICTED => HardwareError::Evicted,
            other => HardwareError::Other(other),
        }
    }

    /// The driver code this error was built from.
    pub fn code(&self) -> i32 {
        match self {
            HardwareError::ServerDied => CAMERA_ERROR_SERVER_DIED,
            HardwareError::Evicted => CAMERA_ERROR_EVICTED,
            HardwareError::Other(code) => *code,
        }
    }
}

impl fmt::Display for HardwareError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HardwareError::ServerDied => write!(f, "Camera server died!"),
            other => write!(f, "Camera error: {}", other.code()),
        }
    }
}

/// Identity of one opened device instance.
///
/// Every successful open yields a fresh id, so callbacks from a previous
/// instance of the same camera can be told apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceInstanceId(u64);

impl DeviceInstanceId {
    /// Allocates a process-unique id.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw value, for logging.
    pub fn get(&self) -> u64 {
        self.0
    }
}

/// Identifier of a pool buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(pub usize);

/// Memory the device writes raw preview frames into.
pub struct CaptureBuffer {
    id: BufferId,
    data: Vec<u8>,
}

impl CaptureBuffer {
    /// Allocates a zeroed buffer of `len` bytes.
    pub fn new(id: BufferId, len: usize) -> Self {
        Self {
            id,
            data: vec![0u8; len],
        }
    }

    /// Pool slot this buffer was allocated for.
    #[inline]
    pub fn id(&self) -> BufferId {
        self.id
    }

    /// Frame bytes.
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Mutable frame bytes, written by the driver.
    #[inline]
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Size in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True for a zero-length buffer.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl fmt::Debug for CaptureBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureBuffer")
            .field("id", &self.id)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// Focus behavior of the lens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FocusMode {
    /// One-shot autofocus, triggered by [`CameraDevice::auto_focus`].
    #[default]
    Auto,
    /// Continuous focus tuned for video.
    ContinuousVideo,
    /// Continuous focus tuned for stills.
    ContinuousPicture,
    /// Fixed-focus lens.
    Fixed,
    /// Focus locked at infinity.
    Infinity,
    /// Close-up focus.
    Macro,
}

/// Rectangle in driver coordinates, `[-1000, 1000]` on both axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    /// Left edge.
    pub left: i32,
    /// Top edge.
    pub top: i32,
    /// Right edge.
    pub right: i32,
    /// Bottom edge.
    pub bottom: i32,
}

impl Rect {
    /// Creates a rectangle from its edges.
    pub const fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }
}

/// Weighted focus or metering region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FocusArea {
    /// Region in driver coordinates.
    pub rect: Rect,
    /// 1..=1000
    pub weight: u32,
}

impl FocusArea {
    /// Creates a weighted region.
    pub fn new(rect: Rect, weight: u32) -> Self {
        Self { rect, weight }
    }
}

/// What a device reports it can do. Read once per open.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Capabilities {
    /// Sizes the preview stream can produce.
    pub preview_sizes: Vec<Size>,
    /// Sizes still capture can produce.
    pub picture_sizes: Vec<Size>,
    /// Supported preview framerate ranges.
    pub framerate_ranges: Vec<FramerateRange>,
    /// Supported focus modes.
    pub focus_modes: Vec<FocusMode>,
    /// Whether [`Settings::zoom`] has any effect.
    pub zoom_supported: bool,
    /// Zoom ratios in hundredths, one per zoom index.
    pub zoom_ratios: Vec<u32>,
    /// Whether the driver can stabilize video.
    pub video_stabilization_supported: bool,
    /// Focus regions the driver accepts. Zero disables [`Settings::focus_areas`].
    pub max_focus_areas: u32,
    /// Metering regions the driver accepts.
    pub max_metering_areas: u32,
}

/// Parameters applied to a device.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settings {
    /// Preview framerate range; `None` keeps the driver default.
    pub preview_fps_range: Option<FramerateRange>,
    /// Preview frame size.
    pub preview_size: Option<Size>,
    /// Still picture size.
    pub picture_size: Option<Size>,
    /// Raw buffer layout; unset in texture mode.
    pub preview_format: Option<PixelFormat>,
    /// Video stabilization on or off.
    pub video_stabilization: bool,
    /// Active focus mode.
    pub focus_mode: FocusMode,
    /// Focus regions, at most [`Capabilities::max_focus_areas`].
    pub focus_areas: Vec<FocusArea>,
    /// Metering regions, at most [`Capabilities::max_metering_areas`].
    pub metering_areas: Vec<FocusArea>,
    /// Index into [`Capabilities::zoom_ratios`].
    pub zoom: usize,
}

/// Receives asynchronous hardware error codes.
pub type ErrorCallback = Box<dyn Fn(i32, DeviceInstanceId) + Send + Sync>;
/// Receives filled raw buffers.
pub type PreviewCallback = Box<dyn Fn(CaptureBuffer, DeviceInstanceId) + Send + Sync>;
/// Receives the outcome of a one-shot autofocus.
pub type AutoFocusCallback = Box<dyn FnOnce(bool) + Send>;

/// Opens camera devices by id.
pub trait CameraBackend: Send + Sync {
    /// Acquires the device. `Ok(None)` means the platform handed back no
    /// device without raising.
    fn open(&self, camera_id: u32) -> Result<Option<Box<dyn CameraDevice>>, DeviceError>;
}

/// An opened camera device.
pub trait CameraDevice: Send {
    /// Identity of this opened instance.
    fn instance_id(&self) -> DeviceInstanceId;

    /// Mounting information.
    fn info(&self) -> DeviceInfo;

    /// Capability snapshot.
    fn capabilities(&self) -> Result<Capabilities, DeviceError>;

    /// Currently applied settings.
    fn settings(&self) -> Result<Settings, DeviceError>;

    /// Applies a full settings block.
    fn apply_settings(&mut self, settings: &Settings) -> Result<(), DeviceError>;

    /// Binds the preview output to an opaque surface.
    fn set_preview_target(&mut self, target: &SurfaceTarget) -> Result<(), DeviceError>;

    /// Rotation the driver applies to its own preview output.
    fn set_display_orientation(&mut self, degrees: u32) -> Result<(), DeviceError>;

    /// Queues a buffer to be filled by a later frame.
    fn add_callback_buffer(&mut self, buffer: CaptureBuffer);

    /// Registers the hardware error callback.
    fn set_error_callback(&mut self, callback: ErrorCallback);

    /// Registers the raw-buffer frame callback.
    fn set_preview_callback(&mut self, callback: PreviewCallback);

    /// Starts streaming frames.
    fn start_preview(&mut self) -> Result<(), DeviceError>;

    /// Stops streaming. Safe to call when not previewing.
    fn stop_preview(&mut self);

    /// Releases the device and drops every registered callback. No other
    /// call is valid afterwards.
    fn release(&mut self);

    /// Aborts a pending autofocus without invoking its callback.
    fn cancel_auto_focus(&mut self);

    /// Starts a one-shot autofocus.
    fn auto_focus(&mut self, callback: AutoFocusCallback);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hardware_error_classification() {
        assert_eq!(HardwareError::from_code(100), HardwareError::ServerDied);
        assert_eq!(HardwareError::from_code(2), HardwareError::Evicted);
        assert_eq!(HardwareError::from_code(1), HardwareError::Other(1));
        assert_eq!(HardwareError::from_code(42).code(), 42);
    }

    #[test]
    fn test_hardware_error_messages() {
        assert_eq!(HardwareError::ServerDied.to_string(), "Camera server died!");
        assert_eq!(HardwareError::Other(7).to_string(), "Camera error: 7");
    }

    #[test]
    fn test_instance_ids_unique() {
        assert_ne!(DeviceInstanceId::next(), DeviceInstanceId::next());
    }
}
