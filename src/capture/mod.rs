//! Camera hardware abstraction and frame handling.
//!
//! This module defines the seams a capture session drives: the device
//! backend, the opaque-surface transport and the frames handed to event
//! sinks. Mock implementations of both collaborators live here too.

mod config;
mod device;
mod frame;
pub mod mock;
mod surface;

pub use config::{ConfigError, FileConfig, OutputConfig, SessionConfig, SimulationConfig};
pub use device::{
    AutoFocusCallback, BufferId, CameraBackend, CameraDevice, Capabilities, CaptureBuffer,
    DeviceError, DeviceInstanceId, ErrorCallback, FocusArea, FocusMode, HardwareError,
    PreviewCallback, Rect, Settings, CAMERA_ERROR_EVICTED, CAMERA_ERROR_SERVER_DIED,
    CAMERA_ERROR_UNKNOWN,
};
pub use frame::{monotonic_nanos, Frame, FrameBuffer, RawBuffer, TextureFrame};
pub use mock::{MockBackend, MockCameraSpec, MockDevice, MockFaults, MockSurfaceSource};
pub use surface::{
    FrameListener, SurfaceFrame, SurfaceFrameSource, SurfaceTarget, TextureBuffer, Transform,
};
