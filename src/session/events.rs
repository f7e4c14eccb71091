//! Notifications a session emits to its owner.

use super::CameraSession;
use crate::capture::Frame;

/// Receives session lifecycle and frame notifications.
///
/// All methods are called on the session's camera thread with no session
/// lock held, so implementations may call back into the session (for
/// example [`CameraSession::stop`] from `on_camera_error`).
pub trait CameraEvents: Send + Sync {
    /// The open sequence has started.
    fn on_camera_opening(&self);

    /// A frame is available. Clone it to keep it past this call.
    fn on_frame_captured(&self, session: &CameraSession, frame: &Frame);

    /// The session hit a hardware error and has been stopped.
    fn on_camera_error(&self, session: &CameraSession, message: &str);

    /// Another client took the device; the session has been stopped.
    fn on_camera_disconnected(&self, session: &CameraSession);

    /// The device has been released.
    fn on_camera_closed(&self, session: &CameraSession);
}
