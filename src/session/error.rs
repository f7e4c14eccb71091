//! Session failure taxonomy.

use crate::capture::{DeviceError, HardwareError};
use crate::format::NegotiationError;
use thiserror::Error;

/// Coarse failure category, as seen by callers deciding whether to reopen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The device could not be acquired.
    Unavailable,
    /// The device rejected its configuration.
    Configuration,
    /// Another client took the device.
    Disconnected,
    /// The camera service died.
    Fatal,
    /// Any other hardware error.
    Transient,
}

/// Every way a session can fail. All of them end the session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The device could not be opened.
    #[error("camera unavailable: {0}")]
    DeviceUnavailable(String),
    /// Negotiation or applying parameters failed after open.
    #[error("camera configuration failed: {0}")]
    Configuration(String),
    /// Another client evicted this session.
    #[error("camera disconnected by another client")]
    Disconnected,
    /// The camera service died.
    #[error("Camera server died!")]
    FatalDevice,
    /// Any other hardware error code.
    #[error("Camera error: {code}")]
    TransientDevice {
        /// Driver error code.
        code: i32,
    },
}

impl SessionError {
    pub(crate) fn configuration(err: impl std::fmt::Display) -> Self {
        SessionError::Configuration(err.to_string())
    }

    /// Coarse classification for callers deciding whether to retry.
    pub fn category(&self) -> FailureKind {
        match self {
            SessionError::DeviceUnavailable(_) => FailureKind::Unavailable,
            SessionError::Configuration(_) => FailureKind::Configuration,
            SessionError::Disconnected => FailureKind::Disconnected,
            SessionError::FatalDevice => FailureKind::Fatal,
            SessionError::TransientDevice { .. } => FailureKind::Transient,
        }
    }

    /// True for errors where reopening the same device is likely to work.
    pub fn is_transient(&self) -> bool {
        matches!(self.category(), FailureKind::Transient | FailureKind::Disconnected)
    }

    /// True when the camera service itself is gone.
    pub fn is_fatal(&self) -> bool {
        self.category() == FailureKind::Fatal
    }
}

impl From<HardwareError> for SessionError {
    fn from(err: HardwareError) -> Self {
        match err {
            HardwareError::ServerDied => SessionError::FatalDevice,
            HardwareError::Evicted => SessionError::Disconnected,
            HardwareError::Other(code) => SessionError::TransientDevice { code },
        }
    }
}

impl From<NegotiationError> for SessionError {
    fn from(err: NegotiationError) -> Self {
        SessionError::configuration(err)
    }
}

impl From<DeviceError> for SessionError {
    fn from(err: DeviceError) -> Self {
        match err {
            DeviceError::NotFound(_) | DeviceError::OpenFailed(_) => {
                SessionError::DeviceUnavailable(err.to_string())
            }
            other => SessionError::configuration(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hardware_error_mapping() {
        assert_eq!(
            SessionError::from(HardwareError::from_code(2)),
            SessionError::Disconnected
        );
        assert_eq!(
            SessionError::from(HardwareError::from_code(100)),
            SessionError::FatalDevice
        );
        assert_eq!(
            SessionError::from(HardwareError::from_code(1)).to_string(),
            "Camera error: 1"
        );
    }

    #[test]
    fn test_device_error_mapping() {
        assert_eq!(
            SessionError::from(DeviceError::NotFound(4)).category(),
            FailureKind::Unavailable
        );
        assert_eq!(
            SessionError::from(DeviceError::Rejected("no".into())).category(),
            FailureKind::Configuration
        );
    }

    #[test]
    fn test_transient_classification() {
        assert!(SessionError::TransientDevice { code: 1 }.is_transient());
        assert!(!SessionError::FatalDevice.is_transient());
        assert!(!SessionError::Configuration("x".into()).is_transient());
        assert!(SessionError::FatalDevice.is_fatal());
        assert!(!SessionError::Disconnected.is_fatal());
    }
}
