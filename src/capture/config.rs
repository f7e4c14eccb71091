//! Capture session configuration.
//!
//! The request side of a session (which camera, what mode) plus the
//! simulated hardware used by the demo binary, loadable from TOML.

use super::device::Capabilities;
use super::mock::{MockCameraSpec, MockFaults};
use crate::orientation::{DeviceInfo, Facing};
use crate::session::SessionRequest;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration for one capture session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Camera id passed to the backend.
    pub camera_id: u32,
    /// Requested preview width in pixels.
    pub width: u32,
    /// Requested preview height in pixels.
    pub height: u32,
    /// Requested frames per second.
    pub framerate: u32,
    /// Deliver frames as surface textures instead of raw buffers.
    pub capture_to_texture: bool,
    /// Raw buffers kept in rotation with the device.
    pub buffer_count: usize,
    /// Current display rotation in degrees.
    pub display_rotation: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            camera_id: 0,
            width: 1280,
            height: 720,
            framerate: 30,
            capture_to_texture: false,
            buffer_count: 3,
            display_rotation: 0,
        }
    }
}

impl SessionConfig {
    /// Creates a new configuration with the specified dimensions.
    pub fn with_dimensions(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Default::default()
        }
    }

    /// Validates the configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::InvalidDimensions);
        }
        if self.framerate == 0 || self.framerate > 120 {
            return Err(ConfigError::InvalidFrameRate);
        }
        if self.buffer_count == 0 {
            return Err(ConfigError::InvalidBufferCount);
        }
        if self.display_rotation % 90 != 0 || self.display_rotation >= 360 {
            return Err(ConfigError::InvalidRotation(self.display_rotation));
        }
        Ok(())
    }

    /// The session request described by this configuration.
    pub fn request(&self) -> SessionRequest {
        SessionRequest {
            camera_id: self.camera_id,
            width: self.width,
            height: self.height,
            framerate: self.framerate,
            capture_to_texture: self.capture_to_texture,
            buffer_count: self.buffer_count,
        }
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// Width or height is zero.
    #[error("invalid frame dimensions")]
    InvalidDimensions,
    /// Frame rate outside 1..=120.
    #[error("invalid frame rate (must be 1-120 fps)")]
    InvalidFrameRate,
    /// Empty buffer pool requested.
    #[error("buffer count must be at least 1")]
    InvalidBufferCount,
    /// Display rotation is not a right angle.
    #[error("invalid display rotation {0} (must be 0, 90, 180 or 270)")]
    InvalidRotation(u32),
    /// The file could not be read.
    #[error("failed to read config file: {0}")]
    FileReadError(String),
    /// The file is not valid TOML for this schema.
    #[error("failed to parse config file: {0}")]
    ParseError(String),
}

/// Full configuration file format.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileConfig {
    /// `[session]` table.
    #[serde(default)]
    pub session: SessionConfig,
    /// `[simulation]` table.
    #[serde(default)]
    pub simulation: SimulationConfig,
    /// `[output]` table.
    #[serde(default)]
    pub output: OutputConfig,
}

/// Simulated camera served by the demo backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Facing of the simulated camera.
    pub facing: Facing,
    /// Mount orientation in degrees.
    pub mount_orientation: u32,
    /// Capabilities the simulated camera reports.
    pub capabilities: Capabilities,
    /// Hardware error code raised after this many frames (0 disables).
    pub error_after_frames: u32,
    /// Code raised by `error_after_frames`.
    pub error_code: i32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        let spec = MockCameraSpec::back();
        Self {
            facing: spec.info.facing,
            mount_orientation: spec.info.mount_orientation,
            capabilities: spec.capabilities,
            error_after_frames: 0,
            error_code: super::device::CAMERA_ERROR_UNKNOWN,
        }
    }
}

impl SimulationConfig {
    /// Mock camera described by this section.
    pub fn spec(&self) -> MockCameraSpec {
        MockCameraSpec {
            info: DeviceInfo::new(self.facing, self.mount_orientation),
            capabilities: self.capabilities.clone(),
            faults: MockFaults::default(),
        }
    }
}

/// Output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Run until interrupted (true) or for a fixed number of frames (false).
    pub continuous: bool,
    /// Number of frames to capture if not continuous.
    pub frame_count: u32,
    /// Metrics server port (0 to disable).
    pub metrics_port: u16,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            continuous: false,
            frame_count: 100,
            metrics_port: 9090,
        }
    }
}

impl FileConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileReadError(e.to_string()))?;
        Self::from_toml(&content)
    }

    /// Parses and validates configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: FileConfig =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.session.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::Size;

    #[test]
    fn test_default_config_valid() {
        let config = SessionConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_dimensions_invalid() {
        let mut config = SessionConfig::default();
        config.width = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidDimensions)
        ));
    }

    #[test]
    fn test_odd_rotation_invalid() {
        let mut config = SessionConfig::default();
        config.display_rotation = 45;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidRotation(45))
        ));
    }

    #[test]
    fn test_parse_file_config() {
        let config = FileConfig::from_toml(
            r#"
            [session]
            camera_id = 1
            width = 640
            height = 480
            capture_to_texture = true

            [simulation]
            facing = "front"
            mount_orientation = 270

            [simulation.capabilities]
            preview_sizes = [{ width = 640, height = 480 }]
            framerate_ranges = [{ min = 15000, max = 30000 }]

            [output]
            frame_count = 10
            "#,
        )
        .unwrap();

        assert_eq!(config.session.camera_id, 1);
        assert!(config.session.capture_to_texture);
        assert_eq!(config.session.framerate, 30);
        assert_eq!(config.simulation.facing, Facing::Front);
        assert_eq!(
            config.simulation.capabilities.preview_sizes,
            vec![Size::new(640, 480)]
        );
        assert_eq!(config.output.frame_count, 10);
        assert_eq!(config.output.metrics_port, 9090);
    }

    #[test]
    fn test_invalid_file_config_rejected() {
        let result = FileConfig::from_toml("[session]\nframerate = 0\n");
        assert!(matches!(result, Err(ConfigError::InvalidFrameRate)));
    }
}
