//! Output rotation for captured frames.
//!
//! The device is told not to rotate its preview, so every frame carries
//! the rotation a consumer has to apply instead.

use serde::{Deserialize, Serialize};

/// Which way a camera faces relative to the display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Facing {
    /// Faces the user. Preview is mirrored.
    Front,
    /// Faces away from the user.
    Back,
    /// Attached camera with no fixed mounting; rotated like a front camera.
    External,
}

/// Mounting information read once when a device is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Facing of the sensor.
    pub facing: Facing,
    /// Clockwise angle the sensor image must be rotated to appear upright
    /// in the display's natural orientation.
    pub mount_orientation: u32,
}

impl DeviceInfo {
    /// Creates mounting information.
    pub fn new(facing: Facing, mount_orientation: u32) -> Self {
        Self {
            facing,
            mount_orientation,
        }
    }

    /// Rotation for frames captured while the display is rotated by
    /// `display_rotation` degrees.
    #[inline]
    pub fn frame_rotation(&self, display_rotation: u32) -> u32 {
        compute_frame_rotation(self.facing, self.mount_orientation, display_rotation)
    }
}

/// Computes the rotation in `[0, 360)` to attach to a captured frame.
///
/// Front (and external) cameras add the display rotation directly; the
/// horizontal mirror is undone separately on the texture transform. Back
/// cameras rotate against the display.
pub fn compute_frame_rotation(facing: Facing, mount_orientation: u32, display_rotation: u32) -> u32 {
    let display = display_rotation % 360;
    let effective = match facing {
        Facing::Back => (360 - display) % 360,
        Facing::Front | Facing::External => display,
    };
    (mount_orientation % 360 + effective) % 360
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_back_camera_upright() {
        assert_eq!(compute_frame_rotation(Facing::Back, 90, 0), 90);
    }

    #[test]
    fn test_front_camera_wraps() {
        assert_eq!(compute_frame_rotation(Facing::Front, 270, 90), 0);
    }

    #[test]
    fn test_canonical_rotations() {
        let back: Vec<u32> = [0, 90, 180, 270]
            .iter()
            .map(|d| compute_frame_rotation(Facing::Back, 90, *d))
            .collect();
        assert_eq!(back, vec![90, 0, 270, 180]);

        let front: Vec<u32> = [0, 90, 180, 270]
            .iter()
            .map(|d| compute_frame_rotation(Facing::Front, 270, *d))
            .collect();
        assert_eq!(front, vec![270, 0, 90, 180]);
    }

    #[test]
    fn test_external_matches_front() {
        for display in [0, 90, 180, 270] {
            assert_eq!(
                compute_frame_rotation(Facing::External, 0, display),
                compute_frame_rotation(Facing::Front, 0, display)
            );
        }
    }

    #[test]
    fn test_device_info_helper() {
        let info = DeviceInfo::new(Facing::Back, 270);
        assert_eq!(info.frame_rotation(90), 180);
    }

    proptest! {
        #[test]
        fn rotation_in_range(mount in 0u32..720, display in 0u32..720, front in any::<bool>()) {
            let facing = if front { Facing::Front } else { Facing::Back };
            prop_assert!(compute_frame_rotation(facing, mount, display) < 360);
        }
    }
}
