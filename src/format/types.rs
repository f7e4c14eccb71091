//! Value types describing what a device can be configured to produce.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A picture or preview size in pixels.
///
/// `Size::default()` is the zero size, reported before anything has been
/// negotiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Size {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Size {
    /// Creates a size from its dimensions.
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Total number of pixels.
    #[inline]
    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    /// Width divided by height, or `None` for a degenerate size.
    #[inline]
    pub fn aspect_ratio(&self) -> Option<f64> {
        if self.height == 0 {
            None
        } else {
            Some(f64::from(self.width) / f64::from(self.height))
        }
    }

    /// Returns true if either dimension is zero.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A frame rate range in device units (frames per second × 1000).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FramerateRange {
    /// Lower bound, fps × 1000.
    pub min: u32,
    /// Upper bound, fps × 1000.
    pub max: u32,
}

impl FramerateRange {
    /// Creates a range from bounds in device units.
    pub const fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }

    /// Midpoint of the range in frames per second.
    #[inline]
    pub fn midpoint_fps(&self) -> f64 {
        (f64::from(self.min) + f64::from(self.max)) / 2000.0
    }

    /// Width of the range in device units.
    #[inline]
    pub fn span(&self) -> u32 {
        self.max.saturating_sub(self.min)
    }
}

impl fmt::Display for FramerateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}:{}]", self.min, self.max)
    }
}

/// Pixel layout of raw preview buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    /// YCrCb 4:2:0 semi-planar, the default preview format.
    #[default]
    Nv21,
    /// YVU 4:2:0 planar.
    Yv12,
    /// YUV 4:2:2 packed.
    Yuyv,
}

impl PixelFormat {
    /// Bits used per pixel, averaged over the planes.
    pub fn bits_per_pixel(&self) -> u32 {
        match self {
            PixelFormat::Nv21 | PixelFormat::Yv12 => 12,
            PixelFormat::Yuyv => 16,
        }
    }
}

/// The concrete mode a device has been configured to capture in.
///
/// Immutable once negotiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureFormat {
    /// Preview width in pixels.
    pub width: u32,
    /// Preview height in pixels.
    pub height: u32,
    /// Framerate range applied to the device.
    pub framerate: FramerateRange,
    /// Layout of raw buffers.
    pub pixel_format: PixelFormat,
}

impl CaptureFormat {
    /// Creates a format with the default preview pixel format.
    pub fn new(width: u32, height: u32, framerate: FramerateRange) -> Self {
        Self {
            width,
            height,
            framerate,
            pixel_format: PixelFormat::default(),
        }
    }

    /// Preview size of this format.
    #[inline]
    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    /// Bytes needed to hold one raw frame.
    pub fn frame_size_bytes(&self) -> usize {
        let bits = u64::from(self.width)
            * u64::from(self.height)
            * u64::from(self.pixel_format.bits_per_pixel());
        (bits / 8) as usize
    }
}

impl fmt::Display for CaptureFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{}@{} {:?}",
            self.width, self.height, self.framerate, self.pixel_format
        )
    }
}

/// Resolutions tracked individually by the resolution stats sample.
pub const COMMON_RESOLUTIONS: [Size; 20] = [
    Size::new(160, 120),
    Size::new(240, 160),
    Size::new(320, 240),
    Size::new(400, 240),
    Size::new(480, 320),
    Size::new(640, 360),
    Size::new(640, 480),
    Size::new(768, 480),
    Size::new(854, 480),
    Size::new(800, 600),
    Size::new(960, 540),
    Size::new(960, 640),
    Size::new(1024, 576),
    Size::new(1024, 600),
    Size::new(1280, 720),
    Size::new(1280, 1024),
    Size::new(1920, 1080),
    Size::new(1920, 1440),
    Size::new(2560, 1440),
    Size::new(3840, 2160),
];

/// Enumeration value for a resolution: its 1-based position in
/// [`COMMON_RESOLUTIONS`], or 0 if it is not a common resolution.
pub fn resolution_sample(size: Size) -> u64 {
    COMMON_RESOLUTIONS
        .iter()
        .position(|common| *common == size)
        .map_or(0, |index| index as u64 + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nv21_frame_size() {
        let format = CaptureFormat::new(640, 480, FramerateRange::new(15000, 30000));
        assert_eq!(format.frame_size_bytes(), 640 * 480 * 3 / 2);
    }

    #[test]
    fn test_midpoint_in_fps() {
        let range = FramerateRange::new(15000, 30000);
        assert_eq!(range.midpoint_fps(), 22.5);
        assert_eq!(range.span(), 15000);
    }

    #[test]
    fn test_zero_size_default() {
        let size = Size::default();
        assert!(size.is_empty());
        assert_eq!(size.aspect_ratio(), None);
    }

    #[test]
    fn test_resolution_sample() {
        assert_eq!(resolution_sample(Size::new(160, 120)), 1);
        assert_eq!(resolution_sample(Size::new(1280, 720)), 15);
        assert_eq!(resolution_sample(Size::new(1234, 567)), 0);
    }
}
