//! Frame type handed to session event sinks.

use super::device::CaptureBuffer;
use super::surface::{TextureBuffer, Transform};
use once_cell::sync::Lazy;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

static CLOCK_EPOCH: Lazy<Instant> = Lazy::new(Instant::now);

/// Nanoseconds on the process-wide monotonic clock.
pub fn monotonic_nanos() -> i64 {
    CLOCK_EPOCH.elapsed().as_nanos() as i64
}

type RawReleaseHook = Box<dyn FnOnce(CaptureBuffer) + Send + Sync>;

struct RawBufferInner {
    buffer: Option<CaptureBuffer>,
    on_release: Option<RawReleaseHook>,
}

impl Drop for RawBufferInner {
    fn drop(&mut self) {
        if let (Some(buffer), Some(hook)) = (self.buffer.take(), self.on_release.take()) {
            hook(buffer);
        }
    }
}

/// A raw NV21 buffer borrowed from the device's buffer pool.
///
/// The buffer goes back to its owner when the last clone is dropped.
#[derive(Clone)]
pub struct RawBuffer {
    inner: Arc<RawBufferInner>,
    width: u32,
    height: u32,
}

impl RawBuffer {
    /// Wraps a filled pool buffer. `on_release` receives it back once the
    /// last clone is dropped.
    pub fn new<F>(buffer: CaptureBuffer, width: u32, height: u32, on_release: F) -> Self
    where
        F: FnOnce(CaptureBuffer) + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(RawBufferInner {
                buffer: Some(buffer),
                on_release: Some(Box::new(on_release)),
            }),
            width,
            height,
        }
    }

    /// Pixel bytes.
    pub fn data(&self) -> &[u8] {
        self.inner
            .buffer
            .as_ref()
            .map(CaptureBuffer::data)
            .unwrap_or(&[])
    }
}

/// A texture borrowed from the surface transport.
#[derive(Clone)]
pub struct TextureFrame {
    texture: Arc<TextureBuffer>,
    transform: Transform,
    width: u32,
    height: u32,
}

impl TextureFrame {
    /// Wraps a transport texture with the transform consumers should use.
    pub fn new(texture: Arc<TextureBuffer>, transform: Transform, width: u32, height: u32) -> Self {
        Self {
            texture,
            transform,
            width,
            height,
        }
    }

    /// Underlying texture.
    #[inline]
    pub fn texture(&self) -> &TextureBuffer {
        &self.texture
    }

    /// Transform to apply when sampling the texture.
    #[inline]
    pub fn transform(&self) -> Transform {
        self.transform
    }
}

/// Pixel storage of a frame.
#[derive(Clone)]
pub enum FrameBuffer {
    /// NV21 bytes in a pool buffer.
    Raw(RawBuffer),
    /// Zero-copy texture.
    Texture(TextureFrame),
}

impl FrameBuffer {
    /// Width in pixels.
    pub fn width(&self) -> u32 {
        match self {
            FrameBuffer::Raw(raw) => raw.width,
            FrameBuffer::Texture(texture) => texture.width,
        }
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        match self {
            FrameBuffer::Raw(raw) => raw.height,
            FrameBuffer::Texture(texture) => texture.height,
        }
    }
}

/// A single captured frame.
///
/// Cloning retains the underlying buffer; it is released when the last
/// clone is dropped.
#[derive(Clone)]
pub struct Frame {
    buffer: FrameBuffer,
    /// Clockwise rotation in degrees the consumer should apply.
    rotation: u32,
    /// Capture time on the monotonic clock.
    timestamp_ns: i64,
}

impl Frame {
    /// Creates a frame.
    pub fn new(buffer: FrameBuffer, rotation: u32, timestamp_ns: i64) -> Self {
        Self {
            buffer,
            rotation,
            timestamp_ns,
        }
    }

    /// Pixel storage.
    #[inline]
    pub fn buffer(&self) -> &FrameBuffer {
        &self.buffer
    }

    /// Width in pixels, before rotation.
    #[inline]
    pub fn width(&self) -> u32 {
        self.buffer.width()
    }

    /// Height in pixels, before rotation.
    #[inline]
    pub fn height(&self) -> u32 {
        self.buffer.height()
    }

    /// Clockwise rotation in degrees: 0, 90, 180 or 270.
    #[inline]
    pub fn rotation(&self) -> u32 {
        self.rotation
    }

    /// Capture time in nanoseconds on the monotonic clock.
    #[inline]
    pub fn timestamp_ns(&self) -> i64 {
        self.timestamp_ns
    }

    /// Raw pixel bytes, if this frame came from the raw-buffer path.
    pub fn raw_data(&self) -> Option<&[u8]> {
        match &self.buffer {
            FrameBuffer::Raw(raw) => Some(raw.data()),
            FrameBuffer::Texture(_) => None,
        }
    }

    /// Texture view, if this frame came from the surface transport.
    pub fn texture(&self) -> Option<&TextureFrame> {
        match &self.buffer {
            FrameBuffer::Texture(texture) => Some(texture),
            FrameBuffer::Raw(_) => None,
        }
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.buffer {
            FrameBuffer::Raw(_) => "raw",
            FrameBuffer::Texture(_) => "texture",
        };
        f.debug_struct("Frame")
            .field("kind", &kind)
            .field("width", &self.width())
            .field("height", &self.height())
            .field("rotation", &self.rotation)
            .field("timestamp_ns", &self.timestamp_ns)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::device::BufferId;
    use crate::format::Size;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_raw_release_after_last_clone() {
        let released = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&released);
        let buffer = CaptureBuffer::new(BufferId(0), 24);
        let raw = RawBuffer::new(buffer, 4, 4, move |returned| {
            assert_eq!(returned.id(), BufferId(0));
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let frame = Frame::new(FrameBuffer::Raw(raw), 90, 1);
        let retained = frame.clone();

        assert_eq!(frame.raw_data().map(<[u8]>::len), Some(24));
        drop(frame);
        assert_eq!(released.load(Ordering::SeqCst), 0);
        drop(retained);
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_texture_frame_accessors() {
        let texture = Arc::new(TextureBuffer::new(3, Size::new(640, 480)));
        let frame = Frame::new(
            FrameBuffer::Texture(TextureFrame::new(texture, Transform::IDENTITY, 640, 480)),
            0,
            5,
        );

        assert_eq!(frame.width(), 640);
        assert_eq!(frame.height(), 480);
        assert!(frame.raw_data().is_none());
        assert_eq!(frame.texture().map(|t| t.texture().id()), Some(3));
    }

    #[test]
    fn test_monotonic_clock_advances() {
        let a = monotonic_nanos();
        let b = monotonic_nanos();
        assert!(b >= a);
    }
}
