//! Opaque-surface frame transport.
//!
//! In zero-copy mode the driver renders into a surface owned by the
//! transport, and the transport hands the session reference-counted
//! texture buffers. The session never touches pixels on this path.

use crate::format::Size;
use std::fmt;
use std::sync::Arc;

/// Opaque handle the device binds its preview output to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceTarget(pub u64);

/// Row-major 3x3 affine transform in normalized texture coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform(pub [f32; 9]);

impl Transform {
    /// Leaves coordinates unchanged.
    pub const IDENTITY: Transform = Transform([1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0]);

    /// Mirror about the vertical center line: `x -> 1 - x`.
    pub const fn horizontal_mirror() -> Transform {
        Transform([-1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0])
    }

    /// Returns `self * other`; `other` is applied to coordinates first.
    pub fn multiply(&self, other: &Transform) -> Transform {
        let a = &self.0;
        let b = &other.0;
        let mut out = [0.0f32; 9];
        for row in 0..3 {
            for col in 0..3 {
                out[row * 3 + col] = (0..3).map(|k| a[row * 3 + k] * b[k * 3 + col]).sum();
            }
        }
        Transform(out)
    }

    /// Maps a texture coordinate.
    pub fn apply(&self, x: f32, y: f32) -> (f32, f32) {
        let m = &self.0;
        (m[0] * x + m[1] * y + m[2], m[3] * x + m[4] * y + m[5])
    }
}

impl Default for Transform {
    fn default() -> Self {
        Transform::IDENTITY
    }
}

type ReleaseHook = Box<dyn FnOnce(u64) + Send + Sync>;

/// A transport-owned texture. Dropping the last reference hands it back.
pub struct TextureBuffer {
    id: u64,
    size: Size,
    on_release: Option<ReleaseHook>,
}

impl TextureBuffer {
    /// Wraps texture `id`. Nothing happens on drop until a hook is set.
    pub fn new(id: u64, size: Size) -> Self {
        Self {
            id,
            size,
            on_release: None,
        }
    }

    /// Runs `hook` with the texture id once the buffer is dropped.
    pub fn with_release<F>(mut self, hook: F) -> Self
    where
        F: FnOnce(u64) + Send + Sync + 'static,
    {
        self.on_release = Some(Box::new(hook));
        self
    }

    /// Transport-assigned id.
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Texture dimensions.
    #[inline]
    pub fn size(&self) -> Size {
        self.size
    }
}

impl Drop for TextureBuffer {
    fn drop(&mut self) {
        if let Some(hook) = self.on_release.take() {
            hook(self.id);
        }
    }
}

impl fmt::Debug for TextureBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextureBuffer")
            .field("id", &self.id)
            .field("size", &self.size)
            .finish()
    }
}

/// A frame as delivered by the transport.
#[derive(Debug, Clone)]
pub struct SurfaceFrame {
    /// Rendered texture.
    pub texture: Arc<TextureBuffer>,
    /// Sampling transform reported by the driver.
    pub transform: Transform,
    /// Render time on the monotonic clock.
    pub timestamp_ns: i64,
}

/// Listener installed by [`SurfaceFrameSource::start_listening`].
pub type FrameListener = Box<dyn Fn(SurfaceFrame) + Send + Sync>;

/// The zero-copy transport a session drives.
pub trait SurfaceFrameSource: Send + Sync {
    /// Surface the device should render into.
    fn target(&self) -> SurfaceTarget;

    /// Resizes the surface the device renders into.
    fn set_target_size(&self, width: u32, height: u32);

    /// Starts delivering frames. Replaces any previous listener.
    fn start_listening(&self, listener: FrameListener);

    /// Stops delivering frames and drops the listener.
    fn stop_listening(&self);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[test]
    fn test_mirror_flips_x() {
        let mirror = Transform::horizontal_mirror();
        assert_eq!(mirror.apply(0.0, 0.25), (1.0, 0.25));
        assert_eq!(mirror.apply(0.75, 0.5), (0.25, 0.5));
    }

    #[test]
    fn test_identity_multiply() {
        let mirror = Transform::horizontal_mirror();
        assert_eq!(Transform::IDENTITY.multiply(&mirror), mirror);
        assert_eq!(mirror.multiply(&mirror), Transform::IDENTITY);
    }

    #[test]
    fn test_release_hook_runs_on_last_drop() {
        let released = Arc::new(AtomicU64::new(0));
        let seen = Arc::clone(&released);
        let texture = Arc::new(
            TextureBuffer::new(7, Size::new(4, 4)).with_release(move |id| {
                seen.store(id, Ordering::SeqCst);
            }),
        );
        let second = Arc::clone(&texture);

        drop(texture);
        assert_eq!(released.load(Ordering::SeqCst), 0);
        drop(second);
        assert_eq!(released.load(Ordering::SeqCst), 7);
    }
}
