//! Fixed pool of raw capture buffers.
//!
//! Buffers are allocated once, before capture starts, and then cycle
//! between the device (waiting to be filled) and consumers (wrapped in a
//! [`Frame`](crate::capture::Frame)). A released buffer goes back to the
//! device only while the session is running.
//!
//! The recycler remembers which ids it allocated. Buffers with other ids
//! are never counted or re-queued, and a pool buffer that comes back with
//! the wrong size leaves the pool for good.

use crate::capture::{BufferId, CameraDevice, CaptureBuffer};
use std::collections::HashSet;

/// Pool size used when a request does not specify one.
pub const DEFAULT_BUFFER_COUNT: usize = 3;

/// Counters describing where the pool's buffers are.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferStats {
    /// Pool buffers not yet retired.
    pub capacity: usize,
    /// Buffers queued with the device.
    pub with_device: usize,
    /// Buffers wrapped in frames not yet released.
    pub in_flight: usize,
    /// Releases that re-queued a buffer.
    pub resubmitted: u64,
    /// Buffers dropped instead of re-queued.
    pub discarded: u64,
}

/// What happened to a released buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recycled {
    /// Queued with the device again.
    Resubmitted,
    /// Freed.
    Discarded,
}

/// Owns the bookkeeping for a session's raw buffer pool.
#[derive(Debug)]
pub struct BufferRecycler {
    frame_size: usize,
    count: usize,
    allocated: bool,
    pool: HashSet<BufferId>,
    stats: BufferStats,
}

impl BufferRecycler {
    /// Creates an empty recycler for `count` buffers of `frame_size` bytes.
    /// Nothing is allocated until [`BufferRecycler::submit_all`].
    pub fn new(frame_size: usize, count: usize) -> Self {
        Self {
            frame_size,
            count,
            allocated: false,
            pool: HashSet::with_capacity(count),
            stats: BufferStats::default(),
        }
    }

    /// Allocates the pool and queues every buffer with the device.
    ///
    /// Only the first call allocates.
    pub fn submit_all(&mut self, device: &mut dyn CameraDevice) {
        if self.allocated {
            tracing::warn!("Buffer pool already allocated");
            return;
        }
        for index in 0..self.count {
            let id = BufferId(index);
            self.pool.insert(id);
            device.add_callback_buffer(CaptureBuffer::new(id, self.frame_size));
        }
        self.allocated = true;
        self.stats.capacity = self.count;
        self.stats.with_device = self.count;
        tracing::debug!(
            buffers = self.count,
            frame_size = self.frame_size,
            "Submitted capture buffers"
        );
    }

    /// Accounts for a buffer the device has filled.
    ///
    /// Returns false if the buffer is not a pool buffer of the expected
    /// size; the caller should drop it.
    pub fn on_delivered(&mut self, buffer: &CaptureBuffer) -> bool {
        if !self.owns(buffer) {
            tracing::warn!(buffer = buffer.id().0, "Dropping capture buffer not from this pool");
            return false;
        }
        self.stats.with_device = self.stats.with_device.saturating_sub(1);
        if buffer.len() != self.frame_size {
            tracing::warn!(
                buffer = buffer.id().0,
                len = buffer.len(),
                expected = self.frame_size,
                "Dropping capture buffer with unexpected size"
            );
            self.retire(buffer.id());
            return false;
        }
        self.stats.in_flight += 1;
        true
    }

    /// Hands a consumed buffer back. `device` is `Some` only while the
    /// session is running.
    pub fn on_released(
        &mut self,
        buffer: CaptureBuffer,
        device: Option<&mut dyn CameraDevice>,
    ) -> Recycled {
        if !self.owns(&buffer) {
            tracing::warn!(buffer = buffer.id().0, "Released buffer not from this pool");
            return Recycled::Discarded;
        }
        self.stats.in_flight = self.stats.in_flight.saturating_sub(1);
        match device {
            Some(device) => {
                device.add_callback_buffer(buffer);
                self.stats.with_device += 1;
                self.stats.resubmitted += 1;
                Recycled::Resubmitted
            }
            None => {
                tracing::debug!(buffer = buffer.id().0, "Session stopped, dropping buffer");
                self.retire(buffer.id());
                Recycled::Discarded
            }
        }
    }

    /// Drops a buffer that arrived after capture stopped.
    pub fn discard(&mut self, buffer: CaptureBuffer) {
        if !self.owns(&buffer) {
            tracing::warn!(buffer = buffer.id().0, "Discarding buffer not from this pool");
            return;
        }
        self.stats.with_device = self.stats.with_device.saturating_sub(1);
        self.retire(buffer.id());
    }

    /// Size in bytes of every pool buffer.
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Current counters.
    pub fn stats(&self) -> BufferStats {
        self.stats
    }

    fn owns(&self, buffer: &CaptureBuffer) -> bool {
        self.pool.contains(&buffer.id())
    }

    fn retire(&mut self, id: BufferId) {
        if self.pool.remove(&id) {
            self.stats.capacity = self.stats.capacity.saturating_sub(1);
        }
        self.stats.discarded += 1;
    }
}
