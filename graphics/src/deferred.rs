//! Serial-gated deferred destruction.
//!
//! GPU commands execute asynchronously: a command buffer submitted with
//! serial `N` may still be reading a buffer long after the CPU has moved on.
//! Resources released while in use are therefore handed to the
//! [`DeferredDestructor`] together with the serial of the last submission
//! that used them, and destroyed only once that serial has completed.
//!
//! # Architecture
//!
//! ```text
//! release(serial, object) ──► pending (sorted by serial)
//!                               │
//! completed(serial S) ──────────┴──► destroy every entry with serial <= S
//! ```

use std::collections::VecDeque;

use crate::backend::DeviceBackend;
use ash::vk;

/// Monotonically increasing submission counter.
///
/// Serial `N` completing implies every serial below `N` has completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Serial(u64);

impl Serial {
    /// The serial before the first submission.
    pub const ZERO: Serial = Serial(0);

    /// Create a serial from a raw value.
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Raw value.
    pub const fn value(self) -> u64 {
        self.0
    }

    /// The serial following this one.
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl std::fmt::Display for Serial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A native object pending destruction.
#[derive(Debug)]
pub enum GarbageObject<M> {
    /// A buffer object.
    Buffer(vk::Buffer),
    /// A device memory allocation.
    Memory(M),
    /// An image object.
    Image(vk::Image),
    /// An image view.
    ImageView(vk::ImageView),
    /// A descriptor pool (and every set allocated from it).
    DescriptorPool(vk::DescriptorPool),
}

impl<M> GarbageObject<M> {
    /// Destroy the object immediately.
    pub fn destroy<B: DeviceBackend<Memory = M>>(self, backend: &B) {
        match self {
            Self::Buffer(buffer) => backend.destroy_buffer(buffer),
            Self::Memory(memory) => backend.free_memory(memory),
            Self::Image(image) => backend.destroy_image(image),
            Self::ImageView(view) => backend.destroy_image_view(view),
            Self::DescriptorPool(pool) => backend.destroy_descriptor_pool(pool),
        }
    }
}

/// Holds released objects until the GPU is done with them.
#[derive(Debug)]
pub struct DeferredDestructor<M> {
    last_completed: Serial,
    pending: VecDeque<(Serial, GarbageObject<M>)>,
}

impl<M> DeferredDestructor<M> {
    /// Create an empty destructor.
    pub fn new() -> Self {
        Self {
            last_completed: Serial::ZERO,
            pending: VecDeque::new(),
        }
    }

    /// Queue an object that the GPU may use until `serial` completes.
    pub fn queue(&mut self, serial: Serial, object: GarbageObject<M>) {
        // Releases usually arrive in serial order, so this is almost always a push_back.
        let index = self.pending.partition_point(|(queued, _)| *queued <= serial);
        self.pending.insert(index, (serial, object));
    }

    /// Destroy everything whose serial is at or below `completed`.
    ///
    /// Returns the number of destroyed objects.
    pub fn collect_completed<B: DeviceBackend<Memory = M>>(
        &mut self,
        completed: Serial,
        backend: &B,
    ) -> usize {
        if completed > self.last_completed {
            self.last_completed = completed;
        }

        let mut destroyed = 0;
        while self
            .pending
            .front()
            .is_some_and(|(serial, _)| *serial <= completed)
        {
            let Some((_, object)) = self.pending.pop_front() else {
                break;
            };
            object.destroy(backend);
            destroyed += 1;
        }

        if destroyed > 0 {
            log::trace!("Destroyed {destroyed} objects up to serial {completed}");
        }
        destroyed
    }

    /// Destroy all pending objects regardless of serials.
    ///
    /// Only valid when the device is idle.
    pub fn flush_all<B: DeviceBackend<Memory = M>>(&mut self, backend: &B) {
        let total = self.pending.len();
        for (_, object) in self.pending.drain(..) {
            object.destroy(backend);
        }
        if total > 0 {
            log::debug!("Flushed {total} pending objects");
        }
    }

    /// Number of objects waiting for their serial.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Highest serial reported as completed.
    pub fn last_completed(&self) -> Serial {
        self.last_completed
    }
}

impl<M> Default for DeferredDestructor<M> {
    fn default() -> Self {
        Self::new()
    }
}
