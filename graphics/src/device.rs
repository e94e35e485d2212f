//! Graphics device.
//!
//! The [`GraphicsDevice`] owns the backend and the queue serial bookkeeping
//! shared by every transient resource: which serial is being recorded, and
//! which released objects are waiting for a serial to complete.
//!
//! # Example
//!
//! ```ignore
//! let mut device = GraphicsDevice::new(DummyBackend::new());
//!
//! let mut ring = DynamicBuffer::new(descriptor);
//! ring.init(4, &device);
//! let allocation = ring.allocate(&device, 64)?;
//! // ...record commands that read the allocation...
//!
//! let serial = device.submit();
//! // ...later, once the GPU signals completion:
//! device.handle_completed_serial(serial);
//! ```

use crate::backend::{DeviceBackend, DeviceLimits};
use crate::deferred::{DeferredDestructor, GarbageObject, Serial};

/// Identity of a participant in the command graph.
///
/// Used to register read dependencies between resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceId(u64);

impl ResourceId {
    /// Raw value.
    pub fn value(self) -> u64 {
        self.0
    }
}

/// A graphics device wrapping a backend.
///
/// # Thread Safety
///
/// Recording is single-threaded: every mutating method takes `&mut self`.
pub struct GraphicsDevice<B: DeviceBackend> {
    backend: B,
    limits: DeviceLimits,
    current_serial: Serial,
    deferred: DeferredDestructor<B::Memory>,
    next_resource_id: u64,
}

impl<B: DeviceBackend> GraphicsDevice<B> {
    /// Create a device over a backend.
    pub fn new(backend: B) -> Self {
        let limits = backend.limits();
        log::info!(
            "GraphicsDevice: created on {} backend (atom size: {})",
            backend.name(),
            limits.non_coherent_atom_size
        );
        Self {
            backend,
            limits,
            current_serial: Serial::ZERO.next(),
            deferred: DeferredDestructor::new(),
            next_resource_id: 0,
        }
    }

    /// Get the backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Get the device limits.
    pub fn limits(&self) -> &DeviceLimits {
        &self.limits
    }

    /// Serial of the batch currently being recorded.
    pub fn current_queue_serial(&self) -> Serial {
        self.current_serial
    }

    /// Highest serial reported complete so far.
    pub fn last_completed_serial(&self) -> Serial {
        self.deferred.last_completed()
    }

    /// Close the batch being recorded and return its serial.
    pub fn submit(&mut self) -> Serial {
        let submitted = self.current_serial;
        self.current_serial = submitted.next();
        log::trace!("GraphicsDevice: submitted serial {submitted}");
        submitted
    }

    /// Queue an object for destruction once `serial` completes.
    pub fn release_object(&mut self, serial: Serial, object: GarbageObject<B::Memory>) {
        self.deferred.queue(serial, object);
    }

    /// Destroy every released object whose serial is at or below `serial`.
    ///
    /// Returns the number of destroyed objects.
    pub fn handle_completed_serial(&mut self, serial: Serial) -> usize {
        debug_assert!(
            serial < self.current_serial,
            "serial {serial} completed before it was submitted"
        );
        self.deferred.collect_completed(serial, &self.backend)
    }

    /// Destroy every released object. The GPU must be idle.
    pub fn wait_idle_and_collect(&mut self) {
        self.deferred.flush_all(&self.backend);
    }

    /// Number of released objects still waiting for their serial.
    pub fn pending_garbage_count(&self) -> usize {
        self.deferred.pending_count()
    }

    /// Allocate a fresh resource identity.
    pub fn allocate_resource_id(&mut self) -> ResourceId {
        self.next_resource_id += 1;
        ResourceId(self.next_resource_id)
    }
}

impl<B: DeviceBackend> Drop for GraphicsDevice<B> {
    fn drop(&mut self) {
        let pending = self.deferred.pending_count();
        if pending > 0 {
            log::debug!("GraphicsDevice: destroying {pending} pending objects on drop");
        }
        self.deferred.flush_all(&self.backend);
    }
}

impl<B: DeviceBackend + std::fmt::Debug> std::fmt::Debug for GraphicsDevice<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphicsDevice")
            .field("backend", &self.backend)
            .field("current_serial", &self.current_serial)
            .field("pending_garbage", &self.deferred.pending_count())
            .finish()
    }
}
