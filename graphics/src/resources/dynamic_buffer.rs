//! Dynamic buffer for streaming data to the GPU.
//!
//! A dynamic buffer hands out consecutive, aligned regions of a persistently
//! mapped host-visible buffer. When a request doesn't fit, the whole backing
//! buffer is retired and a fresh one is created: space is never reused within
//! a buffer, so the CPU can never overwrite data the GPU might still read.
//! Retired buffers are destroyed once the serial they were retired at has
//! completed.
//!
//! # Usage
//!
//! Dynamic buffers are ideal for:
//! - Client-side vertex and index arrays converted at draw time
//! - Per-draw uniform data
//! - Generated index data (line loops, primitive restart emulation)
//!
//! # Example
//!
//! ```ignore
//! let mut stream = DynamicBuffer::new(
//!     DynamicBufferDescriptor::new(vk::BufferUsageFlags::VERTEX_BUFFER, 1024 * 1024)
//!         .with_label("vertex_stream"),
//! );
//! stream.init(16, &device);
//!
//! let mut allocation = stream.allocate(&device, vertices.len() as u64)?;
//! allocation.bytes_mut()[..vertices.len()].copy_from_slice(vertices);
//! if allocation.new_buffer_allocated {
//!     // rebind: the previous buffer handle is stale
//! }
//! let (buffer, offset) = (allocation.buffer, allocation.offset);
//! stream.flush(&device)?;
//! ```

use std::ptr::NonNull;

use ash::vk;

use crate::backend::DeviceBackend;
use crate::deferred::GarbageObject;
use crate::device::GraphicsDevice;
use crate::error::GraphicsError;
use crate::types::DynamicBufferDescriptor;

/// A region handed out by [`DynamicBuffer::allocate`].
///
/// The region stays writable until the next call on the owning buffer.
#[derive(Debug)]
pub struct DynamicAllocation<'a> {
    bytes: &'a mut [u8],
    /// Buffer containing the region.
    pub buffer: vk::Buffer,
    /// Byte offset of the region within `buffer`.
    pub offset: u64,
    /// True if `buffer` differs from the buffer of previous allocations.
    pub new_buffer_allocated: bool,
}

impl DynamicAllocation<'_> {
    /// Mapped bytes of the region.
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes[..]
    }

    /// Size of the region (the request rounded up to the alignment).
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

#[derive(Debug)]
struct BackingBuffer<M> {
    buffer: vk::Buffer,
    memory: M,
}

/// A ring of host-visible buffers for streamed data.
///
/// # Lifecycle
///
/// `new` → [`init`](Self::init) → [`allocate`](Self::allocate)* →
/// [`release`](Self::release) or [`destroy`](Self::destroy). Dropping an
/// initialized buffer leaks its native objects.
///
/// # Thread Safety
///
/// `DynamicBuffer` is NOT thread-safe; it belongs to the recording thread.
pub struct DynamicBuffer<B: DeviceBackend> {
    label: Option<String>,
    usage: vk::BufferUsageFlags,
    min_size: u64,
    alignment: u64,
    current: Option<BackingBuffer<B::Memory>>,
    retained: Vec<BackingBuffer<B::Memory>>,
    mapped: Option<NonNull<u8>>,
    size: u64,
    next_allocation_offset: u64,
    last_flush_or_invalidate_offset: u64,
    force_reallocation: bool,
}

impl<B: DeviceBackend> DynamicBuffer<B> {
    /// Create an uninitialized dynamic buffer.
    pub fn new(descriptor: DynamicBufferDescriptor) -> Self {
        Self {
            label: descriptor.label,
            usage: descriptor.usage,
            min_size: descriptor.min_size,
            alignment: 0,
            current: None,
            retained: Vec::new(),
            mapped: None,
            size: 0,
            next_allocation_offset: 0,
            last_flush_or_invalidate_offset: 0,
            force_reallocation: false,
        }
    }

    /// Set the allocation alignment and make the buffer usable.
    ///
    /// The effective alignment is the least common multiple of `alignment`
    /// and the device's non-coherent atom size, so flushed ranges always
    /// start and end on an atom boundary.
    pub fn init(&mut self, alignment: u64, device: &GraphicsDevice<B>) {
        debug_assert!(!self.valid(), "dynamic buffer initialized twice");
        self.alignment = common_alignment(alignment, device.limits().non_coherent_atom_size);
    }

    /// Returns true between `init` and `release`/`destroy`.
    pub fn valid(&self) -> bool {
        self.alignment != 0
    }

    /// Effective alignment (0 when uninitialized).
    pub fn alignment(&self) -> u64 {
        self.alignment
    }

    /// Size of the current backing buffer (0 when there is none).
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Minimum size of a backing buffer.
    pub fn min_size(&self) -> u64 {
        self.min_size
    }

    /// Debug label.
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Handle of the current backing buffer.
    pub fn current_buffer_handle(&self) -> Option<vk::Buffer> {
        self.current.as_ref().map(|current| current.buffer)
    }

    /// Number of retired buffers not yet handed to the device.
    pub fn retained_count(&self) -> usize {
        self.retained.len()
    }

    /// Change the minimum block size and force the next `allocate` to
    /// create a new backing buffer.
    pub fn set_minimum_size_for_testing(&mut self, min_size: u64) {
        self.min_size = min_size;
        self.force_reallocation = true;
    }

    /// Allocate `size` bytes, rounded up to the alignment.
    ///
    /// # Errors
    ///
    /// Returns an error if a new backing buffer is needed and creating,
    /// allocating or mapping it fails.
    pub fn allocate(
        &mut self,
        device: &GraphicsDevice<B>,
        size: u64,
    ) -> Result<DynamicAllocation<'_>, GraphicsError> {
        debug_assert!(self.valid(), "allocate on an uninitialized dynamic buffer");
        let rounded = align_up(size, self.alignment.max(1)).ok_or_else(|| {
            GraphicsError::InvalidParameter(format!("allocation size {size} overflows"))
        })?;

        let fits = self
            .next_allocation_offset
            .checked_add(rounded)
            .is_some_and(|end| end <= self.size);
        let new_buffer_allocated = self.current.is_none() || self.force_reallocation || !fits;

        if new_buffer_allocated {
            self.retire_current(device)?;
            self.create_backing(device, rounded.max(self.min_size))?;
        }

        let (Some(current), Some(mapped)) = (&self.current, self.mapped) else {
            return Err(GraphicsError::Internal(
                "dynamic buffer has no mapped backing".to_string(),
            ));
        };

        let offset = self.next_allocation_offset;
        self.next_allocation_offset += rounded;
        log::trace!(
            "DynamicBuffer {:?}: allocated {rounded} bytes at offset {offset}",
            self.label
        );

        // SAFETY: `offset + rounded <= self.size` and the mapping covers the
        // whole backing buffer. The region is handed out at most once per
        // buffer generation and the returned borrow pins `self`.
        let bytes = unsafe {
            std::slice::from_raw_parts_mut(
                mapped.as_ptr().add(offset as usize),
                rounded as usize,
            )
        };

        Ok(DynamicAllocation {
            bytes,
            buffer: current.buffer,
            offset,
            new_buffer_allocated,
        })
    }

    /// Make host writes since the last flush visible to the device.
    pub fn flush(&mut self, device: &GraphicsDevice<B>) -> Result<(), GraphicsError> {
        if let Some(current) = &self.current
            && self.next_allocation_offset > self.last_flush_or_invalidate_offset
            && !device.backend().is_host_coherent(&current.memory)
        {
            device.backend().flush_mapped_range(
                &current.memory,
                self.last_flush_or_invalidate_offset,
                self.next_allocation_offset - self.last_flush_or_invalidate_offset,
            )?;
        }
        self.last_flush_or_invalidate_offset = self.next_allocation_offset;
        Ok(())
    }

    /// Make device writes since the last flush visible to the host.
    pub fn invalidate(&mut self, device: &GraphicsDevice<B>) -> Result<(), GraphicsError> {
        if let Some(current) = &self.current
            && self.next_allocation_offset > self.last_flush_or_invalidate_offset
            && !device.backend().is_host_coherent(&current.memory)
        {
            device.backend().invalidate_mapped_range(
                &current.memory,
                self.last_flush_or_invalidate_offset,
                self.next_allocation_offset - self.last_flush_or_invalidate_offset,
            )?;
        }
        self.last_flush_or_invalidate_offset = self.next_allocation_offset;
        Ok(())
    }

    /// Hand retired buffers to the device, destroyed after the current serial.
    pub fn release_retained_buffers(&mut self, device: &mut GraphicsDevice<B>) {
        let serial = device.current_queue_serial();
        for retired in self.retained.drain(..) {
            device.release_object(serial, GarbageObject::Buffer(retired.buffer));
            device.release_object(serial, GarbageObject::Memory(retired.memory));
        }
    }

    /// Release every buffer after the current serial and uninitialize.
    pub fn release(&mut self, device: &mut GraphicsDevice<B>) {
        self.release_retained_buffers(device);
        if let Some(mut current) = self.current.take() {
            device.backend().unmap_memory(&mut current.memory);
            let serial = device.current_queue_serial();
            device.release_object(serial, GarbageObject::Buffer(current.buffer));
            device.release_object(serial, GarbageObject::Memory(current.memory));
        }
        self.reset();
    }

    /// Destroy every buffer immediately and uninitialize.
    ///
    /// The caller guarantees the GPU no longer uses any of them.
    pub fn destroy(&mut self, device: &GraphicsDevice<B>) {
        let backend = device.backend();
        for retired in self.retained.drain(..) {
            backend.destroy_buffer(retired.buffer);
            backend.free_memory(retired.memory);
        }
        if let Some(mut current) = self.current.take() {
            backend.unmap_memory(&mut current.memory);
            backend.destroy_buffer(current.buffer);
            backend.free_memory(current.memory);
        }
        self.reset();
    }

    fn reset(&mut self) {
        self.alignment = 0;
        self.mapped = None;
        self.size = 0;
        self.next_allocation_offset = 0;
        self.last_flush_or_invalidate_offset = 0;
        self.force_reallocation = false;
    }

    fn retire_current(&mut self, device: &GraphicsDevice<B>) -> Result<(), GraphicsError> {
        if self.current.is_none() {
            return Ok(());
        }
        self.flush(device)?;
        if let Some(mut current) = self.current.take() {
            device.backend().unmap_memory(&mut current.memory);
            self.retained.push(current);
        }
        self.mapped = None;
        self.size = 0;
        Ok(())
    }

    fn create_backing(
        &mut self,
        device: &GraphicsDevice<B>,
        size: u64,
    ) -> Result<(), GraphicsError> {
        let backend = device.backend();
        let info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(self.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let buffer = backend.create_buffer(&info)?;

        let (mut memory, memory_size) =
            match backend.allocate_buffer_memory(buffer, vk::MemoryPropertyFlags::HOST_VISIBLE) {
                Ok(allocated) => allocated,
                Err(e) => {
                    backend.destroy_buffer(buffer);
                    return Err(e);
                }
            };

        let mapped = match backend.map_memory(&mut memory) {
            Ok(mapped) => mapped,
            Err(e) => {
                backend.destroy_buffer(buffer);
                backend.free_memory(memory);
                return Err(e);
            }
        };

        log::debug!(
            "DynamicBuffer {:?}: new backing buffer of {size} bytes \
             ({memory_size} bytes of memory, {} retained)",
            self.label,
            self.retained.len()
        );

        self.current = Some(BackingBuffer { buffer, memory });
        self.mapped = Some(mapped);
        self.size = size;
        self.next_allocation_offset = 0;
        self.last_flush_or_invalidate_offset = 0;
        self.force_reallocation = false;
        Ok(())
    }
}

impl<B: DeviceBackend> Drop for DynamicBuffer<B> {
    fn drop(&mut self) {
        if self.valid() && !std::thread::panicking() {
            log::warn!(
                "DynamicBuffer {:?} dropped without release or destroy",
                self.label
            );
            debug_assert!(!self.valid(), "dynamic buffer dropped while initialized");
        }
    }
}

impl<B: DeviceBackend> std::fmt::Debug for DynamicBuffer<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicBuffer")
            .field("label", &self.label)
            .field("usage", &self.usage)
            .field("alignment", &self.alignment)
            .field("size", &self.size)
            .field("next_allocation_offset", &self.next_allocation_offset)
            .field("retained", &self.retained.len())
            .finish()
    }
}

/// Round a value up to the given alignment.
///
/// Returns `None` on overflow.
#[inline]
fn align_up(value: u64, alignment: u64) -> Option<u64> {
    value.checked_next_multiple_of(alignment)
}

fn common_alignment(requested: u64, atom: u64) -> u64 {
    let (requested, atom) = (requested.max(1), atom.max(1));
    let (mut a, mut b) = (requested, atom);
    while b != 0 {
        (a, b) = (b, a % b);
    }
    (requested / a).saturating_mul(atom)
}
