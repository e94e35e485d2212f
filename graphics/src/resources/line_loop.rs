//! Line loop emulation.
//!
//! Vulkan has no line-loop topology. A loop over `N` vertices is drawn as an
//! indexed line strip of `N + 1` indices whose last index repeats the first.
//! [`LineLoopHelper`] generates those indices into a dynamic index buffer.

use ash::vk;

use crate::backend::{CommandRecorder, DeviceBackend};
use crate::device::{GraphicsDevice, ResourceId};
use crate::error::GraphicsError;
use crate::resources::SourceBuffer;
use crate::resources::dynamic_buffer::{DynamicAllocation, DynamicBuffer};
use crate::types::{ClientIndices, DynamicBufferDescriptor, IndexBufferBinding, index_type_size};

/// Minimum size of each line-loop index buffer block.
pub const LINE_LOOP_MIN_BUFFER_SIZE: u64 = 1024 * 1024;

/// Usage of line-loop index buffers (written by the host or by copies).
pub const LINE_LOOP_BUFFER_USAGE: vk::BufferUsageFlags = vk::BufferUsageFlags::from_raw(
    vk::BufferUsageFlags::INDEX_BUFFER.as_raw() | vk::BufferUsageFlags::TRANSFER_DST.as_raw(),
);

/// Generates closed index lists for line-loop draws.
pub struct LineLoopHelper<B: DeviceBackend> {
    id: ResourceId,
    dynamic_index_buffer: DynamicBuffer<B>,
}

impl<B: DeviceBackend> LineLoopHelper<B> {
    /// Create a helper with its own index buffer.
    pub fn new(device: &mut GraphicsDevice<B>) -> Self {
        let mut dynamic_index_buffer = DynamicBuffer::new(
            DynamicBufferDescriptor::new(LINE_LOOP_BUFFER_USAGE, LINE_LOOP_MIN_BUFFER_SIZE)
                .with_label("line_loop_indices"),
        );
        // Index binding offsets must be a multiple of the index size; u32 covers both types.
        dynamic_index_buffer.init(std::mem::size_of::<u32>() as u64, device);

        Self {
            id: device.allocate_resource_id(),
            dynamic_index_buffer,
        }
    }

    /// Identity used for read dependencies.
    pub fn id(&self) -> ResourceId {
        self.id
    }

    /// The index buffer backing the generated indices.
    pub fn dynamic_index_buffer(&self) -> &DynamicBuffer<B> {
        &self.dynamic_index_buffer
    }

    /// Indices `first..first + count` followed by `first`, as 32-bit indices.
    pub fn get_index_buffer_for_draw_arrays(
        &mut self,
        device: &mut GraphicsDevice<B>,
        first_vertex: u32,
        vertex_count: u32,
    ) -> Result<IndexBufferBinding, GraphicsError> {
        let allocate_bytes = index_type_size(vk::IndexType::UINT32) * (u64::from(vertex_count) + 1);

        self.dynamic_index_buffer.release_retained_buffers(device);
        let mut allocation = self.dynamic_index_buffer.allocate(device, allocate_bytes)?;
        let binding = binding_for(&allocation, vk::IndexType::UINT32);

        let indices: &mut [u32] = typed_indices(&mut allocation, allocate_bytes)?;
        for (slot, index) in indices.iter_mut().zip(0..vertex_count) {
            *slot = first_vertex.wrapping_add(index);
        }
        indices[vertex_count as usize] = first_vertex;

        self.dynamic_index_buffer.flush(device)?;
        Ok(binding)
    }

    /// Copy indices out of a GPU index buffer and append the first one.
    ///
    /// Records one buffer copy with two regions into `cmd`: the whole index
    /// range, then the first index again at the tail.
    pub fn get_index_buffer_for_element_array_buffer(
        &mut self,
        device: &mut GraphicsDevice<B>,
        source: &mut impl SourceBuffer,
        index_type: vk::IndexType,
        index_count: u32,
        element_array_offset: u64,
        cmd: &mut impl CommandRecorder,
    ) -> Result<IndexBufferBinding, GraphicsError> {
        if index_type != vk::IndexType::UINT16 && index_type != vk::IndexType::UINT32 {
            return Err(GraphicsError::InvalidParameter(format!(
                "line loops need 16- or 32-bit indices, got {index_type:?}"
            )));
        }

        let unit_size = index_type_size(index_type);
        let unit_count = u64::from(index_count);

        self.dynamic_index_buffer.release_retained_buffers(device);
        let allocation = self
            .dynamic_index_buffer
            .allocate(device, unit_size * (unit_count + 1))?;
        let binding = binding_for(&allocation, index_type);

        let copies = [
            vk::BufferCopy {
                src_offset: element_array_offset,
                dst_offset: binding.offset,
                size: unit_count * unit_size,
            },
            vk::BufferCopy {
                src_offset: element_array_offset,
                dst_offset: binding.offset + unit_count * unit_size,
                size: unit_size,
            },
        ];

        source.add_read_dependency(self.id);
        cmd.copy_buffer(source.handle(), binding.buffer, &copies);

        self.dynamic_index_buffer.flush(device)?;
        Ok(binding)
    }

    /// Upload client-side indices with the first one appended.
    ///
    /// 8-bit indices are widened to 16 bits.
    pub fn get_index_buffer_for_client_element_array(
        &mut self,
        device: &mut GraphicsDevice<B>,
        indices: ClientIndices<'_>,
    ) -> Result<IndexBufferBinding, GraphicsError> {
        if indices.is_empty() {
            return Err(GraphicsError::InvalidParameter(
                "line loop without indices".to_string(),
            ));
        }

        let index_type = indices.gpu_index_type();
        let allocate_bytes = index_type_size(index_type) * (indices.len() as u64 + 1);

        let mut allocation = self.dynamic_index_buffer.allocate(device, allocate_bytes)?;
        let binding = binding_for(&allocation, index_type);

        match indices {
            ClientIndices::U8(src) => {
                let dst: &mut [u16] = typed_indices(&mut allocation, allocate_bytes)?;
                for (slot, index) in dst.iter_mut().zip(src) {
                    *slot = u16::from(*index);
                }
                dst[src.len()] = u16::from(src[0]);
            }
            ClientIndices::U16(src) => {
                close_loop(typed_indices(&mut allocation, allocate_bytes)?, src);
            }
            ClientIndices::U32(src) => {
                close_loop(typed_indices(&mut allocation, allocate_bytes)?, src);
            }
        }

        self.dynamic_index_buffer.flush(device)?;
        Ok(binding)
    }

    /// Record the indexed draw of a loop over `count` vertices.
    pub fn draw(count: u32, cmd: &mut impl CommandRecorder) {
        cmd.draw_indexed(count.wrapping_add(1), 1, 0, 0, 0);
    }

    /// Release the index buffers after the current serial.
    pub fn release(&mut self, device: &mut GraphicsDevice<B>) {
        self.dynamic_index_buffer.release(device);
    }

    /// Destroy the index buffers immediately.
    pub fn destroy(&mut self, device: &GraphicsDevice<B>) {
        self.dynamic_index_buffer.destroy(device);
    }
}

impl<B: DeviceBackend> std::fmt::Debug for LineLoopHelper<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineLoopHelper")
            .field("id", &self.id)
            .field("dynamic_index_buffer", &self.dynamic_index_buffer)
            .finish()
    }
}

fn binding_for(
    allocation: &DynamicAllocation<'_>,
    index_type: vk::IndexType,
) -> IndexBufferBinding {
    IndexBufferBinding {
        buffer: allocation.buffer,
        offset: allocation.offset,
        index_type,
    }
}

fn typed_indices<'a, T: bytemuck::Pod>(
    allocation: &'a mut DynamicAllocation<'_>,
    len: u64,
) -> Result<&'a mut [T], GraphicsError> {
    let bytes = &mut allocation.bytes_mut()[..len as usize];
    bytemuck::try_cast_slice_mut(bytes)
        .map_err(|e| GraphicsError::Internal(format!("misaligned index allocation: {e}")))
}

fn close_loop<T: Copy>(dst: &mut [T], src: &[T]) {
    dst[..src.len()].copy_from_slice(src);
    dst[src.len()] = src[0];
}
