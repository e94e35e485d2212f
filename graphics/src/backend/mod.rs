//! GPU backend abstraction layer.
//!
//! The transient resource helpers never call the driver directly. They go
//! through two seams:
//!
//! - [`DeviceBackend`]: creation/destruction of native objects and device
//!   memory, mapping and mapped-range flushes, descriptor set allocation.
//! - [`CommandRecorder`]: the command buffer sink that receives barriers,
//!   copies, clears and draws.
//!
//! # Available Backends
//!
//! - [`dummy`]: host-memory emulation used by tests and benchmarks
//! - `vulkan` (feature `vulkan-backend`): native Vulkan via ash and gpu-allocator

pub mod dummy;

#[cfg(feature = "vulkan-backend")]
pub mod vulkan;

use std::ptr::NonNull;

use ash::vk;

use crate::error::GraphicsError;

pub use dummy::{
    DummyBackend, DummyImageInfo, DummyImageViewInfo, DummyMemory, MappedRange, RecordedCommand,
    RecordedImageBarrier, RecordingCommandBuffer,
};

/// Device limits the resource helpers depend on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceLimits {
    /// Granularity of mapped-range flushes and invalidations.
    pub non_coherent_atom_size: u64,
}

impl Default for DeviceLimits {
    fn default() -> Self {
        Self {
            non_coherent_atom_size: 64,
        }
    }
}

/// Native object and memory operations.
///
/// Every method maps onto one (or a couple of) driver calls. Failures are
/// reported as [`GraphicsError`] and never retried.
pub trait DeviceBackend {
    /// Device memory owned by a buffer or image.
    type Memory: std::fmt::Debug;

    /// Get the backend name.
    fn name(&self) -> &'static str;

    /// Device limits.
    fn limits(&self) -> DeviceLimits;

    /// Create a buffer object (no memory bound yet).
    fn create_buffer(&self, info: &vk::BufferCreateInfo<'_>) -> Result<vk::Buffer, GraphicsError>;

    /// Destroy a buffer object.
    fn destroy_buffer(&self, buffer: vk::Buffer);

    /// Allocate memory satisfying the buffer's requirements and bind it.
    ///
    /// Returns the memory and its size in bytes.
    fn allocate_buffer_memory(
        &self,
        buffer: vk::Buffer,
        flags: vk::MemoryPropertyFlags,
    ) -> Result<(Self::Memory, u64), GraphicsError>;

    /// Create an image object (no memory bound yet).
    fn create_image(&self, info: &vk::ImageCreateInfo<'_>) -> Result<vk::Image, GraphicsError>;

    /// Destroy an image object.
    fn destroy_image(&self, image: vk::Image);

    /// Allocate memory satisfying the image's requirements and bind it.
    ///
    /// Returns the memory and its size in bytes.
    fn allocate_image_memory(
        &self,
        image: vk::Image,
        flags: vk::MemoryPropertyFlags,
    ) -> Result<(Self::Memory, u64), GraphicsError>;

    /// Create an image view.
    fn create_image_view(
        &self,
        info: &vk::ImageViewCreateInfo<'_>,
    ) -> Result<vk::ImageView, GraphicsError>;

    /// Destroy an image view.
    fn destroy_image_view(&self, view: vk::ImageView);

    /// Free device memory.
    fn free_memory(&self, memory: Self::Memory);

    /// Map the whole allocation for host access.
    fn map_memory(&self, memory: &mut Self::Memory) -> Result<NonNull<u8>, GraphicsError>;

    /// Unmap a previously mapped allocation.
    fn unmap_memory(&self, memory: &mut Self::Memory);

    /// Whether host writes are visible to the device without a flush.
    fn is_host_coherent(&self, memory: &Self::Memory) -> bool;

    /// Make host writes in `[offset, offset + size)` visible to the device.
    fn flush_mapped_range(
        &self,
        memory: &Self::Memory,
        offset: u64,
        size: u64,
    ) -> Result<(), GraphicsError>;

    /// Make device writes in `[offset, offset + size)` visible to the host.
    fn invalidate_mapped_range(
        &self,
        memory: &Self::Memory,
        offset: u64,
        size: u64,
    ) -> Result<(), GraphicsError>;

    /// Create a descriptor pool.
    fn create_descriptor_pool(
        &self,
        info: &vk::DescriptorPoolCreateInfo<'_>,
    ) -> Result<vk::DescriptorPool, GraphicsError>;

    /// Destroy a descriptor pool and every set allocated from it.
    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool);

    /// Allocate one descriptor set per layout from `pool`.
    fn allocate_descriptor_sets(
        &self,
        pool: vk::DescriptorPool,
        layouts: &[vk::DescriptorSetLayout],
    ) -> Result<Vec<vk::DescriptorSet>, GraphicsError>;
}

/// Command buffer sink.
///
/// Commands take effect only once the underlying command buffer is
/// submitted, in recording order.
pub trait CommandRecorder {
    /// Record a pipeline barrier with image memory barriers.
    fn pipeline_barrier(
        &mut self,
        src_stage_mask: vk::PipelineStageFlags,
        dst_stage_mask: vk::PipelineStageFlags,
        dependency_flags: vk::DependencyFlags,
        image_barriers: &[vk::ImageMemoryBarrier<'_>],
    );

    /// Record a buffer-to-buffer copy.
    fn copy_buffer(&mut self, src: vk::Buffer, dst: vk::Buffer, regions: &[vk::BufferCopy]);

    /// Record an image-to-image copy.
    fn copy_image(
        &mut self,
        src: vk::Image,
        src_layout: vk::ImageLayout,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
        regions: &[vk::ImageCopy],
    );

    /// Record a color image clear.
    fn clear_color_image(
        &mut self,
        image: vk::Image,
        layout: vk::ImageLayout,
        color: &vk::ClearColorValue,
        ranges: &[vk::ImageSubresourceRange],
    );

    /// Record a depth/stencil image clear.
    fn clear_depth_stencil_image(
        &mut self,
        image: vk::Image,
        layout: vk::ImageLayout,
        value: &vk::ClearDepthStencilValue,
        ranges: &[vk::ImageSubresourceRange],
    );

    /// Record an indexed draw.
    fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    );
}
