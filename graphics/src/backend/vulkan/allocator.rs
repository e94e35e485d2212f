//! GPU memory allocator integration using gpu-allocator.

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};

use crate::error::GraphicsError;

/// Create a memory allocator for the Vulkan device.
pub fn create_allocator(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    device: ash::Device,
) -> Result<Allocator, GraphicsError> {
    let allocator = Allocator::new(&AllocatorCreateDesc {
        instance: instance.clone(),
        device,
        physical_device,
        debug_settings: Default::default(),
        buffer_device_address: false,
        allocation_sizes: gpu_allocator::AllocationSizes::default(),
    })
    .map_err(|e| {
        GraphicsError::ResourceCreationFailed(format!("Failed to create memory allocator: {}", e))
    })?;

    Ok(allocator)
}

/// Pick the allocator memory location for the requested property flags.
pub fn memory_location(flags: vk::MemoryPropertyFlags) -> MemoryLocation {
    if flags.contains(vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_CACHED)
    {
        MemoryLocation::GpuToCpu
    } else if flags.contains(vk::MemoryPropertyFlags::HOST_VISIBLE) {
        MemoryLocation::CpuToGpu
    } else {
        MemoryLocation::GpuOnly
    }
}

/// Map allocator errors onto the crate error type.
pub fn map_allocation_error(error: gpu_allocator::AllocationError) -> GraphicsError {
    match error {
        gpu_allocator::AllocationError::OutOfMemory => GraphicsError::OutOfMemory,
        other => {
            GraphicsError::ResourceCreationFailed(format!("Failed to allocate memory: {other}"))
        }
    }
}
