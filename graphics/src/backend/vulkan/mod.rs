//! Vulkan backend.
//!
//! Wraps an application-created `ash::Device` and routes all device memory
//! through gpu-allocator. Every buffer and image gets a dedicated allocation,
//! so mapped-range flushes never touch neighbouring resources.
//!
//! The backend does not own the device: it must be dropped before the
//! device is destroyed.

mod allocator;
mod command;

use std::ptr::NonNull;

use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme, Allocator};
use parking_lot::Mutex;

use crate::backend::{DeviceBackend, DeviceLimits};
use crate::error::GraphicsError;

pub use command::VulkanCommandBuffer;

/// Device memory owned by one buffer or image.
#[derive(Debug)]
pub struct VulkanMemory {
    allocation: Allocation,
    coherent: bool,
}

impl VulkanMemory {
    /// The native memory object backing this allocation.
    pub fn memory(&self) -> vk::DeviceMemory {
        unsafe { self.allocation.memory() }
    }
}

/// Vulkan implementation of [`DeviceBackend`].
pub struct VulkanBackend {
    device: ash::Device,
    allocator: Mutex<Allocator>,
    limits: DeviceLimits,
}

impl std::fmt::Debug for VulkanBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanBackend")
            .field("device", &self.device.handle())
            .field("limits", &self.limits)
            .finish()
    }
}

impl VulkanBackend {
    /// Create a backend for an existing logical device.
    pub fn new(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        device: ash::Device,
    ) -> Result<Self, GraphicsError> {
        let properties = unsafe { instance.get_physical_device_properties(physical_device) };
        let limits = DeviceLimits {
            non_coherent_atom_size: properties.limits.non_coherent_atom_size.max(1),
        };

        let allocator = allocator::create_allocator(instance, physical_device, device.clone())?;
        log::info!(
            "Vulkan backend ready (non-coherent atom size: {})",
            limits.non_coherent_atom_size
        );

        Ok(Self {
            device,
            allocator: Mutex::new(allocator),
            limits,
        })
    }

    /// Get the logical device.
    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    fn allocate(
        &self,
        name: &str,
        requirements: vk::MemoryRequirements,
        flags: vk::MemoryPropertyFlags,
        linear: bool,
        allocation_scheme: AllocationScheme,
    ) -> Result<VulkanMemory, GraphicsError> {
        let allocation = self
            .allocator
            .lock()
            .allocate(&AllocationCreateDesc {
                name,
                requirements,
                location: allocator::memory_location(flags),
                linear,
                allocation_scheme,
            })
            .map_err(allocator::map_allocation_error)?;

        let coherent = allocation
            .memory_properties()
            .contains(vk::MemoryPropertyFlags::HOST_COHERENT);
        Ok(VulkanMemory {
            allocation,
            coherent,
        })
    }

    fn free_on_error(&self, memory: VulkanMemory) {
        if let Err(e) = self.allocator.lock().free(memory.allocation) {
            log::error!("Failed to free allocation after bind failure: {}", e);
        }
    }

    fn mapped_range(
        &self,
        memory: &VulkanMemory,
        offset: u64,
        size: u64,
    ) -> vk::MappedMemoryRange<'static> {
        vk::MappedMemoryRange::default()
            .memory(memory.memory())
            .offset(memory.allocation.offset() + offset)
            .size(size)
    }
}

impl DeviceBackend for VulkanBackend {
    type Memory = VulkanMemory;

    fn name(&self) -> &'static str {
        "Vulkan"
    }

    fn limits(&self) -> DeviceLimits {
        self.limits
    }

    fn create_buffer(&self, info: &vk::BufferCreateInfo<'_>) -> Result<vk::Buffer, GraphicsError> {
        let buffer = unsafe { self.device.create_buffer(info, None) }?;
        Ok(buffer)
    }

    fn destroy_buffer(&self, buffer: vk::Buffer) {
        unsafe { self.device.destroy_buffer(buffer, None) };
    }

    fn allocate_buffer_memory(
        &self,
        buffer: vk::Buffer,
        flags: vk::MemoryPropertyFlags,
    ) -> Result<(VulkanMemory, u64), GraphicsError> {
        let requirements = unsafe { self.device.get_buffer_memory_requirements(buffer) };
        let memory = self.allocate(
            "buffer",
            requirements,
            flags,
            true,
            AllocationScheme::DedicatedBuffer(buffer),
        )?;

        let bound = unsafe {
            self.device
                .bind_buffer_memory(buffer, memory.memory(), memory.allocation.offset())
        };
        if let Err(e) = bound {
            self.free_on_error(memory);
            return Err(e.into());
        }

        let size = memory.allocation.size();
        Ok((memory, size))
    }

    fn create_image(&self, info: &vk::ImageCreateInfo<'_>) -> Result<vk::Image, GraphicsError> {
        let image = unsafe { self.device.create_image(info, None) }?;
        Ok(image)
    }

    fn destroy_image(&self, image: vk::Image) {
        unsafe { self.device.destroy_image(image, None) };
    }

    fn allocate_image_memory(
        &self,
        image: vk::Image,
        flags: vk::MemoryPropertyFlags,
    ) -> Result<(VulkanMemory, u64), GraphicsError> {
        let requirements = unsafe { self.device.get_image_memory_requirements(image) };
        // Host-visible images are created with linear tiling.
        let linear = flags.contains(vk::MemoryPropertyFlags::HOST_VISIBLE);
        let memory = self.allocate(
            "image",
            requirements,
            flags,
            linear,
            AllocationScheme::DedicatedImage(image),
        )?;

        let bound = unsafe {
            self.device
                .bind_image_memory(image, memory.memory(), memory.allocation.offset())
        };
        if let Err(e) = bound {
            self.free_on_error(memory);
            return Err(e.into());
        }

        let size = memory.allocation.size();
        Ok((memory, size))
    }

    fn create_image_view(
        &self,
        info: &vk::ImageViewCreateInfo<'_>,
    ) -> Result<vk::ImageView, GraphicsError> {
        let view = unsafe { self.device.create_image_view(info, None) }?;
        Ok(view)
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        unsafe { self.device.destroy_image_view(view, None) };
    }

    fn free_memory(&self, memory: VulkanMemory) {
        if let Err(e) = self.allocator.lock().free(memory.allocation) {
            log::error!("Failed to free allocation: {}", e);
        }
    }

    fn map_memory(&self, memory: &mut VulkanMemory) -> Result<NonNull<u8>, GraphicsError> {
        // gpu-allocator keeps host-visible allocations persistently mapped.
        memory
            .allocation
            .mapped_ptr()
            .map(NonNull::cast::<u8>)
            .ok_or_else(|| {
                GraphicsError::InvalidParameter("allocation is not host visible".to_string())
            })
    }

    fn unmap_memory(&self, _memory: &mut VulkanMemory) {}

    fn is_host_coherent(&self, memory: &VulkanMemory) -> bool {
        memory.coherent
    }

    fn flush_mapped_range(
        &self,
        memory: &VulkanMemory,
        offset: u64,
        size: u64,
    ) -> Result<(), GraphicsError> {
        let range = self.mapped_range(memory, offset, size);
        unsafe { self.device.flush_mapped_memory_ranges(&[range]) }?;
        Ok(())
    }

    fn invalidate_mapped_range(
        &self,
        memory: &VulkanMemory,
        offset: u64,
        size: u64,
    ) -> Result<(), GraphicsError> {
        let range = self.mapped_range(memory, offset, size);
        unsafe { self.device.invalidate_mapped_memory_ranges(&[range]) }?;
        Ok(())
    }

    fn create_descriptor_pool(
        &self,
        info: &vk::DescriptorPoolCreateInfo<'_>,
    ) -> Result<vk::DescriptorPool, GraphicsError> {
        let pool = unsafe { self.device.create_descriptor_pool(info, None) }?;
        Ok(pool)
    }

    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        unsafe { self.device.destroy_descriptor_pool(pool, None) };
    }

    fn allocate_descriptor_sets(
        &self,
        pool: vk::DescriptorPool,
        layouts: &[vk::DescriptorSetLayout],
    ) -> Result<Vec<vk::DescriptorSet>, GraphicsError> {
        let info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(pool)
            .set_layouts(layouts);
        let sets = unsafe { self.device.allocate_descriptor_sets(&info) }?;
        Ok(sets)
    }
}
