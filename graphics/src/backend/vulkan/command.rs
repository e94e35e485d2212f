//! Vulkan command buffer recording.

use ash::vk;

use crate::backend::CommandRecorder;

/// A command buffer in the recording state.
///
/// Borrowing the device keeps the wrapper from outliving it. Begin/end and
/// submission stay with the caller.
pub struct VulkanCommandBuffer<'a> {
    device: &'a ash::Device,
    handle: vk::CommandBuffer,
}

impl<'a> VulkanCommandBuffer<'a> {
    /// Wrap a command buffer that is already recording.
    pub fn new(device: &'a ash::Device, handle: vk::CommandBuffer) -> Self {
        Self { device, handle }
    }

    /// Native handle.
    pub fn handle(&self) -> vk::CommandBuffer {
        self.handle
    }
}

impl std::fmt::Debug for VulkanCommandBuffer<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanCommandBuffer")
            .field("handle", &self.handle)
            .finish()
    }
}

impl CommandRecorder for VulkanCommandBuffer<'_> {
    fn pipeline_barrier(
        &mut self,
        src_stage_mask: vk::PipelineStageFlags,
        dst_stage_mask: vk::PipelineStageFlags,
        dependency_flags: vk::DependencyFlags,
        image_barriers: &[vk::ImageMemoryBarrier<'_>],
    ) {
        unsafe {
            self.device.cmd_pipeline_barrier(
                self.handle,
                src_stage_mask,
                dst_stage_mask,
                dependency_flags,
                &[],
                &[],
                image_barriers,
            );
        }
    }

    fn copy_buffer(&mut self, src: vk::Buffer, dst: vk::Buffer, regions: &[vk::BufferCopy]) {
        unsafe { self.device.cmd_copy_buffer(self.handle, src, dst, regions) };
    }

    fn copy_image(
        &mut self,
        src: vk::Image,
        src_layout: vk::ImageLayout,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
        regions: &[vk::ImageCopy],
    ) {
        unsafe {
            self.device
                .cmd_copy_image(self.handle, src, src_layout, dst, dst_layout, regions);
        }
    }

    fn clear_color_image(
        &mut self,
        image: vk::Image,
        layout: vk::ImageLayout,
        color: &vk::ClearColorValue,
        ranges: &[vk::ImageSubresourceRange],
    ) {
        unsafe {
            self.device
                .cmd_clear_color_image(self.handle, image, layout, color, ranges);
        }
    }

    fn clear_depth_stencil_image(
        &mut self,
        image: vk::Image,
        layout: vk::ImageLayout,
        value: &vk::ClearDepthStencilValue,
        ranges: &[vk::ImageSubresourceRange],
    ) {
        unsafe {
            self.device
                .cmd_clear_depth_stencil_image(self.handle, image, layout, value, ranges);
        }
    }

    fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) {
        unsafe {
            self.device.cmd_draw_indexed(
                self.handle,
                index_count,
                instance_count,
                first_index,
                vertex_offset,
                first_instance,
            );
        }
    }
}
