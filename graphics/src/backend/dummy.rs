//! Dummy GPU backend for testing and development.
//!
//! This backend doesn't talk to a GPU. Native handles are plain counters and
//! device memory is host memory, which lets the resource helpers run in unit
//! tests without requiring GPU hardware.
//!
//! Host-visible memory is reported as non-coherent unless configured
//! otherwise. Each flush copies the flushed range into a per-allocation
//! "device view", so tests can observe exactly what the GPU would see.

use std::collections::HashMap;
use std::ptr::NonNull;

use ash::vk;
use ash::vk::Handle;
use parking_lot::Mutex;

use crate::error::GraphicsError;
use crate::types::Format;

use super::{CommandRecorder, DeviceBackend, DeviceLimits};

/// Host memory standing in for a device allocation.
#[derive(Debug)]
pub struct DummyMemory {
    id: u64,
    // u64 words keep the storage 8-byte aligned for any index type.
    words: Box<[u64]>,
    size: u64,
    coherent: bool,
    mapped: bool,
}

impl DummyMemory {
    /// Allocation identifier.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Allocation size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    fn bytes(&self) -> &[u8] {
        &bytemuck::cast_slice::<u64, u8>(&self.words)[..self.size as usize]
    }
}

/// A flushed or invalidated memory range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MappedRange {
    /// Allocation identifier.
    pub memory_id: u64,
    /// Start of the range.
    pub offset: u64,
    /// Length of the range.
    pub size: u64,
}

/// Creation parameters of a dummy image.
#[derive(Debug, Clone, Copy)]
pub struct DummyImageInfo {
    /// Native format.
    pub format: vk::Format,
    /// Extent of mip level 0.
    pub extent: vk::Extent3D,
    /// Number of mip levels.
    pub mip_levels: u32,
    /// Number of array layers.
    pub array_layers: u32,
    /// Sample count.
    pub samples: vk::SampleCountFlags,
    /// Tiling mode.
    pub tiling: vk::ImageTiling,
    /// Usage flags.
    pub usage: vk::ImageUsageFlags,
    /// Layout the image was created in.
    pub initial_layout: vk::ImageLayout,
    /// Create flags.
    pub flags: vk::ImageCreateFlags,
}

/// Creation parameters of a dummy image view.
#[derive(Debug, Clone, Copy)]
pub struct DummyImageViewInfo {
    /// Viewed image.
    pub image: vk::Image,
    /// View dimensionality.
    pub view_type: vk::ImageViewType,
    /// View format.
    pub format: vk::Format,
    /// Viewed subresources.
    pub subresource_range: vk::ImageSubresourceRange,
}

#[derive(Debug)]
struct BufferRecord {
    size: u64,
    memory_id: Option<u64>,
}

#[derive(Debug)]
struct PoolRecord {
    max_sets: u32,
    allocated_sets: u32,
}

#[derive(Debug, Default)]
struct DummyState {
    next_handle: u64,
    buffers: HashMap<vk::Buffer, BufferRecord>,
    images: HashMap<vk::Image, DummyImageInfo>,
    image_views: HashMap<vk::ImageView, DummyImageViewInfo>,
    descriptor_pools: HashMap<vk::DescriptorPool, PoolRecord>,
    live_memory: HashMap<u64, u64>,
    device_views: HashMap<u64, Vec<u8>>,
    flushed: Vec<MappedRange>,
    invalidated: Vec<MappedRange>,
    stale_destroys: usize,
    fail_memory_allocation: bool,
}

impl DummyState {
    fn next_raw(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }
}

/// Dummy GPU backend.
#[derive(Debug)]
pub struct DummyBackend {
    limits: DeviceLimits,
    coherent_host_memory: bool,
    state: Mutex<DummyState>,
}

impl DummyBackend {
    /// Create a new dummy backend with default limits.
    pub fn new() -> Self {
        Self {
            limits: DeviceLimits::default(),
            coherent_host_memory: false,
            state: Mutex::new(DummyState::default()),
        }
    }

    /// Override the reported device limits.
    pub fn with_limits(mut self, limits: DeviceLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Report all host-visible memory as coherent.
    pub fn with_coherent_host_memory(mut self, coherent: bool) -> Self {
        self.coherent_host_memory = coherent;
        self
    }

    /// Make subsequent memory allocations fail with out-of-memory.
    pub fn set_fail_memory_allocation(&self, fail: bool) {
        self.state.lock().fail_memory_allocation = fail;
    }

    /// Number of live buffer objects.
    pub fn live_buffer_count(&self) -> usize {
        self.state.lock().buffers.len()
    }

    /// Number of live image objects.
    pub fn live_image_count(&self) -> usize {
        self.state.lock().images.len()
    }

    /// Number of live image views.
    pub fn live_image_view_count(&self) -> usize {
        self.state.lock().image_views.len()
    }

    /// Number of live memory allocations.
    pub fn live_memory_count(&self) -> usize {
        self.state.lock().live_memory.len()
    }

    /// Number of live descriptor pools.
    pub fn live_descriptor_pool_count(&self) -> usize {
        self.state.lock().descriptor_pools.len()
    }

    /// Whether the buffer has been created and not yet destroyed.
    pub fn is_buffer_alive(&self, buffer: vk::Buffer) -> bool {
        self.state.lock().buffers.contains_key(&buffer)
    }

    /// Whether the image has been created and not yet destroyed.
    pub fn is_image_alive(&self, image: vk::Image) -> bool {
        self.state.lock().images.contains_key(&image)
    }

    /// Creation size of a live buffer.
    pub fn buffer_size(&self, buffer: vk::Buffer) -> Option<u64> {
        self.state.lock().buffers.get(&buffer).map(|record| record.size)
    }

    /// Creation parameters of a live image.
    pub fn image_info(&self, image: vk::Image) -> Option<DummyImageInfo> {
        self.state.lock().images.get(&image).copied()
    }

    /// Creation parameters of a live image view.
    pub fn image_view_info(&self, view: vk::ImageView) -> Option<DummyImageViewInfo> {
        self.state.lock().image_views.get(&view).copied()
    }

    /// Maximum set count of a live descriptor pool.
    pub fn descriptor_pool_max_sets(&self, pool: vk::DescriptorPool) -> Option<u32> {
        self.state
            .lock()
            .descriptor_pools
            .get(&pool)
            .map(|record| record.max_sets)
    }

    /// Every range flushed so far, in call order.
    pub fn flushed_ranges(&self) -> Vec<MappedRange> {
        self.state.lock().flushed.clone()
    }

    /// Every range invalidated so far, in call order.
    pub fn invalidated_ranges(&self) -> Vec<MappedRange> {
        self.state.lock().invalidated.clone()
    }

    /// Forget recorded flushes and invalidations.
    pub fn clear_range_log(&self) {
        let mut state = self.state.lock();
        state.flushed.clear();
        state.invalidated.clear();
    }

    /// Number of destroy calls on handles that were not alive.
    pub fn stale_destroy_count(&self) -> usize {
        self.state.lock().stale_destroys
    }

    /// Bytes of a buffer as last made visible to the device by a flush.
    ///
    /// Coherent memory is never flushed, so its view keeps its initial zeros.
    pub fn device_visible_bytes(
        &self,
        buffer: vk::Buffer,
        offset: u64,
        len: u64,
    ) -> Option<Vec<u8>> {
        let state = self.state.lock();
        let memory_id = state.buffers.get(&buffer)?.memory_id?;
        let view = state.device_views.get(&memory_id)?;
        let start = usize::try_from(offset).ok()?;
        let end = start.checked_add(usize::try_from(len).ok()?)?;
        view.get(start..end).map(<[u8]>::to_vec)
    }

    fn allocate(
        &self,
        size: u64,
        flags: vk::MemoryPropertyFlags,
    ) -> Result<DummyMemory, GraphicsError> {
        let mut state = self.state.lock();
        if state.fail_memory_allocation {
            log::trace!("DummyBackend: injected allocation failure ({size} bytes)");
            return Err(GraphicsError::OutOfMemory);
        }

        let size = align_to_atom(size, self.limits.non_coherent_atom_size);
        let id = state.next_raw();
        state.live_memory.insert(id, size);
        state.device_views.insert(id, vec![0; size as usize]);

        let coherent = flags.contains(vk::MemoryPropertyFlags::HOST_COHERENT)
            || (self.coherent_host_memory && flags.contains(vk::MemoryPropertyFlags::HOST_VISIBLE));

        log::trace!("DummyBackend: allocated memory #{id} ({size} bytes, {flags:?})");
        Ok(DummyMemory {
            id,
            words: vec![0u64; size.div_ceil(8) as usize].into_boxed_slice(),
            size,
            coherent,
            mapped: false,
        })
    }

    fn check_mapped_range(
        &self,
        memory: &DummyMemory,
        offset: u64,
        size: u64,
    ) -> Result<(), GraphicsError> {
        if !memory.mapped {
            return Err(GraphicsError::InvalidParameter(format!(
                "memory #{} is not mapped",
                memory.id
            )));
        }
        let end = offset.checked_add(size).filter(|end| *end <= memory.size);
        let Some(end) = end else {
            return Err(GraphicsError::InvalidParameter(format!(
                "range {offset}+{size} exceeds memory #{} of {} bytes",
                memory.id, memory.size
            )));
        };
        let atom = self.limits.non_coherent_atom_size;
        if offset % atom != 0 || (end % atom != 0 && end != memory.size) {
            return Err(GraphicsError::InvalidParameter(format!(
                "range {offset}..{end} is not aligned to the {atom}-byte atom"
            )));
        }
        Ok(())
    }
}

impl Default for DummyBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn align_to_atom(size: u64, atom: u64) -> u64 {
    size.max(1).div_ceil(atom) * atom
}

fn pixel_bytes(format: vk::Format) -> u64 {
    Format::all()
        .iter()
        .find(|entry| entry.vk_texture_format == format)
        .map_or(4, |entry| u64::from(entry.pixel_bytes))
}

impl DeviceBackend for DummyBackend {
    type Memory = DummyMemory;

    fn name(&self) -> &'static str {
        "Dummy"
    }

    fn limits(&self) -> DeviceLimits {
        self.limits
    }

    fn create_buffer(&self, info: &vk::BufferCreateInfo<'_>) -> Result<vk::Buffer, GraphicsError> {
        if info.size == 0 {
            return Err(GraphicsError::InvalidParameter(
                "buffer size must be non-zero".to_string(),
            ));
        }
        let mut state = self.state.lock();
        let buffer = vk::Buffer::from_raw(state.next_raw());
        state.buffers.insert(
            buffer,
            BufferRecord {
                size: info.size,
                memory_id: None,
            },
        );
        log::trace!(
            "DummyBackend: creating buffer {buffer:?} (size: {}, usage: {:?})",
            info.size,
            info.usage
        );
        Ok(buffer)
    }

    fn destroy_buffer(&self, buffer: vk::Buffer) {
        let mut state = self.state.lock();
        if state.buffers.remove(&buffer).is_none() {
            log::warn!("DummyBackend: destroying unknown buffer {buffer:?}");
            state.stale_destroys += 1;
        }
    }

    fn allocate_buffer_memory(
        &self,
        buffer: vk::Buffer,
        flags: vk::MemoryPropertyFlags,
    ) -> Result<(DummyMemory, u64), GraphicsError> {
        let size = self.buffer_size(buffer).ok_or_else(|| {
            GraphicsError::InvalidParameter(format!("unknown buffer {buffer:?}"))
        })?;
        let memory = self.allocate(size, flags)?;
        if let Some(record) = self.state.lock().buffers.get_mut(&buffer) {
            record.memory_id = Some(memory.id);
        }
        let size = memory.size;
        Ok((memory, size))
    }

    fn create_image(&self, info: &vk::ImageCreateInfo<'_>) -> Result<vk::Image, GraphicsError> {
        if info.extent.width == 0 || info.extent.height == 0 || info.extent.depth == 0 {
            return Err(GraphicsError::InvalidParameter(
                "image extent must be non-zero".to_string(),
            ));
        }
        let mut state = self.state.lock();
        let image = vk::Image::from_raw(state.next_raw());
        state.images.insert(
            image,
            DummyImageInfo {
                format: info.format,
                extent: info.extent,
                mip_levels: info.mip_levels,
                array_layers: info.array_layers,
                samples: info.samples,
                tiling: info.tiling,
                usage: info.usage,
                initial_layout: info.initial_layout,
                flags: info.flags,
            },
        );
        log::trace!(
            "DummyBackend: creating image {image:?} ({}x{}x{}, {:?})",
            info.extent.width,
            info.extent.height,
            info.extent.depth,
            info.format
        );
        Ok(image)
    }

    fn destroy_image(&self, image: vk::Image) {
        let mut state = self.state.lock();
        if state.images.remove(&image).is_none() {
            log::warn!("DummyBackend: destroying unknown image {image:?}");
            state.stale_destroys += 1;
        }
    }

    fn allocate_image_memory(
        &self,
        image: vk::Image,
        flags: vk::MemoryPropertyFlags,
    ) -> Result<(DummyMemory, u64), GraphicsError> {
        let info = self.image_info(image).ok_or_else(|| {
            GraphicsError::InvalidParameter(format!("unknown image {image:?}"))
        })?;

        let texel_count: u64 = (0..info.mip_levels.max(1))
            .map(|level| {
                let width = u64::from((info.extent.width >> level).max(1));
                let height = u64::from((info.extent.height >> level).max(1));
                let depth = u64::from((info.extent.depth >> level).max(1));
                width * height * depth
            })
            .sum();
        let size = texel_count
            * u64::from(info.array_layers.max(1))
            * u64::from(info.samples.as_raw().max(1))
            * pixel_bytes(info.format);

        let memory = self.allocate(size, flags)?;
        let size = memory.size;
        Ok((memory, size))
    }

    fn create_image_view(
        &self,
        info: &vk::ImageViewCreateInfo<'_>,
    ) -> Result<vk::ImageView, GraphicsError> {
        let mut state = self.state.lock();
        if !state.images.contains_key(&info.image) {
            return Err(GraphicsError::InvalidParameter(format!(
                "view of unknown image {:?}",
                info.image
            )));
        }
        let view = vk::ImageView::from_raw(state.next_raw());
        state.image_views.insert(
            view,
            DummyImageViewInfo {
                image: info.image,
                view_type: info.view_type,
                format: info.format,
                subresource_range: info.subresource_range,
            },
        );
        Ok(view)
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        let mut state = self.state.lock();
        if state.image_views.remove(&view).is_none() {
            log::warn!("DummyBackend: destroying unknown image view {view:?}");
            state.stale_destroys += 1;
        }
    }

    fn free_memory(&self, memory: DummyMemory) {
        let mut state = self.state.lock();
        if state.live_memory.remove(&memory.id).is_none() {
            log::warn!("DummyBackend: freeing unknown memory #{}", memory.id);
            state.stale_destroys += 1;
        }
        state.device_views.remove(&memory.id);
        log::trace!("DummyBackend: freed memory #{}", memory.id);
    }

    fn map_memory(&self, memory: &mut DummyMemory) -> Result<NonNull<u8>, GraphicsError> {
        memory.mapped = true;
        NonNull::new(memory.words.as_mut_ptr().cast::<u8>())
            .ok_or_else(|| GraphicsError::Internal("null mapping".to_string()))
    }

    fn unmap_memory(&self, memory: &mut DummyMemory) {
        memory.mapped = false;
    }

    fn is_host_coherent(&self, memory: &DummyMemory) -> bool {
        memory.coherent
    }

    fn flush_mapped_range(
        &self,
        memory: &DummyMemory,
        offset: u64,
        size: u64,
    ) -> Result<(), GraphicsError> {
        self.check_mapped_range(memory, offset, size)?;

        let mut state = self.state.lock();
        let range = offset as usize..(offset + size) as usize;
        if let Some(view) = state.device_views.get_mut(&memory.id) {
            view[range.clone()].copy_from_slice(&memory.bytes()[range]);
        }
        state.flushed.push(MappedRange {
            memory_id: memory.id,
            offset,
            size,
        });
        log::trace!("DummyBackend: flushed memory #{} {offset}+{size}", memory.id);
        Ok(())
    }

    fn invalidate_mapped_range(
        &self,
        memory: &DummyMemory,
        offset: u64,
        size: u64,
    ) -> Result<(), GraphicsError> {
        self.check_mapped_range(memory, offset, size)?;

        self.state.lock().invalidated.push(MappedRange {
            memory_id: memory.id,
            offset,
            size,
        });
        log::trace!("DummyBackend: invalidated memory #{} {offset}+{size}", memory.id);
        Ok(())
    }

    fn create_descriptor_pool(
        &self,
        info: &vk::DescriptorPoolCreateInfo<'_>,
    ) -> Result<vk::DescriptorPool, GraphicsError> {
        let mut state = self.state.lock();
        let pool = vk::DescriptorPool::from_raw(state.next_raw());
        state.descriptor_pools.insert(
            pool,
            PoolRecord {
                max_sets: info.max_sets,
                allocated_sets: 0,
            },
        );
        log::trace!(
            "DummyBackend: creating descriptor pool {pool:?} (max sets: {})",
            info.max_sets
        );
        Ok(pool)
    }

    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        let mut state = self.state.lock();
        if state.descriptor_pools.remove(&pool).is_none() {
            log::warn!("DummyBackend: destroying unknown descriptor pool {pool:?}");
            state.stale_destroys += 1;
        }
    }

    fn allocate_descriptor_sets(
        &self,
        pool: vk::DescriptorPool,
        layouts: &[vk::DescriptorSetLayout],
    ) -> Result<Vec<vk::DescriptorSet>, GraphicsError> {
        let mut state = self.state.lock();
        let requested = layouts.len() as u32;
        let record = state.descriptor_pools.get_mut(&pool).ok_or_else(|| {
            GraphicsError::InvalidParameter(format!("unknown descriptor pool {pool:?}"))
        })?;
        if record.allocated_sets + requested > record.max_sets {
            return Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY.into());
        }
        record.allocated_sets += requested;

        let sets = (0..requested)
            .map(|_| vk::DescriptorSet::from_raw(state.next_raw()))
            .collect();
        Ok(sets)
    }
}

/// Image barrier as recorded by [`RecordingCommandBuffer`].
#[derive(Debug, Clone, Copy)]
pub struct RecordedImageBarrier {
    /// Target image.
    pub image: vk::Image,
    /// Layout before the barrier.
    pub old_layout: vk::ImageLayout,
    /// Layout after the barrier.
    pub new_layout: vk::ImageLayout,
    /// Source access mask.
    pub src_access_mask: vk::AccessFlags,
    /// Destination access mask.
    pub dst_access_mask: vk::AccessFlags,
    /// Affected subresources.
    pub subresource_range: vk::ImageSubresourceRange,
}

/// A command captured by [`RecordingCommandBuffer`].
#[derive(Debug, Clone)]
pub enum RecordedCommand {
    /// Pipeline barrier.
    PipelineBarrier {
        src_stage_mask: vk::PipelineStageFlags,
        dst_stage_mask: vk::PipelineStageFlags,
        image_barriers: Vec<RecordedImageBarrier>,
    },
    /// Buffer-to-buffer copy.
    CopyBuffer {
        src: vk::Buffer,
        dst: vk::Buffer,
        regions: Vec<vk::BufferCopy>,
    },
    /// Image-to-image copy.
    CopyImage {
        src: vk::Image,
        src_layout: vk::ImageLayout,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
        regions: Vec<vk::ImageCopy>,
    },
    /// Color clear, with the clear value as raw bits.
    ClearColor {
        image: vk::Image,
        layout: vk::ImageLayout,
        color_bits: [u32; 4],
        ranges: Vec<vk::ImageSubresourceRange>,
    },
    /// Depth/stencil clear.
    ClearDepthStencil {
        image: vk::Image,
        layout: vk::ImageLayout,
        depth: f32,
        stencil: u32,
        ranges: Vec<vk::ImageSubresourceRange>,
    },
    /// Indexed draw.
    DrawIndexed {
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    },
}

/// Command recorder that keeps every command in a list.
#[derive(Debug, Default)]
pub struct RecordingCommandBuffer {
    commands: Vec<RecordedCommand>,
}

impl RecordingCommandBuffer {
    /// Create an empty recording.
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded commands in order.
    pub fn commands(&self) -> &[RecordedCommand] {
        &self.commands
    }

    /// All image barriers recorded so far, flattened.
    pub fn image_barriers(&self) -> Vec<RecordedImageBarrier> {
        self.commands
            .iter()
            .filter_map(|command| match command {
                RecordedCommand::PipelineBarrier { image_barriers, .. } => Some(image_barriers),
                _ => None,
            })
            .flatten()
            .copied()
            .collect()
    }

    /// Drop all recorded commands.
    pub fn clear(&mut self) {
        self.commands.clear();
    }
}

impl CommandRecorder for RecordingCommandBuffer {
    fn pipeline_barrier(
        &mut self,
        src_stage_mask: vk::PipelineStageFlags,
        dst_stage_mask: vk::PipelineStageFlags,
        _dependency_flags: vk::DependencyFlags,
        image_barriers: &[vk::ImageMemoryBarrier<'_>],
    ) {
        let image_barriers = image_barriers
            .iter()
            .map(|barrier| RecordedImageBarrier {
                image: barrier.image,
                old_layout: barrier.old_layout,
                new_layout: barrier.new_layout,
                src_access_mask: barrier.src_access_mask,
                dst_access_mask: barrier.dst_access_mask,
                subresource_range: barrier.subresource_range,
            })
            .collect();
        self.commands.push(RecordedCommand::PipelineBarrier {
            src_stage_mask,
            dst_stage_mask,
            image_barriers,
        });
    }

    fn copy_buffer(&mut self, src: vk::Buffer, dst: vk::Buffer, regions: &[vk::BufferCopy]) {
        self.commands.push(RecordedCommand::CopyBuffer {
            src,
            dst,
            regions: regions.to_vec(),
        });
    }

    fn copy_image(
        &mut self,
        src: vk::Image,
        src_layout: vk::ImageLayout,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
        regions: &[vk::ImageCopy],
    ) {
        self.commands.push(RecordedCommand::CopyImage {
            src,
            src_layout,
            dst,
            dst_layout,
            regions: regions.to_vec(),
        });
    }

    fn clear_color_image(
        &mut self,
        image: vk::Image,
        layout: vk::ImageLayout,
        color: &vk::ClearColorValue,
        ranges: &[vk::ImageSubresourceRange],
    ) {
        // SAFETY: every variant of the union is four 32-bit values.
        let color_bits = unsafe { color.uint32 };
        self.commands.push(RecordedCommand::ClearColor {
            image,
            layout,
            color_bits,
            ranges: ranges.to_vec(),
        });
    }

    fn clear_depth_stencil_image(
        &mut self,
        image: vk::Image,
        layout: vk::ImageLayout,
        value: &vk::ClearDepthStencilValue,
        ranges: &[vk::ImageSubresourceRange],
    ) {
        self.commands.push(RecordedCommand::ClearDepthStencil {
            image,
            layout,
            depth: value.depth,
            stencil: value.stencil,
            ranges: ranges.to_vec(),
        });
    }

    fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) {
        self.commands.push(RecordedCommand::DrawIndexed {
            index_count,
            instance_count,
            first_index,
            vertex_offset,
            first_instance,
        });
    }
}
