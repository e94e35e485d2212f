//! Image resource with layout tracking.
//!
//! An [`ImageHelper`] owns (or borrows, for swapchain images) a native image
//! and tracks the single layout the image is in after the most recently
//! recorded barrier. Transitions, clears and copies record their barriers
//! into a caller-supplied [`CommandRecorder`], so the tracked layout follows
//! recording order rather than GPU execution.

use ash::vk;

use crate::backend::{CommandRecorder, DeviceBackend};
use crate::deferred::{GarbageObject, Serial};
use crate::device::GraphicsDevice;
use crate::error::GraphicsError;
use crate::resources::layout::{ImageLayout, transition_access_masks};
use crate::types::{Extent3d, Format, Offset3d, StagingUsage, TextureType, sample_count_flags};

#[derive(Debug)]
enum ImageStorage<M> {
    /// Created by this helper; destroyed with it.
    Owned { image: vk::Image, memory: Option<M> },
    /// Owned elsewhere (e.g. by a swapchain); never destroyed here.
    Borrowed { image: vk::Image },
}

impl<M> ImageStorage<M> {
    fn image(&self) -> vk::Image {
        match self {
            Self::Owned { image, .. } | Self::Borrowed { image } => *image,
        }
    }
}

/// A native image plus the state needed to transition and copy it.
pub struct ImageHelper<B: DeviceBackend> {
    storage: Option<ImageStorage<B::Memory>>,
    extents: Extent3d,
    format: Option<&'static Format>,
    samples: u32,
    layer_count: u32,
    current_layout: ImageLayout,
    allocated_memory_size: u64,
}

impl<B: DeviceBackend> ImageHelper<B> {
    /// Create an empty helper.
    pub fn new() -> Self {
        Self {
            storage: None,
            extents: Extent3d::default(),
            format: None,
            samples: 0,
            layer_count: 0,
            current_layout: ImageLayout::Undefined,
            allocated_memory_size: 0,
        }
    }

    /// Create an optimally tiled image in the undefined layout.
    ///
    /// Memory is bound separately with [`init_memory`](Self::init_memory).
    #[allow(clippy::too_many_arguments)]
    pub fn init(
        &mut self,
        device: &GraphicsDevice<B>,
        texture_type: TextureType,
        extents: Extent3d,
        format: &'static Format,
        samples: u32,
        usage: vk::ImageUsageFlags,
        mip_levels: u32,
    ) -> Result<(), GraphicsError> {
        debug_assert!(!self.valid(), "image initialized twice");

        self.extents = extents;
        self.format = Some(format);
        self.samples = samples;
        self.layer_count = texture_type.layer_count(extents.depth);
        self.current_layout = ImageLayout::Undefined;

        let info = vk::ImageCreateInfo::default()
            .flags(texture_type.create_flags())
            .image_type(texture_type.image_type())
            .format(format.vk_texture_format)
            .extent(vk::Extent3D {
                width: extents.width,
                height: extents.height,
                depth: texture_type.image_depth(extents.depth),
            })
            .mip_levels(mip_levels.max(1))
            .array_layers(self.layer_count)
            .samples(sample_count_flags(samples))
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = device.backend().create_image(&info)?;
        log::trace!(
            "ImageHelper: created {texture_type:?} image {image:?} ({}x{}x{}, {:?}, {} layers)",
            extents.width,
            extents.height,
            extents.depth,
            format.id,
            self.layer_count
        );
        self.storage = Some(ImageStorage::Owned {
            image,
            memory: None,
        });
        Ok(())
    }

    /// Allocate a dedicated memory block and bind it to the image.
    pub fn init_memory(
        &mut self,
        device: &GraphicsDevice<B>,
        flags: vk::MemoryPropertyFlags,
    ) -> Result<(), GraphicsError> {
        let Some(ImageStorage::Owned { image, memory }) = &mut self.storage else {
            return Err(GraphicsError::InvalidParameter(
                "memory can only be bound to an owned image".to_string(),
            ));
        };
        debug_assert!(memory.is_none(), "image memory initialized twice");

        let (allocated, size) = device.backend().allocate_image_memory(*image, flags)?;
        *memory = Some(allocated);
        self.allocated_memory_size = size;
        Ok(())
    }

    /// Create a view covering every layer of the image.
    ///
    /// The caller owns the view.
    pub fn init_image_view(
        &self,
        device: &GraphicsDevice<B>,
        texture_type: TextureType,
        aspect_mask: vk::ImageAspectFlags,
        swizzle: vk::ComponentMapping,
        level_count: u32,
    ) -> Result<vk::ImageView, GraphicsError> {
        let (Some(storage), Some(format)) = (&self.storage, self.format) else {
            return Err(GraphicsError::InvalidParameter(
                "view of an uninitialized image".to_string(),
            ));
        };

        let info = vk::ImageViewCreateInfo::default()
            .image(storage.image())
            .view_type(texture_type.view_type())
            .format(format.vk_texture_format)
            .components(swizzle)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask,
                base_mip_level: 0,
                level_count,
                base_array_layer: 0,
                layer_count: self.layer_count,
            });
        device.backend().create_image_view(&info)
    }

    /// Queue a view made by [`init_image_view`](Self::init_image_view) for
    /// destruction after the current serial.
    pub fn release_image_view(view: vk::ImageView, device: &mut GraphicsDevice<B>) {
        let serial = device.current_queue_serial();
        device.release_object(serial, GarbageObject::ImageView(view));
    }

    /// Create a linear, host-coherent 2D image for CPU upload or readback.
    ///
    /// Readback images also ask for cached memory.
    ///
    /// Writable staging images start `Preinitialized` so they can be mapped
    /// and filled before the first copy.
    pub fn init_2d_staging(
        &mut self,
        device: &GraphicsDevice<B>,
        format: &'static Format,
        extents: Extent3d,
        usage: StagingUsage,
    ) -> Result<(), GraphicsError> {
        debug_assert!(!self.valid(), "image initialized twice");

        self.extents = extents;
        self.format = Some(format);
        self.samples = 1;
        self.layer_count = 1;
        self.current_layout = match usage {
            StagingUsage::Read => ImageLayout::Undefined,
            StagingUsage::Write | StagingUsage::Both => ImageLayout::Preinitialized,
        };

        let info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format.vk_texture_format)
            .extent(vk::Extent3D {
                width: extents.width,
                height: extents.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::LINEAR)
            .usage(usage.image_usage())
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(self.current_layout.to_vk());

        let image = device.backend().create_image(&info)?;
        self.storage = Some(ImageStorage::Owned {
            image,
            memory: None,
        });

        self.init_memory(device, usage.memory_properties())
    }

    /// Wrap an image owned elsewhere, such as a swapchain image.
    pub fn init_2d_weak_reference(
        &mut self,
        handle: vk::Image,
        extents: Extent3d,
        format: &'static Format,
        samples: u32,
    ) {
        debug_assert!(!self.valid(), "image initialized twice");

        self.extents = extents;
        self.format = Some(format);
        self.samples = samples;
        self.layer_count = 1;
        self.storage = Some(ImageStorage::Borrowed { image: handle });
    }

    /// Forget a borrowed image without destroying it.
    pub fn reset_image_weak_reference(&mut self) {
        debug_assert!(
            !matches!(self.storage, Some(ImageStorage::Owned { .. })),
            "resetting an owned image as a weak reference"
        );
        if matches!(self.storage, Some(ImageStorage::Borrowed { .. })) {
            self.storage = None;
        }
    }

    /// Record a barrier moving the whole image to `new_layout`.
    ///
    /// The tracked layout changes immediately, even when `new_layout` equals
    /// the current one.
    pub fn change_layout_with_stages(
        &mut self,
        aspect_mask: vk::ImageAspectFlags,
        new_layout: ImageLayout,
        src_stage_mask: vk::PipelineStageFlags,
        dst_stage_mask: vk::PipelineStageFlags,
        cmd: &mut impl CommandRecorder,
    ) {
        debug_assert!(self.valid(), "layout change on an uninitialized image");
        let (src_access_mask, dst_access_mask) =
            transition_access_masks(self.current_layout, new_layout);

        let barrier = vk::ImageMemoryBarrier::default()
            .src_access_mask(src_access_mask)
            .dst_access_mask(dst_access_mask)
            .old_layout(self.current_layout.to_vk())
            .new_layout(new_layout.to_vk())
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(self.image())
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask,
                base_mip_level: 0,
                level_count: vk::REMAINING_MIP_LEVELS,
                base_array_layer: 0,
                layer_count: self.layer_count,
            });

        cmd.pipeline_barrier(
            src_stage_mask,
            dst_stage_mask,
            vk::DependencyFlags::empty(),
            &[barrier],
        );
        self.current_layout = new_layout;
    }

    /// Clear `level_count` mips starting at `mip_level` to `color`.
    pub fn clear_color(
        &mut self,
        color: &vk::ClearColorValue,
        mip_level: u32,
        level_count: u32,
        cmd: &mut impl CommandRecorder,
    ) {
        self.change_layout_with_stages(
            vk::ImageAspectFlags::COLOR,
            ImageLayout::TransferDst,
            vk::PipelineStageFlags::ALL_COMMANDS,
            vk::PipelineStageFlags::TRANSFER,
            cmd,
        );

        let range = vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: mip_level,
            level_count,
            base_array_layer: 0,
            layer_count: self.layer_count,
        };
        cmd.clear_color_image(self.image(), self.current_layout.to_vk(), color, &[range]);
    }

    /// Clear mip 0, layer 0 of the given depth/stencil aspects.
    pub fn clear_depth_stencil(
        &mut self,
        aspect_mask: vk::ImageAspectFlags,
        value: &vk::ClearDepthStencilValue,
        cmd: &mut impl CommandRecorder,
    ) {
        self.change_layout_with_stages(
            aspect_mask,
            ImageLayout::TransferDst,
            vk::PipelineStageFlags::ALL_COMMANDS,
            vk::PipelineStageFlags::TRANSFER,
            cmd,
        );

        let range = vk::ImageSubresourceRange {
            aspect_mask,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        };
        cmd.clear_depth_stencil_image(self.image(), self.current_layout.to_vk(), value, &[range]);
    }

    /// Copy a region of mip 0, layer 0 from `src` to `dst`.
    ///
    /// Each image is first moved to its transfer layout unless it is
    /// already there or in `General`.
    #[allow(clippy::too_many_arguments)]
    pub fn copy(
        src: &mut Self,
        dst: &mut Self,
        src_offset: Offset3d,
        dst_offset: Offset3d,
        size: Extent3d,
        aspect_mask: vk::ImageAspectFlags,
        cmd: &mut impl CommandRecorder,
    ) {
        debug_assert!(src.valid() && dst.valid(), "copy between uninitialized images");

        if !src.current_layout.is_transfer_src_ready() {
            src.change_layout_with_stages(
                aspect_mask,
                ImageLayout::TransferSrc,
                vk::PipelineStageFlags::ALL_COMMANDS,
                vk::PipelineStageFlags::TRANSFER,
                cmd,
            );
        }
        if !dst.current_layout.is_transfer_dst_ready() {
            dst.change_layout_with_stages(
                aspect_mask,
                ImageLayout::TransferDst,
                vk::PipelineStageFlags::ALL_COMMANDS,
                vk::PipelineStageFlags::TRANSFER,
                cmd,
            );
        }

        let subresource = vk::ImageSubresourceLayers {
            aspect_mask,
            mip_level: 0,
            base_array_layer: 0,
            layer_count: 1,
        };
        let region = vk::ImageCopy {
            src_subresource: subresource,
            src_offset: src_offset.to_vk(),
            dst_subresource: subresource,
            dst_offset: dst_offset.to_vk(),
            extent: size.to_vk(),
        };

        cmd.copy_image(
            src.image(),
            src.current_layout.to_vk(),
            dst.image(),
            dst.current_layout.to_vk(),
            &[region],
        );
    }

    /// Extents of a 2D mip level.
    pub fn get_size(&self, mip_level: u32) -> Extent3d {
        debug_assert_eq!(self.extents.depth, 1, "mip sizes of volume images");
        let shrink = |value: u32| value.checked_shr(mip_level).unwrap_or(0).max(1);
        Extent3d::new(
            shrink(self.extents.width),
            shrink(self.extents.height),
            self.extents.depth,
        )
    }

    /// Queue the image and its memory for destruction after `serial`.
    ///
    /// Borrowed images are only forgotten.
    pub fn release(&mut self, serial: Serial, device: &mut GraphicsDevice<B>) {
        if let Some(ImageStorage::Owned { image, memory }) = self.storage.take() {
            device.release_object(serial, GarbageObject::Image(image));
            if let Some(memory) = memory {
                device.release_object(serial, GarbageObject::Memory(memory));
            }
        }
        self.reset();
    }

    /// Destroy the image and its memory immediately.
    ///
    /// Borrowed images are only forgotten.
    pub fn destroy(&mut self, device: &GraphicsDevice<B>) {
        if let Some(ImageStorage::Owned { image, memory }) = self.storage.take() {
            device.backend().destroy_image(image);
            if let Some(memory) = memory {
                device.backend().free_memory(memory);
            }
        }
        self.reset();
    }

    fn reset(&mut self) {
        self.current_layout = ImageLayout::Undefined;
        self.layer_count = 0;
        self.allocated_memory_size = 0;
    }

    /// Returns true if the helper holds an image.
    pub fn valid(&self) -> bool {
        self.storage.is_some()
    }

    /// Returns true if the image is owned elsewhere.
    pub fn is_weak_reference(&self) -> bool {
        matches!(self.storage, Some(ImageStorage::Borrowed { .. }))
    }

    /// Native image handle (null when uninitialized).
    pub fn image(&self) -> vk::Image {
        self.storage
            .as_ref()
            .map_or_else(vk::Image::null, ImageStorage::image)
    }

    /// Extents of mip 0.
    pub fn extents(&self) -> Extent3d {
        self.extents
    }

    /// Format registry entry.
    pub fn format(&self) -> Option<&'static Format> {
        self.format
    }

    /// Sample count.
    pub fn samples(&self) -> u32 {
        self.samples
    }

    /// Number of array layers.
    pub fn layer_count(&self) -> u32 {
        self.layer_count
    }

    /// Layout after the most recently recorded barrier.
    pub fn current_layout(&self) -> ImageLayout {
        self.current_layout
    }

    /// Size of the bound memory block in bytes.
    pub fn allocated_memory_size(&self) -> u64 {
        self.allocated_memory_size
    }
}

impl<B: DeviceBackend> Default for ImageHelper<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: DeviceBackend> Drop for ImageHelper<B> {
    fn drop(&mut self) {
        let owned = matches!(self.storage, Some(ImageStorage::Owned { .. }));
        if owned && !std::thread::panicking() {
            log::warn!("ImageHelper {:?} dropped without release or destroy", self.image());
            debug_assert!(!owned, "image dropped while owning its handle");
        }
    }
}

impl<B: DeviceBackend> std::fmt::Debug for ImageHelper<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageHelper")
            .field("image", &self.image())
            .field("weak", &self.is_weak_reference())
            .field("extents", &self.extents)
            .field("format", &self.format.map(|format| format.id))
            .field("layer_count", &self.layer_count)
            .field("current_layout", &self.current_layout)
            .finish()
    }
}
