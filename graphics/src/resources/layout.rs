//! Image layouts and the access masks of layout transitions.
//!
//! [`ImageLayout`] is the closed set of layouts an [`ImageHelper`] can be
//! in. [`transition_access_masks`] derives the source and destination access
//! masks of a barrier from the old and new layouts: a baseline per layout
//! plus a few additive cases for host-written and sampled images.
//!
//! [`ImageHelper`]: super::ImageHelper

use ash::vk;

/// Image layout states tracked per image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ImageLayout {
    /// Contents undefined. Can transition to any layout.
    #[default]
    Undefined,
    /// General layout (least optimal but most flexible).
    General,
    /// Optimal for color attachment writes.
    ColorAttachment,
    /// Optimal for depth/stencil attachment writes.
    DepthStencilAttachment,
    /// Optimal for depth/stencil testing without writes.
    DepthStencilReadOnly,
    /// Optimal for shader sampling.
    ShaderReadOnly,
    /// Optimal for transfer source operations.
    TransferSrc,
    /// Optimal for transfer destination operations.
    TransferDst,
    /// Linear image written by the host before first use.
    Preinitialized,
    /// Optimal for presentation to a swapchain.
    PresentSrc,
}

impl ImageLayout {
    /// Convert to Vulkan image layout.
    pub fn to_vk(self) -> vk::ImageLayout {
        match self {
            Self::Undefined => vk::ImageLayout::UNDEFINED,
            Self::General => vk::ImageLayout::GENERAL,
            Self::ColorAttachment => vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            Self::DepthStencilAttachment => vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            Self::DepthStencilReadOnly => vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
            Self::ShaderReadOnly => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            Self::TransferSrc => vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            Self::TransferDst => vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            Self::Preinitialized => vk::ImageLayout::PREINITIALIZED,
            Self::PresentSrc => vk::ImageLayout::PRESENT_SRC_KHR,
        }
    }

    /// Accesses that characterize work done in this layout.
    pub fn basic_access_mask(self) -> vk::AccessFlags {
        match self {
            Self::ColorAttachment => vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            Self::DepthStencilAttachment => vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            Self::DepthStencilReadOnly => vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ,
            Self::ShaderReadOnly => vk::AccessFlags::SHADER_READ,
            Self::TransferSrc => vk::AccessFlags::TRANSFER_READ,
            Self::TransferDst => vk::AccessFlags::TRANSFER_WRITE,
            Self::PresentSrc => vk::AccessFlags::MEMORY_READ,
            Self::Undefined | Self::General | Self::Preinitialized => vk::AccessFlags::empty(),
        }
    }

    /// Whether copies can use the image in this layout as a source without
    /// a transition.
    pub fn is_transfer_src_ready(self) -> bool {
        matches!(self, Self::TransferSrc | Self::General)
    }

    /// Whether copies can use the image in this layout as a destination
    /// without a transition.
    pub fn is_transfer_dst_ready(self) -> bool {
        matches!(self, Self::TransferDst | Self::General)
    }
}

/// Source and destination access masks for a transition from `old` to `new`.
pub fn transition_access_masks(
    old: ImageLayout,
    new: ImageLayout,
) -> (vk::AccessFlags, vk::AccessFlags) {
    let mut src = old.basic_access_mask();
    let mut dst = new.basic_access_mask();

    if old == ImageLayout::Preinitialized {
        src |= vk::AccessFlags::HOST_WRITE;
    }

    match new {
        ImageLayout::ShaderReadOnly => {
            // Sampled images are filled by host writes or transfers.
            src |= vk::AccessFlags::HOST_WRITE | vk::AccessFlags::TRANSFER_WRITE;
            dst |= vk::AccessFlags::SHADER_READ;
        }
        ImageLayout::DepthStencilAttachment => {
            dst |= vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE;
        }
        _ => {}
    }

    (src, dst)
}
