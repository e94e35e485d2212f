//! Format registry.
//!
//! Maps a logical pixel format to the native formats used for images and
//! buffers. Entries live in a static table so images can hold a plain
//! `&'static Format` without owning it.

use ash::vk;
use static_assertions::const_assert_eq;

/// Logical pixel format identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(usize)]
pub enum FormatId {
    /// 8-bit red channel, unsigned normalized.
    R8Unorm = 0,
    /// 8-bit RG channels, unsigned normalized.
    Rg8Unorm = 1,
    /// 5-6-5 packed RGB.
    R5G6B5Unorm = 2,
    /// 8-bit RGBA channels, unsigned normalized.
    #[default]
    Rgba8Unorm = 3,
    /// 8-bit RGBA channels, sRGB.
    Rgba8UnormSrgb = 4,
    /// 8-bit BGRA channels, unsigned normalized (swapchain images).
    Bgra8Unorm = 5,
    /// 16-bit RGBA channels, float.
    Rgba16Float = 6,
    /// 32-bit RGBA channels, float.
    Rgba32Float = 7,
    /// 16-bit depth.
    Depth16Unorm = 8,
    /// 24-bit depth with 8-bit stencil.
    Depth24UnormStencil8 = 9,
    /// 32-bit depth, float.
    Depth32Float = 10,
    /// 32-bit depth float with 8-bit stencil.
    Depth32FloatStencil8 = 11,
    /// 8-bit stencil only.
    Stencil8 = 12,
}

impl FormatId {
    /// Number of registered formats.
    pub const COUNT: usize = 13;
}

/// Native description of a logical format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Format {
    /// Logical identifier.
    pub id: FormatId,
    /// Format used for images.
    pub vk_texture_format: vk::Format,
    /// Format used for buffer views and vertex data.
    pub vk_buffer_format: vk::Format,
    /// Bytes per pixel.
    pub pixel_bytes: u32,
    /// Depth bits (0 for color formats).
    pub depth_bits: u32,
    /// Stencil bits (0 for color formats).
    pub stencil_bits: u32,
}

const fn entry(
    id: FormatId,
    vk_texture_format: vk::Format,
    vk_buffer_format: vk::Format,
    pixel_bytes: u32,
    depth_bits: u32,
    stencil_bits: u32,
) -> Format {
    Format {
        id,
        vk_texture_format,
        vk_buffer_format,
        pixel_bytes,
        depth_bits,
        stencil_bits,
    }
}

static FORMAT_TABLE: [Format; FormatId::COUNT] = [
    entry(FormatId::R8Unorm, vk::Format::R8_UNORM, vk::Format::R8_UNORM, 1, 0, 0),
    entry(FormatId::Rg8Unorm, vk::Format::R8G8_UNORM, vk::Format::R8G8_UNORM, 2, 0, 0),
    entry(
        FormatId::R5G6B5Unorm,
        vk::Format::R5G6B5_UNORM_PACK16,
        vk::Format::R5G6B5_UNORM_PACK16,
        2,
        0,
        0,
    ),
    entry(
        FormatId::Rgba8Unorm,
        vk::Format::R8G8B8A8_UNORM,
        vk::Format::R8G8B8A8_UNORM,
        4,
        0,
        0,
    ),
    entry(
        FormatId::Rgba8UnormSrgb,
        vk::Format::R8G8B8A8_SRGB,
        vk::Format::R8G8B8A8_UNORM,
        4,
        0,
        0,
    ),
    entry(
        FormatId::Bgra8Unorm,
        vk::Format::B8G8R8A8_UNORM,
        vk::Format::B8G8R8A8_UNORM,
        4,
        0,
        0,
    ),
    entry(
        FormatId::Rgba16Float,
        vk::Format::R16G16B16A16_SFLOAT,
        vk::Format::R16G16B16A16_SFLOAT,
        8,
        0,
        0,
    ),
    entry(
        FormatId::Rgba32Float,
        vk::Format::R32G32B32A32_SFLOAT,
        vk::Format::R32G32B32A32_SFLOAT,
        16,
        0,
        0,
    ),
    entry(FormatId::Depth16Unorm, vk::Format::D16_UNORM, vk::Format::UNDEFINED, 2, 16, 0),
    entry(
        FormatId::Depth24UnormStencil8,
        vk::Format::D24_UNORM_S8_UINT,
        vk::Format::UNDEFINED,
        4,
        24,
        8,
    ),
    entry(FormatId::Depth32Float, vk::Format::D32_SFLOAT, vk::Format::UNDEFINED, 4, 32, 0),
    entry(
        FormatId::Depth32FloatStencil8,
        vk::Format::D32_SFLOAT_S8_UINT,
        vk::Format::UNDEFINED,
        8,
        32,
        8,
    ),
    entry(FormatId::Stencil8, vk::Format::S8_UINT, vk::Format::UNDEFINED, 1, 0, 8),
];

const_assert_eq!(FormatId::Stencil8 as usize + 1, FormatId::COUNT);

impl Format {
    /// Look up the registry entry for a logical format.
    pub fn get(id: FormatId) -> &'static Format {
        &FORMAT_TABLE[id as usize]
    }

    /// All registered formats.
    pub fn all() -> &'static [Format] {
        &FORMAT_TABLE
    }

    /// Returns true if this is a depth or stencil format.
    pub fn is_depth_stencil(&self) -> bool {
        self.depth_bits > 0 || self.stencil_bits > 0
    }

    /// Image aspects covered by this format.
    pub fn aspect_flags(&self) -> vk::ImageAspectFlags {
        let mut aspect = vk::ImageAspectFlags::empty();
        if self.depth_bits > 0 {
            aspect |= vk::ImageAspectFlags::DEPTH;
        }
        if self.stencil_bits > 0 {
            aspect |= vk::ImageAspectFlags::STENCIL;
        }
        if aspect.is_empty() {
            aspect = vk::ImageAspectFlags::COLOR;
        }
        aspect
    }
}
