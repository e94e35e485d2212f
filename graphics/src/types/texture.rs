//! Texture shape and staging usage.

use ash::vk;

/// Shape of a texture as seen by the front-end API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureType {
    /// Plain 2D texture.
    #[default]
    Texture2D,
    /// 2D array texture; the layer count comes from the extent depth.
    Texture2DArray,
    /// 3D (volume) texture.
    Texture3D,
    /// Cube map (six 2D layers).
    CubeMap,
}

impl TextureType {
    /// Number of array layers an image of this type has.
    pub fn layer_count(self, depth: u32) -> u32 {
        match self {
            Self::Texture2D | Self::Texture3D => 1,
            Self::Texture2DArray => depth.max(1),
            Self::CubeMap => 6,
        }
    }

    /// Vulkan image type.
    pub fn image_type(self) -> vk::ImageType {
        match self {
            Self::Texture2D | Self::Texture2DArray | Self::CubeMap => vk::ImageType::TYPE_2D,
            Self::Texture3D => vk::ImageType::TYPE_3D,
        }
    }

    /// Vulkan image view type.
    pub fn view_type(self) -> vk::ImageViewType {
        match self {
            Self::Texture2D => vk::ImageViewType::TYPE_2D,
            Self::Texture2DArray => vk::ImageViewType::TYPE_2D_ARRAY,
            Self::Texture3D => vk::ImageViewType::TYPE_3D,
            Self::CubeMap => vk::ImageViewType::CUBE,
        }
    }

    /// Image create flags required by this texture type.
    pub fn create_flags(self) -> vk::ImageCreateFlags {
        match self {
            Self::CubeMap => vk::ImageCreateFlags::CUBE_COMPATIBLE,
            _ => vk::ImageCreateFlags::empty(),
        }
    }

    /// Depth of the native image extent (layers are not part of the extent).
    pub fn image_depth(self, depth: u32) -> u32 {
        match self {
            Self::Texture3D => depth.max(1),
            _ => 1,
        }
    }
}

/// How a host-visible staging image will be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StagingUsage {
    /// The GPU writes into the image and the host reads it back.
    Read,
    /// The host writes into the image and the GPU copies from it.
    Write,
    /// Both directions.
    Both,
}

impl StagingUsage {
    /// Image usage flags for a staging image.
    pub fn image_usage(self) -> vk::ImageUsageFlags {
        match self {
            Self::Read => vk::ImageUsageFlags::TRANSFER_DST,
            Self::Write => vk::ImageUsageFlags::TRANSFER_SRC,
            Self::Both => vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::TRANSFER_SRC,
        }
    }

    /// Memory properties for a staging image. Readback adds `HOST_CACHED`.
    pub fn memory_properties(self) -> vk::MemoryPropertyFlags {
        let coherent =
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        match self {
            Self::Read => coherent | vk::MemoryPropertyFlags::HOST_CACHED,
            Self::Write | Self::Both => coherent,
        }
    }
}
