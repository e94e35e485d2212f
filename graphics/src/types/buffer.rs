//! Buffer descriptors.

use ash::vk;

/// Descriptor for a dynamic (streaming) buffer.
///
/// The minimum size is the size of every backing block the buffer allocates,
/// unless a single request is larger.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DynamicBufferDescriptor {
    /// Debug label for the buffer.
    pub label: Option<String>,
    /// Native usage flags of every backing block.
    pub usage: vk::BufferUsageFlags,
    /// Minimum size of a backing block in bytes.
    pub min_size: u64,
}

impl DynamicBufferDescriptor {
    /// Create a new dynamic buffer descriptor.
    pub fn new(usage: vk::BufferUsageFlags, min_size: u64) -> Self {
        Self {
            label: None,
            usage,
            min_size,
        }
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Where a bound index buffer lives and how to interpret it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IndexBufferBinding {
    /// Native buffer handle.
    pub buffer: vk::Buffer,
    /// Byte offset of the first index.
    pub offset: u64,
    /// Index element type.
    pub index_type: vk::IndexType,
}

/// Host-side index data supplied by a client draw call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientIndices<'a> {
    /// 8-bit indices (widened to 16-bit before upload).
    U8(&'a [u8]),
    /// 16-bit indices.
    U16(&'a [u16]),
    /// 32-bit indices.
    U32(&'a [u32]),
}

impl ClientIndices<'_> {
    /// Number of indices.
    pub fn len(&self) -> usize {
        match self {
            Self::U8(indices) => indices.len(),
            Self::U16(indices) => indices.len(),
            Self::U32(indices) => indices.len(),
        }
    }

    /// Returns true if there are no indices.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Index type used on the GPU for this data.
    pub fn gpu_index_type(&self) -> vk::IndexType {
        match self {
            Self::U8(_) | Self::U16(_) => vk::IndexType::UINT16,
            Self::U32(_) => vk::IndexType::UINT32,
        }
    }
}

/// Size in bytes of one index of the given type.
///
/// Only 16- and 32-bit indices are bindable; 8-bit data is widened first.
pub fn index_type_size(index_type: vk::IndexType) -> u64 {
    if index_type == vk::IndexType::UINT16 {
        2
    } else {
        4
    }
}
