//! Graphics error types.

use std::fmt;

use ash::vk;

use crate::resources::DescriptorSetCategory;

/// Errors that can occur while managing transient GPU resources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphicsError {
    /// Failed to create a native resource (buffer, image, view, pool, memory).
    ResourceCreationFailed(String),
    /// Out of host or device memory.
    OutOfMemory,
    /// The GPU device was lost.
    DeviceLost,
    /// An invalid parameter was provided.
    InvalidParameter(String),
    /// A freshly grown descriptor pool still cannot satisfy a request.
    ///
    /// The pool sizes do not match the demand placed on them.
    DescriptorPoolExhausted {
        /// Category the sets were requested from.
        category: DescriptorSetCategory,
        /// Number of sets requested.
        requested: u32,
        /// Capacity of a whole pool for this category.
        available: u32,
    },
    /// An internal error occurred.
    Internal(String),
}

impl fmt::Display for GraphicsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ResourceCreationFailed(msg) => write!(f, "resource creation failed: {msg}"),
            Self::OutOfMemory => write!(f, "out of GPU memory"),
            Self::DeviceLost => write!(f, "GPU device lost"),
            Self::InvalidParameter(msg) => write!(f, "invalid parameter: {msg}"),
            Self::DescriptorPoolExhausted {
                category,
                requested,
                available,
            } => write!(
                f,
                "descriptor pool exhausted: requested {requested} {category:?} sets, \
                 a fresh pool holds {available}"
            ),
            Self::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for GraphicsError {}

impl From<vk::Result> for GraphicsError {
    fn from(result: vk::Result) -> Self {
        match result {
            vk::Result::ERROR_OUT_OF_HOST_MEMORY
            | vk::Result::ERROR_OUT_OF_DEVICE_MEMORY
            | vk::Result::ERROR_OUT_OF_POOL_MEMORY => Self::OutOfMemory,
            vk::Result::ERROR_DEVICE_LOST => Self::DeviceLost,
            other => Self::Internal(format!("Vulkan call failed: {other:?}")),
        }
    }
}
