//! Common types and descriptors for transient resources.
//!
//! This module contains the format registry, extents, texture shapes and
//! descriptor structs used throughout the crate.

mod buffer;
mod common;
mod format;
mod texture;

pub use buffer::{ClientIndices, DynamicBufferDescriptor, IndexBufferBinding, index_type_size};
pub use common::{Extent3d, Offset3d, sample_count_flags};
pub use format::{Format, FormatId};
pub use texture::{StagingUsage, TextureType};
