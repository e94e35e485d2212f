//! GPU resource helpers.
//!
//! This module contains the helpers that sit between a GL-style frontend and
//! a [`GraphicsDevice`]:
//! - [`DynamicBuffer`] - Host-visible ring of sub-allocations
//! - [`DynamicDescriptorPool`] - Growable descriptor pool with per-category budgets
//! - [`LineLoopHelper`] - Index generation for line-loop draws
//! - [`ImageHelper`] - Image with tracked layout and barrier recording
//!
//! Helpers never destroy objects the GPU may still use. `release` hands them
//! to the device's deferred destructor, tagged with the current serial.
//!
//! [`GraphicsDevice`]: crate::GraphicsDevice

mod descriptor_pool;
mod dynamic_buffer;
mod image;
mod layout;
mod line_loop;

use ash::vk;

use crate::device::ResourceId;

pub use descriptor_pool::{DEFAULT_MAX_SETS_PER_POOL, DescriptorSetCategory, DynamicDescriptorPool};
pub use dynamic_buffer::{DynamicAllocation, DynamicBuffer};
pub use image::ImageHelper;
pub use layout::{ImageLayout, transition_access_masks};
pub use line_loop::{LINE_LOOP_BUFFER_USAGE, LINE_LOOP_MIN_BUFFER_SIZE, LineLoopHelper};

/// A GPU buffer other helpers can read from.
///
/// Readers register themselves before recording work that reads the
/// buffer, so the owner can order its own writes after those reads.
pub trait SourceBuffer {
    /// Native buffer handle.
    fn handle(&self) -> vk::Buffer;

    /// Record that `reader` reads this buffer in the commands being recorded.
    fn add_read_dependency(&mut self, reader: ResourceId);
}
