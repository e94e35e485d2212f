//! # glvk Graphics
//!
//! Transient Vulkan resources for a GL-on-Vulkan renderer.
//!
//! ## Overview
//!
//! This crate provides:
//! - [`DynamicBuffer`] - Host-visible streaming buffer with sub-allocation
//! - [`DynamicDescriptorPool`] - Descriptor pool that grows instead of failing
//! - [`LineLoopHelper`] - Line-loop emulation through generated indices
//! - [`ImageHelper`] - Image with layout tracking and barrier recording
//! - [`GraphicsDevice`] - Queue serials and deferred destruction shared by all of them
//! - Backend support: Vulkan and Dummy (for testing)
//!
//! ## Example
//!
//! ```ignore
//! use glvk_graphics::{DummyBackend, GraphicsDevice, LineLoopHelper, RecordingCommandBuffer};
//!
//! let mut device = GraphicsDevice::new(DummyBackend::new());
//! let mut cmd = RecordingCommandBuffer::new();
//!
//! let mut line_loop = LineLoopHelper::new(&mut device);
//! let binding = line_loop.get_index_buffer_for_draw_arrays(&mut device, 0, 4)?;
//! LineLoopHelper::<DummyBackend>::draw(4, &mut cmd);
//!
//! let serial = device.submit();
//! line_loop.release(&mut device);
//! device.handle_completed_serial(serial);
//! ```

pub mod backend;
pub mod deferred;
pub mod device;
pub mod error;
pub mod resources;
pub mod types;

// Re-export main types for convenience
pub use backend::{
    CommandRecorder, DeviceBackend, DeviceLimits, DummyBackend, RecordedCommand,
    RecordingCommandBuffer,
};
pub use deferred::{GarbageObject, Serial};
pub use device::{GraphicsDevice, ResourceId};
pub use error::GraphicsError;
pub use resources::{
    DescriptorSetCategory, DynamicAllocation, DynamicBuffer, DynamicDescriptorPool, ImageHelper,
    ImageLayout, LineLoopHelper, SourceBuffer,
};
pub use types::{
    ClientIndices, DynamicBufferDescriptor, Extent3d, Format, FormatId, IndexBufferBinding,
    Offset3d, StagingUsage, TextureType,
};

/// Graphics library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
