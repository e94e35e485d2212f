//! Common utilities for resource integration tests.
//!
//! Every test runs against the dummy backend, which keeps a device-visible
//! copy of each memory block that only changes on flush.

#![allow(dead_code)]

use ash::vk;

use glvk_graphics::{
    DeviceBackend, DummyBackend, GraphicsDevice, ResourceId, SourceBuffer,
    backend::DeviceLimits,
};

/// Initialize logging once per test binary.
pub fn init_logging() {
    let _ = env_logger::builder()
        .is_test(true)
        .filter_level(log::LevelFilter::Trace)
        .try_init();
}

/// Test context owning a device over the dummy backend.
pub struct TestContext {
    pub device: GraphicsDevice<DummyBackend>,
}

impl TestContext {
    /// Context with the default 64-byte atom and non-coherent host memory.
    pub fn new() -> Self {
        init_logging();
        Self {
            device: GraphicsDevice::new(DummyBackend::new()),
        }
    }

    /// Context with a custom non-coherent atom size.
    pub fn with_atom_size(non_coherent_atom_size: u64) -> Self {
        init_logging();
        Self {
            device: GraphicsDevice::new(DummyBackend::new().with_limits(DeviceLimits {
                non_coherent_atom_size,
            })),
        }
    }

    /// Context whose host-visible memory is coherent.
    pub fn coherent() -> Self {
        init_logging();
        Self {
            device: GraphicsDevice::new(DummyBackend::new().with_coherent_host_memory(true)),
        }
    }

    pub fn backend(&self) -> &DummyBackend {
        self.device.backend()
    }

    /// Submit the current batch and immediately report it complete.
    pub fn submit_and_complete(&mut self) -> usize {
        let serial = self.device.submit();
        self.device.handle_completed_serial(serial)
    }

    /// Read back `len` device-visible bytes of `buffer` starting at `offset`.
    pub fn read_device_bytes(&self, buffer: vk::Buffer, offset: u64, len: u64) -> Vec<u8> {
        self.backend()
            .device_visible_bytes(buffer, offset, len)
            .expect("buffer is not bound to live memory")
    }

    /// Read back `count` device-visible u32 values.
    pub fn read_device_u32(&self, buffer: vk::Buffer, offset: u64, count: usize) -> Vec<u32> {
        let bytes = self.read_device_bytes(buffer, offset, (count * 4) as u64);
        bytes
            .chunks_exact(4)
            .map(|chunk| u32::from_ne_bytes(chunk.try_into().unwrap()))
            .collect()
    }

    /// Read back `count` device-visible u16 values.
    pub fn read_device_u16(&self, buffer: vk::Buffer, offset: u64, count: usize) -> Vec<u16> {
        let bytes = self.read_device_bytes(buffer, offset, (count * 2) as u64);
        bytes
            .chunks_exact(2)
            .map(|chunk| u16::from_ne_bytes(chunk.try_into().unwrap()))
            .collect()
    }
}

/// A GPU index buffer owned by the test, recording who reads it.
pub struct TestIndexBuffer {
    handle: vk::Buffer,
    pub readers: Vec<ResourceId>,
}

impl TestIndexBuffer {
    pub fn new(ctx: &TestContext, size: u64) -> Self {
        let info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(vk::BufferUsageFlags::INDEX_BUFFER | vk::BufferUsageFlags::TRANSFER_SRC)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let handle = ctx
            .backend()
            .create_buffer(&info)
            .expect("failed to create test index buffer");
        Self {
            handle,
            readers: Vec::new(),
        }
    }

    pub fn destroy(self, ctx: &TestContext) {
        ctx.backend().destroy_buffer(self.handle);
    }
}

impl SourceBuffer for TestIndexBuffer {
    fn handle(&self) -> vk::Buffer {
        self.handle
    }

    fn add_read_dependency(&mut self, reader: ResourceId) {
        self.readers.push(reader);
    }
}

/// Descriptor layout handle for tests; the dummy backend never dereferences it.
pub fn test_layout() -> vk::DescriptorSetLayout {
    use ash::vk::Handle;
    vk::DescriptorSetLayout::from_raw(0xD5)
}
