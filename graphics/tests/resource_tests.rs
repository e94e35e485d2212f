//! Integration tests for the transient resource helpers.
//!
//! These tests drive the helpers the way a frontend does: allocate, write,
//! record commands, submit, then report serials complete. Everything runs on
//! the dummy backend, whose device-visible memory only changes on flush.
//!
//! # Test Categories
//!
//! - **Dynamic Buffer Tests**: sub-allocation, flushing and buffer retirement
//! - **Line Loop Tests**: generated index lists for every input path
//! - **Descriptor Pool Tests**: growth across pools and deferred pool release
//! - **Image Tests**: staging layouts, weak references, copies and barriers

mod common;

use ash::vk;
use rstest::rstest;

use common::{TestContext, TestIndexBuffer, test_layout};
use glvk_graphics::{
    ClientIndices, DescriptorSetCategory, DummyBackend, DynamicBuffer, DynamicBufferDescriptor,
    DynamicDescriptorPool, Extent3d, Format, FormatId, GraphicsError, ImageHelper, ImageLayout,
    LineLoopHelper, Offset3d, RecordedCommand, RecordingCommandBuffer, StagingUsage, TextureType,
};

fn vertex_ring(ctx: &TestContext, min_size: u64, alignment: u64) -> DynamicBuffer<DummyBackend> {
    let mut ring = DynamicBuffer::new(
        DynamicBufferDescriptor::new(vk::BufferUsageFlags::VERTEX_BUFFER, min_size)
            .with_label("vertex_ring"),
    );
    ring.init(alignment, &ctx.device);
    ring
}

// ============================================================================
// Dynamic Buffer Tests
// ============================================================================

/// Bytes written through an allocation reach the device only after flush.
#[test]
fn test_dynamic_buffer_flush_publishes_writes() {
    let mut ctx = TestContext::new();
    let mut ring = vertex_ring(&ctx, 4096, 4);

    let pattern: Vec<u8> = (0..200u32).map(|i| (i * 7 % 251) as u8).collect();
    let mut allocation = ring.allocate(&ctx.device, pattern.len() as u64).unwrap();
    allocation.bytes_mut()[..pattern.len()].copy_from_slice(&pattern);
    let (buffer, offset) = (allocation.buffer, allocation.offset);
    assert!(allocation.new_buffer_allocated);

    assert_ne!(ctx.read_device_bytes(buffer, offset, 200), pattern);

    ring.flush(&ctx.device).unwrap();
    assert_eq!(ctx.read_device_bytes(buffer, offset, 200), pattern);

    ring.release(&mut ctx.device);
    ctx.submit_and_complete();
    assert_eq!(ctx.backend().live_buffer_count(), 0);
    assert_eq!(ctx.backend().live_memory_count(), 0);
}

/// Consecutive allocations are disjoint, ordered and aligned.
#[rstest]
#[case::word(4, 64)]
#[case::atom(64, 64)]
#[case::large(256, 256)]
#[case::odd(96, 192)]
#[case::vertex_triplet(12, 192)]
fn test_dynamic_buffer_offsets_are_aligned(#[case] alignment: u64, #[case] expected: u64) {
    let ctx = TestContext::new();
    let mut ring = vertex_ring(&ctx, 64 * 1024, alignment);
    let effective = ring.alignment();
    assert_eq!(effective, expected);
    assert_eq!(effective % alignment, 0);
    assert_eq!(effective % 64, 0);

    let mut previous_end = 0;
    for size in [1u64, 13, 64, 65, 300] {
        let allocation = ring.allocate(&ctx.device, size).unwrap();
        assert_eq!(allocation.offset % effective, 0);
        assert!(allocation.offset >= previous_end);
        assert!(allocation.size() >= size);
        previous_end = allocation.offset + allocation.size();
    }

    ring.destroy(&ctx.device);
}

/// Flushed ranges start and end on atom boundaries.
#[test]
fn test_dynamic_buffer_flush_ranges_are_atom_aligned() {
    let ctx = TestContext::with_atom_size(256);
    let mut ring = vertex_ring(&ctx, 8192, 4);

    for size in [10u64, 300, 7] {
        ring.allocate(&ctx.device, size).unwrap();
        ring.flush(&ctx.device).unwrap();
    }

    let ranges = ctx.backend().flushed_ranges();
    assert_eq!(ranges.len(), 3);
    for range in ranges {
        assert_eq!(range.offset % 256, 0);
        assert_eq!(range.size % 256, 0);
    }

    ring.destroy(&ctx.device);
}

/// Invalidate reports the atom-rounded range once; a second call has nothing new.
#[test]
fn test_dynamic_buffer_invalidate_on_non_coherent_memory() {
    let ctx = TestContext::new();
    let mut ring = vertex_ring(&ctx, 4096, 4);

    let allocation = ring.allocate(&ctx.device, 100).unwrap();
    assert_eq!(allocation.offset, 0);
    ring.invalidate(&ctx.device).unwrap();

    let ranges = ctx.backend().invalidated_ranges();
    assert_eq!(ranges.len(), 1);
    assert_eq!(ranges[0].offset, 0);
    assert_eq!(ranges[0].size, 128);

    ring.invalidate(&ctx.device).unwrap();
    assert_eq!(ctx.backend().invalidated_ranges().len(), 1);

    // Invalidate also moves the flush cursor.
    ring.flush(&ctx.device).unwrap();
    assert!(ctx.backend().flushed_ranges().is_empty());

    ring.allocate(&ctx.device, 10).unwrap();
    ring.invalidate(&ctx.device).unwrap();
    let ranges = ctx.backend().invalidated_ranges();
    assert_eq!(ranges.len(), 2);
    assert_eq!((ranges[1].offset, ranges[1].size), (128, 64));

    ring.destroy(&ctx.device);
}

/// The current handle follows every new backing buffer.
#[test]
fn test_dynamic_buffer_current_handle_tracks_reallocation() {
    let mut ctx = TestContext::new();
    let mut ring = vertex_ring(&ctx, 1024, 4);
    assert_eq!(ring.current_buffer_handle(), None);

    let first = ring.allocate(&ctx.device, 1000).unwrap().buffer;
    assert_eq!(ring.current_buffer_handle(), Some(first));

    let second = ring.allocate(&ctx.device, 1000).unwrap();
    assert!(second.new_buffer_allocated);
    let second = second.buffer;
    assert_ne!(second, first);
    assert_eq!(ring.current_buffer_handle(), Some(second));
    assert_eq!(ring.retained_count(), 1);

    // A forced reallocation moves the handle even when the request fits.
    ring.set_minimum_size_for_testing(4096);
    let third = ring.allocate(&ctx.device, 16).unwrap().buffer;
    assert_ne!(third, second);
    assert_eq!(ring.current_buffer_handle(), Some(third));
    assert_eq!(ring.size(), 4096);
    assert_eq!(ring.retained_count(), 2);

    ring.release(&mut ctx.device);
    assert_eq!(ring.current_buffer_handle(), None);
    ctx.submit_and_complete();
    assert_eq!(ctx.backend().live_buffer_count(), 0);
}

/// Coherent memory never needs an explicit flush.
#[test]
fn test_dynamic_buffer_skips_flush_on_coherent_memory() {
    let ctx = TestContext::coherent();
    let mut ring = vertex_ring(&ctx, 1024, 4);

    ring.allocate(&ctx.device, 128).unwrap();
    ring.flush(&ctx.device).unwrap();
    ring.invalidate(&ctx.device).unwrap();

    assert!(ctx.backend().flushed_ranges().is_empty());
    assert!(ctx.backend().invalidated_ranges().is_empty());

    ring.destroy(&ctx.device);
}

/// A full buffer is retired and kept alive until its serial completes.
#[test]
fn test_dynamic_buffer_retired_buffers_outlive_their_serial() {
    let mut ctx = TestContext::new();
    let mut ring = vertex_ring(&ctx, 1024, 4);

    let first = ring.allocate(&ctx.device, 1000).unwrap().buffer;
    let second = ring.allocate(&ctx.device, 1000).unwrap();
    assert!(second.new_buffer_allocated);
    assert_eq!(second.offset, 0);
    let second = second.buffer;
    assert_ne!(first, second);
    assert_eq!(ring.retained_count(), 1);

    ring.release_retained_buffers(&mut ctx.device);
    assert_eq!(ring.retained_count(), 0);
    assert!(ctx.backend().is_buffer_alive(first));

    let serial = ctx.device.submit();
    assert_eq!(ctx.device.handle_completed_serial(serial), 2);
    assert!(!ctx.backend().is_buffer_alive(first));
    assert!(ctx.backend().is_buffer_alive(second));

    ring.destroy(&ctx.device);
    assert_eq!(ctx.backend().stale_destroy_count(), 0);
}

/// Requests larger than the minimum size get a buffer of their own size.
#[test]
fn test_dynamic_buffer_oversized_request() {
    let ctx = TestContext::new();
    let mut ring = vertex_ring(&ctx, 256, 4);

    let allocation = ring.allocate(&ctx.device, 10_000).unwrap();
    let buffer = allocation.buffer;
    assert_eq!(ctx.backend().buffer_size(buffer), Some(10_048));
    assert_eq!(ring.size(), 10_048);

    ring.destroy(&ctx.device);
}

/// A failed allocation leaves nothing behind.
#[test]
fn test_dynamic_buffer_allocation_failure() {
    let ctx = TestContext::new();
    let mut ring = vertex_ring(&ctx, 256, 4);

    ctx.backend().set_fail_memory_allocation(true);
    let result = ring.allocate(&ctx.device, 16);
    assert!(matches!(result, Err(GraphicsError::OutOfMemory)));
    assert_eq!(ctx.backend().live_buffer_count(), 0);

    ctx.backend().set_fail_memory_allocation(false);
    assert!(ring.allocate(&ctx.device, 16).is_ok());
    ring.destroy(&ctx.device);
}

// ============================================================================
// Line Loop Tests
// ============================================================================

/// Draw-arrays loops close on the first vertex.
#[rstest]
#[case::triangle(0, 3, vec![0, 1, 2, 0])]
#[case::offset(10, 4, vec![10, 11, 12, 13, 10])]
#[case::single(7, 1, vec![7, 7])]
fn test_line_loop_draw_arrays(
    #[case] first: u32,
    #[case] count: u32,
    #[case] expected: Vec<u32>,
) {
    let mut ctx = TestContext::new();
    let mut line_loop = LineLoopHelper::new(&mut ctx.device);

    let binding = line_loop
        .get_index_buffer_for_draw_arrays(&mut ctx.device, first, count)
        .unwrap();
    assert_eq!(binding.index_type, vk::IndexType::UINT32);
    assert_eq!(
        ctx.read_device_u32(binding.buffer, binding.offset, expected.len()),
        expected
    );

    line_loop.release(&mut ctx.device);
    ctx.submit_and_complete();
    assert_eq!(ctx.backend().live_buffer_count(), 0);
}

/// 8-bit client indices are widened to 16 bits.
#[test]
fn test_line_loop_client_u8_indices_are_widened() {
    let mut ctx = TestContext::new();
    let mut line_loop = LineLoopHelper::new(&mut ctx.device);

    let binding = line_loop
        .get_index_buffer_for_client_element_array(
            &mut ctx.device,
            ClientIndices::U8(&[10, 250, 0]),
        )
        .unwrap();
    assert_eq!(binding.index_type, vk::IndexType::UINT16);
    assert_eq!(
        ctx.read_device_u16(binding.buffer, binding.offset, 4),
        vec![10, 250, 0, 10]
    );

    line_loop.destroy(&ctx.device);
}

#[test]
fn test_line_loop_client_u16_and_u32_indices() {
    let mut ctx = TestContext::new();
    let mut line_loop = LineLoopHelper::new(&mut ctx.device);

    let short = line_loop
        .get_index_buffer_for_client_element_array(
            &mut ctx.device,
            ClientIndices::U16(&[3, 65535, 9]),
        )
        .unwrap();
    let long = line_loop
        .get_index_buffer_for_client_element_array(
            &mut ctx.device,
            ClientIndices::U32(&[100_000, 5]),
        )
        .unwrap();

    assert_eq!(short.index_type, vk::IndexType::UINT16);
    assert_eq!(long.index_type, vk::IndexType::UINT32);
    assert_eq!(long.buffer, short.buffer);
    assert!(long.offset > short.offset);
    assert_eq!(
        ctx.read_device_u16(short.buffer, short.offset, 4),
        vec![3, 65535, 9, 3]
    );
    assert_eq!(
        ctx.read_device_u32(long.buffer, long.offset, 3),
        vec![100_000, 5, 100_000]
    );

    line_loop.destroy(&ctx.device);
}

/// Indices already on the GPU are copied with a second region repeating the first index.
#[rstest]
#[case::u16(vk::IndexType::UINT16, 2)]
#[case::u32(vk::IndexType::UINT32, 4)]
fn test_line_loop_element_array_buffer(#[case] index_type: vk::IndexType, #[case] unit: u64) {
    let mut ctx = TestContext::new();
    let mut line_loop = LineLoopHelper::new(&mut ctx.device);
    let mut source = TestIndexBuffer::new(&ctx, 1024);
    let mut cmd = RecordingCommandBuffer::new();

    let binding = line_loop
        .get_index_buffer_for_element_array_buffer(
            &mut ctx.device,
            &mut source,
            index_type,
            6,
            32,
            &mut cmd,
        )
        .unwrap();

    assert_eq!(binding.index_type, index_type);
    assert_eq!(source.readers, vec![line_loop.id()]);

    let [RecordedCommand::CopyBuffer { src, dst, regions }] = cmd.commands() else {
        panic!("expected a single buffer copy, got {:?}", cmd.commands());
    };
    assert_eq!(*dst, binding.buffer);
    assert_eq!(*src, glvk_graphics::SourceBuffer::handle(&source));
    assert_eq!(regions.len(), 2);
    assert_eq!(
        (regions[0].src_offset, regions[0].dst_offset, regions[0].size),
        (32, binding.offset, 6 * unit)
    );
    assert_eq!(
        (regions[1].src_offset, regions[1].dst_offset, regions[1].size),
        (32, binding.offset + 6 * unit, unit)
    );

    line_loop.destroy(&ctx.device);
    source.destroy(&ctx);
}

#[test]
fn test_line_loop_element_array_rejects_u8() {
    let mut ctx = TestContext::new();
    let mut line_loop = LineLoopHelper::new(&mut ctx.device);
    let mut source = TestIndexBuffer::new(&ctx, 64);
    let mut cmd = RecordingCommandBuffer::new();

    let result = line_loop.get_index_buffer_for_element_array_buffer(
        &mut ctx.device,
        &mut source,
        vk::IndexType::from_raw(1_000_265_000),
        3,
        0,
        &mut cmd,
    );
    assert!(matches!(result, Err(GraphicsError::InvalidParameter(_))));
    assert!(cmd.commands().is_empty());
    assert!(source.readers.is_empty());

    line_loop.destroy(&ctx.device);
    source.destroy(&ctx);
}

// ============================================================================
// Descriptor Pool Tests
// ============================================================================

/// Exhausting a category moves to a fresh pool; the old one dies with its serial.
#[test]
fn test_descriptor_pool_grows_and_retires() {
    let mut ctx = TestContext::new();
    let mut pool = DynamicDescriptorPool::new();
    pool.init(
        &ctx.device,
        &[
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
                descriptor_count: 4,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                descriptor_count: 8,
            },
        ],
    )
    .unwrap();
    let first_pool = pool.current_pool();

    let layouts = [test_layout(); 3];
    pool.allocate_sets(&mut ctx.device, &layouts, DescriptorSetCategory::Uniforms)
        .unwrap();
    assert_eq!(pool.free_descriptor_sets(DescriptorSetCategory::Uniforms), 1);

    let sets = pool
        .allocate_sets(&mut ctx.device, &layouts[..2], DescriptorSetCategory::Uniforms)
        .unwrap();
    assert_eq!(sets.len(), 2);
    assert_ne!(pool.current_pool(), first_pool);
    assert_eq!(pool.free_descriptor_sets(DescriptorSetCategory::Uniforms), 2);
    assert_eq!(pool.free_descriptor_sets(DescriptorSetCategory::Textures), 8);
    assert_eq!(ctx.backend().live_descriptor_pool_count(), 2);

    ctx.submit_and_complete();
    assert_eq!(ctx.backend().live_descriptor_pool_count(), 1);

    pool.release(&mut ctx.device);
    ctx.submit_and_complete();
    assert_eq!(ctx.backend().live_descriptor_pool_count(), 0);
}

/// Changing the set budget moves the next allocation to a pool sized for it.
#[rstest]
#[case::lowered(1)]
#[case::raised(32)]
fn test_descriptor_pool_budget_change_starts_new_pool(#[case] max_sets: u32) {
    let mut ctx = TestContext::new();
    let mut pool = DynamicDescriptorPool::new();
    pool.init(
        &ctx.device,
        &[vk::DescriptorPoolSize {
            ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            descriptor_count: 4,
        }],
    )
    .unwrap();
    let layouts = [test_layout()];
    pool.allocate_sets(&mut ctx.device, &layouts, DescriptorSetCategory::Textures)
        .unwrap();
    let first_pool = pool.current_pool();
    assert_eq!(pool.free_descriptor_sets(DescriptorSetCategory::Textures), 3);

    pool.set_max_sets_per_pool_for_testing(max_sets);
    assert_eq!(pool.max_sets_per_pool(), max_sets);
    pool.allocate_sets(&mut ctx.device, &layouts, DescriptorSetCategory::Textures)
        .unwrap();

    let current = pool.current_pool().unwrap();
    assert_ne!(Some(current), first_pool);
    assert_eq!(ctx.backend().descriptor_pool_max_sets(current), Some(max_sets));
    assert_eq!(pool.current_sets_count(), 1);
    assert_eq!(pool.free_descriptor_sets(DescriptorSetCategory::Textures), 3);

    assert_eq!(ctx.backend().live_descriptor_pool_count(), 2);
    ctx.submit_and_complete();
    assert_eq!(ctx.backend().live_descriptor_pool_count(), 1);

    pool.destroy(&ctx.device);
    assert_eq!(ctx.backend().live_descriptor_pool_count(), 0);
}

#[test]
fn test_descriptor_pool_request_larger_than_any_pool() {
    let mut ctx = TestContext::new();
    let mut pool = DynamicDescriptorPool::new();
    pool.init(
        &ctx.device,
        &[vk::DescriptorPoolSize {
            ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            descriptor_count: 2,
        }],
    )
    .unwrap();

    let layouts = [test_layout(); 3];
    let result = pool.allocate_sets(&mut ctx.device, &layouts, DescriptorSetCategory::Textures);
    assert!(matches!(
        result,
        Err(GraphicsError::DescriptorPoolExhausted {
            requested: 3,
            available: 2,
            ..
        })
    ));
    assert_eq!(ctx.device.pending_garbage_count(), 0);

    pool.destroy(&ctx.device);
}

// ============================================================================
// Image Tests
// ============================================================================

/// Staging images start preinitialized only when the host writes them.
#[rstest]
#[case::read(StagingUsage::Read, ImageLayout::Undefined)]
#[case::write(StagingUsage::Write, ImageLayout::Preinitialized)]
#[case::both(StagingUsage::Both, ImageLayout::Preinitialized)]
fn test_staging_image_layout(#[case] usage: StagingUsage, #[case] expected: ImageLayout) {
    let ctx = TestContext::new();
    let mut image = ImageHelper::new();
    image
        .init_2d_staging(
            &ctx.device,
            Format::get(FormatId::Rgba8Unorm),
            Extent3d::new_2d(16, 8),
            usage,
        )
        .unwrap();

    assert_eq!(image.current_layout(), expected);
    let info = ctx.backend().image_info(image.image()).unwrap();
    assert_eq!(info.tiling, vk::ImageTiling::LINEAR);
    assert_eq!(info.initial_layout, expected.to_vk());
    assert_eq!(image.allocated_memory_size(), 16 * 8 * 4);

    image.destroy(&ctx.device);
    assert_eq!(ctx.backend().live_image_count(), 0);
    assert_eq!(ctx.backend().live_memory_count(), 0);
}

/// Weak references are never destroyed by the helper.
#[test]
fn test_weak_reference_is_never_destroyed() {
    let mut ctx = TestContext::new();
    let mut owner = ImageHelper::new();
    owner
        .init(
            &ctx.device,
            TextureType::Texture2D,
            Extent3d::new_2d(64, 64),
            Format::get(FormatId::Bgra8Unorm),
            1,
            vk::ImageUsageFlags::COLOR_ATTACHMENT,
            1,
        )
        .unwrap();

    let mut weak = ImageHelper::new();
    weak.init_2d_weak_reference(
        owner.image(),
        Extent3d::new_2d(64, 64),
        Format::get(FormatId::Bgra8Unorm),
        1,
    );
    assert!(weak.is_weak_reference());

    let serial = ctx.device.current_queue_serial();
    weak.release(serial, &mut ctx.device);
    ctx.submit_and_complete();
    assert!(!weak.valid());
    assert!(ctx.backend().is_image_alive(owner.image()));

    weak.init_2d_weak_reference(
        owner.image(),
        Extent3d::new_2d(64, 64),
        Format::get(FormatId::Bgra8Unorm),
        1,
    );
    weak.reset_image_weak_reference();
    assert!(!weak.valid());
    assert!(ctx.backend().is_image_alive(owner.image()));

    owner.destroy(&ctx.device);
}

/// Released images survive until their serial completes.
#[test]
fn test_image_release_waits_for_serial() {
    let mut ctx = TestContext::new();
    let mut image = ImageHelper::new();
    image
        .init(
            &ctx.device,
            TextureType::Texture2D,
            Extent3d::new_2d(32, 32),
            Format::get(FormatId::Rgba8Unorm),
            1,
            vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST,
            1,
        )
        .unwrap();
    image
        .init_memory(&ctx.device, vk::MemoryPropertyFlags::DEVICE_LOCAL)
        .unwrap();
    let handle = image.image();

    let in_flight = ctx.device.submit();
    image.release(in_flight, &mut ctx.device);
    assert!(ctx.backend().is_image_alive(handle));

    let later = ctx.device.submit();
    assert!(later > in_flight);
    assert_eq!(ctx.device.handle_completed_serial(in_flight), 2);
    assert!(!ctx.backend().is_image_alive(handle));
    assert_eq!(ctx.backend().live_memory_count(), 0);
}

/// A copy moves both images to their transfer layouts before copying.
#[test]
fn test_image_copy_records_transitions_then_copy() {
    let ctx = TestContext::new();
    let format = Format::get(FormatId::Rgba8Unorm);

    let mut src = ImageHelper::new();
    src.init_2d_staging(&ctx.device, format, Extent3d::new_2d(8, 8), StagingUsage::Write)
        .unwrap();
    let mut dst = ImageHelper::new();
    dst.init(
        &ctx.device,
        TextureType::Texture2D,
        Extent3d::new_2d(8, 8),
        format,
        1,
        vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
        1,
    )
    .unwrap();

    let mut cmd = RecordingCommandBuffer::new();
    ImageHelper::copy(
        &mut src,
        &mut dst,
        Offset3d::default(),
        Offset3d::new(2, 2, 0),
        Extent3d::new_2d(4, 4),
        vk::ImageAspectFlags::COLOR,
        &mut cmd,
    );

    let barriers = cmd.image_barriers();
    assert_eq!(barriers.len(), 2);
    assert_eq!(barriers[0].old_layout, vk::ImageLayout::PREINITIALIZED);
    assert_eq!(barriers[0].new_layout, vk::ImageLayout::TRANSFER_SRC_OPTIMAL);
    assert!(barriers[0].src_access_mask.contains(vk::AccessFlags::HOST_WRITE));
    assert_eq!(barriers[1].new_layout, vk::ImageLayout::TRANSFER_DST_OPTIMAL);

    let Some(RecordedCommand::CopyImage {
        src_layout,
        dst_layout,
        regions,
        ..
    }) = cmd.commands().last()
    else {
        panic!("copy not recorded last: {:?}", cmd.commands());
    };
    assert_eq!(*src_layout, vk::ImageLayout::TRANSFER_SRC_OPTIMAL);
    assert_eq!(*dst_layout, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
    assert_eq!(regions[0].dst_offset, vk::Offset3D { x: 2, y: 2, z: 0 });

    // Already in transfer layouts: the second copy records no barriers.
    cmd.clear();
    ImageHelper::copy(
        &mut src,
        &mut dst,
        Offset3d::default(),
        Offset3d::default(),
        Extent3d::new_2d(8, 8),
        vk::ImageAspectFlags::COLOR,
        &mut cmd,
    );
    assert!(cmd.image_barriers().is_empty());
    assert_eq!(cmd.commands().len(), 1);

    src.destroy(&ctx.device);
    dst.destroy(&ctx.device);
}

/// Sampling after an upload adds the host and transfer writes to the source mask.
#[test]
fn test_transition_to_shader_read() {
    let ctx = TestContext::new();
    let mut image = ImageHelper::new();
    image
        .init(
            &ctx.device,
            TextureType::Texture2D,
            Extent3d::new_2d(4, 4),
            Format::get(FormatId::Rgba8Unorm),
            1,
            vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST,
            1,
        )
        .unwrap();

    let mut cmd = RecordingCommandBuffer::new();
    image.clear_color(
        &vk::ClearColorValue {
            float32: [0.0, 0.0, 0.0, 1.0],
        },
        0,
        1,
        &mut cmd,
    );
    image.change_layout_with_stages(
        vk::ImageAspectFlags::COLOR,
        ImageLayout::ShaderReadOnly,
        vk::PipelineStageFlags::TRANSFER,
        vk::PipelineStageFlags::FRAGMENT_SHADER,
        &mut cmd,
    );

    let barriers = cmd.image_barriers();
    let last = barriers.last().unwrap();
    assert_eq!(last.old_layout, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
    assert!(last.src_access_mask.contains(
        vk::AccessFlags::TRANSFER_WRITE | vk::AccessFlags::HOST_WRITE
    ));
    assert_eq!(last.dst_access_mask, vk::AccessFlags::SHADER_READ);
    assert_eq!(image.current_layout(), ImageLayout::ShaderReadOnly);

    image.destroy(&ctx.device);
}

/// Depth clears move to TransferDst with the caller's aspects.
#[test]
fn test_clear_depth_stencil_uses_caller_aspect() {
    let ctx = TestContext::new();
    let mut image = ImageHelper::new();
    image
        .init(
            &ctx.device,
            TextureType::Texture2D,
            Extent3d::new_2d(16, 16),
            Format::get(FormatId::Depth24UnormStencil8),
            1,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST,
            1,
        )
        .unwrap();
    let aspect = vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL;

    let mut cmd = RecordingCommandBuffer::new();
    image.clear_depth_stencil(
        aspect,
        &vk::ClearDepthStencilValue {
            depth: 1.0,
            stencil: 0,
        },
        &mut cmd,
    );

    let [
        RecordedCommand::PipelineBarrier {
            src_stage_mask,
            dst_stage_mask,
            image_barriers,
        },
        RecordedCommand::ClearDepthStencil {
            layout,
            depth,
            ranges,
            ..
        },
    ] = cmd.commands()
    else {
        panic!("expected a barrier then a clear: {:?}", cmd.commands());
    };
    assert_eq!(*src_stage_mask, vk::PipelineStageFlags::ALL_COMMANDS);
    assert_eq!(*dst_stage_mask, vk::PipelineStageFlags::TRANSFER);
    assert_eq!(image_barriers[0].old_layout, vk::ImageLayout::UNDEFINED);
    assert_eq!(image_barriers[0].new_layout, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
    assert_eq!(image_barriers[0].subresource_range.aspect_mask, aspect);
    assert_eq!(*layout, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
    assert_eq!(*depth, 1.0);
    assert_eq!(ranges.len(), 1);
    assert_eq!(ranges[0].aspect_mask, aspect);
    assert_eq!((ranges[0].level_count, ranges[0].layer_count), (1, 1));
    assert_eq!(image.current_layout(), ImageLayout::TransferDst);

    image.destroy(&ctx.device);
}

/// Views cover every layer with the requested view type and are released by serial.
#[test]
fn test_cube_map_view_covers_all_faces() {
    let mut ctx = TestContext::new();
    let mut image = ImageHelper::new();
    image
        .init(
            &ctx.device,
            TextureType::CubeMap,
            Extent3d::new_2d(32, 32),
            Format::get(FormatId::Rgba8Unorm),
            1,
            vk::ImageUsageFlags::SAMPLED,
            3,
        )
        .unwrap();
    assert_eq!(image.layer_count(), 6);

    let view = image
        .init_image_view(
            &ctx.device,
            TextureType::CubeMap,
            vk::ImageAspectFlags::COLOR,
            vk::ComponentMapping::default(),
            3,
        )
        .unwrap();
    let info = ctx.backend().image_view_info(view).unwrap();
    assert_eq!(info.image, image.image());
    assert_eq!(info.view_type, vk::ImageViewType::CUBE);
    assert_eq!(info.format, vk::Format::R8G8B8A8_UNORM);
    assert_eq!(info.subresource_range.layer_count, 6);
    assert_eq!(info.subresource_range.level_count, 3);
    assert_eq!(info.subresource_range.aspect_mask, vk::ImageAspectFlags::COLOR);

    ImageHelper::release_image_view(view, &mut ctx.device);
    assert_eq!(ctx.backend().live_image_view_count(), 1);
    ctx.submit_and_complete();
    assert_eq!(ctx.backend().live_image_view_count(), 0);

    image.destroy(&ctx.device);
    assert_eq!(ctx.backend().live_image_count(), 0);
}
