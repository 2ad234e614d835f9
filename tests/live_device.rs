//! Integration tests that need a real Vulkan-capable GPU and a window
//! surface, so they only document and exercise the expected call sequence
//! under `#[ignore]` (spec §8: "no GPU is available to the build"). Run
//! with `cargo test -- --ignored` on a machine with a driver installed.
//!
//! The logic these would exercise at runtime (ring math, cache key
//! equality, descriptor-set write-key construction) is already covered by
//! the always-run unit tests colocated with each module.

use vkframe::{
    AttachmentDescription, AttachmentReference, BufferType, Context, ContextConfig, Format,
    MemoryUsage, PipelineStateDesc, RenderPassData, RenderPassLayout, RenderPassLoad,
    RenderPassStore, SampleBit, Viewport,
};

fn headless_config() -> ContextConfig {
    ContextConfig::default()
}

#[test]
#[ignore]
fn swapchain_lifecycle_acquire_present_recreate() {
    let _ = pretty_env_logger::try_init();
    let mut ctx = Context::new(headless_config()).expect("instance/device creation needs a real driver");

    // A `WindowDescriptor` needs a live `raw-window-handle` pair from an
    // actual windowing toolkit; this test only documents the call shape.
    // let window = WindowDescriptor::from_raw(...);
    // let swapchain = ctx.create_swapchain(&window, PresentMode::Fifo, Format::B8G8R8A8Unorm).unwrap();

    // Each `advance_frame` call acquires an image for every live swapchain,
    // records any submitted passes, and presents. Resizing the window (or
    // minimizing it on some platforms) should surface as a transparent
    // recreate inside `Swapchain::acquire`/`present`, never as a returned
    // error the caller has to special-case.
    for _ in 0..4 {
        ctx.advance_frame().expect("advance_frame should not fail with no submitted work");
    }

    ctx.wait_device_idle().unwrap();
}

#[test]
#[ignore]
fn buffer_upload_round_trip_via_staging_ring() {
    let _ = pretty_env_logger::try_init();
    let mut ctx = Context::new(headless_config()).expect("instance/device creation needs a real driver");

    let vertex_buffer = ctx
        .create_buffer(1024, BufferType::VertexIndexBuffer, MemoryUsage::GpuOnly)
        .unwrap();

    let data: Vec<f32> = vec![0.0, 1.0, 0.0, -1.0, -1.0, 0.0, 1.0, -1.0, 0.0];
    let bytes: &[u8] = unsafe {
        std::slice::from_raw_parts(data.as_ptr() as *const u8, data.len() * std::mem::size_of::<f32>())
    };
    ctx.submit_copy(vkframe::CopyCommand::VertexCopy {
        destination: vertex_buffer,
        destination_offset: 0,
        bytes: bytes.to_vec(),
    });

    // `DrainingCopies` only runs inside `advance_frame`; the upload is not
    // visible to the GPU until at least one call has drained the staging
    // ring into a transfer command buffer and submitted it.
    ctx.advance_frame().unwrap();
    ctx.wait_device_idle().unwrap();

    ctx.destroy_buffer(vertex_buffer);
    // The buffer is only actually freed after `FRAMES_IN_FLIGHT` further
    // `advance_frame` calls have rotated past this point.
    for _ in 0..2 {
        ctx.advance_frame().unwrap();
    }
}

#[test]
#[ignore]
fn render_pass_with_single_triangle_pipeline() {
    let _ = pretty_env_logger::try_init();
    let mut ctx = Context::new(headless_config()).expect("instance/device creation needs a real driver");

    let color_image = ctx.create_image(Format::B8G8R8A8Unorm, 640, 480, 1).unwrap();
    let color_target = ctx
        .create_render_target(color_image, RenderPassLayout::Present)
        .unwrap();

    let vertex_spirv: Vec<u32> = vec![];
    let fragment_spirv: Vec<u32> = vec![];
    let shader_source = vkframe::ShaderSource {
        vertex_spirv: &vertex_spirv,
        fragment_spirv: &fragment_spirv,
        vertex_stride: 12,
        vertex_attributes: &[],
        color_attachment_formats: &[Format::B8G8R8A8Unorm],
        depth_stencil_format: None,
        set_layouts: &[],
    };
    let shader = ctx.create_shader(shader_source);

    let attachments = [AttachmentDescription {
        format: Format::B8G8R8A8Unorm,
        samples: SampleBit::X1,
        load: RenderPassLoad::Clear,
        store: RenderPassStore::Store,
        stencil_load: RenderPassLoad::Load,
        stencil_store: RenderPassStore::DontCare,
        initial_layout: RenderPassLayout::Undefined,
        final_layout: RenderPassLayout::Present,
        reference: AttachmentReference::ColorAttachment,
    }];
    let pipeline = ctx
        .create_pipeline(shader, &attachments, &PipelineStateDesc::default())
        .unwrap();
    ctx.destroy_shader(shader);

    let vertex_buffer = ctx
        .create_buffer(1024, BufferType::VertexIndexBuffer, MemoryUsage::GpuOnly)
        .unwrap();

    ctx.submit_pass(RenderPassData {
        target: Default::default(),
        attachments: vec![color_target],
        clear_values: vec![vkframe::ClearValue::Color([0.0, 0.0, 0.0, 1.0])],
        viewport: Viewport { x: 0.0, y: 0.0, width: 640.0, height: 480.0, min_depth: 0.0, max_depth: 1.0 },
        draws: vec![vkframe::DrawCommand {
            pipeline,
            set_writes: Vec::new(),
            vertex_buffer,
            first_vertex: 0,
            vertex_count: 3,
        }],
    });
    ctx.advance_frame().unwrap();
    ctx.wait_device_idle().unwrap();

    ctx.destroy_pipeline(pipeline);
    for _ in 0..2 {
        ctx.advance_frame().unwrap();
    }
}
