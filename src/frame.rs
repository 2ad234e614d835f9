//! The frame scheduler: the core per-frame state machine (spec §4.7).
//!
//! `PerFrameState` groups fences/command pools/semaphores per frame-in-flight
//! slot, the way the teacher's `VulkanRenderer`
//! (`examples/ennis-autograph-ng/src/renderer/backend/vk/mod.rs`) keeps
//! per-frame GPU state on one struct rather than scattering it. The
//! petgraph-based frame-graph scheduler experiment in the teacher's
//! `src/frame/sched.rs` is deliberately not reused: spec §4.7 wants a plain
//! linear state machine, not a minimal-linear-ordering solver, so the
//! sequencing here is hand-written per the states spec names.

use std::collections::VecDeque;

use ash::vk;
use fxhash::FxHashMap;

use crate::cache::descriptor_set::FrameLayoutCache;
pub use crate::cache::descriptor_set::{DescriptorSetWriteKey, DescriptorWrite};
use crate::error::{Error, Result};
use crate::pipeline::{FramebufferKey, Pipeline, PipelineCaches, PipelineHandle};
use crate::resources::{BufferHandle, Pools, RenderTargetHandle};
use crate::staging::StagingRing;
use crate::swapchain::Swapchain;
use crate::transfer::{PendingCopyQueue, TransferPlanner};
use crate::types::{ClearValue, Viewport};

pub type SwapchainHandle = crate::handle::Handle<Swapchain>;

pub struct DrawCommand {
    pub pipeline: PipelineHandle,
    /// `(set index, write-key)` pairs for every populated `(set, binding)`
    /// slot this draw uses (spec §4.7 step 4).
    pub set_writes: Vec<(u32, DescriptorSetWriteKey)>,
    pub vertex_buffer: BufferHandle,
    pub first_vertex: u32,
    pub vertex_count: u32,
}

pub struct RenderPassData {
    pub target: SwapchainHandle,
    pub attachments: Vec<RenderTargetHandle>,
    /// Must have exactly one entry per attachment with a `Clear` load op
    /// (spec §9 open question: strict equal counts, not implicit pairing).
    pub clear_values: Vec<ClearValue>,
    pub viewport: Viewport,
    pub draws: Vec<DrawCommand>,
}

struct PerFrameState {
    fence: vk::Fence,
    command_pool: vk::CommandPool,
    transfer_command_buffer: vk::CommandBuffer,
    graphics_command_buffer: vk::CommandBuffer,
    work_finished_semaphore: vk::Semaphore,
    descriptor_caches: FxHashMap<vk::PipelineLayout, FrameLayoutCache>,
    staging_watermark: u32,
}

impl PerFrameState {
    fn new(device: &ash::Device, graphics_queue_family: u32) -> Result<PerFrameState> {
        let fence_info = vk::FenceCreateInfo::builder().flags(vk::FenceCreateFlags::SIGNALED);
        let fence = unsafe {
            device
                .create_fence(&fence_info, None)
                .map_err(|e| Error::from_vk("create_fence", e))?
        };

        let pool_info = vk::CommandPoolCreateInfo::builder()
            .queue_family_index(graphics_queue_family)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
        let command_pool = unsafe {
            device
                .create_command_pool(&pool_info, None)
                .map_err(|e| Error::from_vk("create_command_pool", e))?
        };

        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(2);
        let buffers = unsafe {
            device
                .allocate_command_buffers(&alloc_info)
                .map_err(|e| Error::from_vk("allocate_command_buffers", e))?
        };

        let semaphore = unsafe {
            device
                .create_semaphore(&vk::SemaphoreCreateInfo::default(), None)
                .map_err(|e| Error::from_vk("create_semaphore", e))?
        };

        Ok(PerFrameState {
            fence,
            command_pool,
            transfer_command_buffer: buffers[0],
            graphics_command_buffer: buffers[1],
            work_finished_semaphore: semaphore,
            descriptor_caches: FxHashMap::default(),
            staging_watermark: 0,
        })
    }

    fn destroy(&mut self, device: &ash::Device) {
        for cache in self.descriptor_caches.values() {
            cache.destroy(device);
        }
        self.descriptor_caches.clear();
        unsafe {
            device.destroy_semaphore(self.work_finished_semaphore, None);
            device.destroy_command_pool(self.command_pool, None);
            device.destroy_fence(self.fence, None);
        }
    }
}

/// Orchestrates the `Idle -> WaitingFence -> DrainingCopies ->
/// AcquiringImages -> RecordingPasses -> Submitting -> Presenting -> Idle`
/// cycle (spec §4.7). Each `advance` call runs one full cycle synchronously
/// — there is no coroutine/async state to resume (spec §9: "the model is
/// pull-based per `advance_frame`").
pub(crate) struct FrameScheduler {
    frames: Vec<PerFrameState>,
    frame_index: usize,
    graphics_queue_family: u32,
    pub(crate) pending_copies: PendingCopyQueue,
    pub(crate) pending_passes: Vec<RenderPassData>,
}

impl FrameScheduler {
    pub(crate) fn new(device: &ash::Device, graphics_queue_family: u32, frames_in_flight: usize) -> Result<FrameScheduler> {
        let mut frames = Vec::with_capacity(frames_in_flight);
        for _ in 0..frames_in_flight {
            frames.push(PerFrameState::new(device, graphics_queue_family)?);
        }
        Ok(FrameScheduler {
            frames,
            frame_index: 0,
            graphics_queue_family,
            pending_copies: VecDeque::new(),
            pending_passes: Vec::new(),
        })
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn advance(
        &mut self,
        device: &ash::Device,
        graphics_queue: vk::Queue,
        staging_buffer: vk::Buffer,
        staging: &mut StagingRing,
        pools: &Pools,
        pipelines: &crate::handle::Pool<Pipeline>,
        pipeline_caches: &mut PipelineCaches,
        swapchains: &mut crate::handle::Pool<Swapchain>,
        physical_device: vk::PhysicalDevice,
        max_frames_in_flight: u32,
    ) -> Result<()> {
        let frame_index = self.frame_index;

        // WaitingFence
        let fence = self.frames[frame_index].fence;
        unsafe {
            device
                .wait_for_fences(&[fence], true, crate::config::MAX_FENCE_TIMEOUT)
                .map_err(|e| match e {
                    vk::Result::TIMEOUT => Error::DeviceLost,
                    other => Error::from_vk("wait_for_fences", other),
                })?;
        }

        // DrainingCopies
        let watermark = self.frames[frame_index].staging_watermark;
        staging.release_until(watermark);

        unsafe {
            device
                .reset_command_pool(self.frames[frame_index].command_pool, vk::CommandPoolResetFlags::empty())
                .map_err(|e| Error::from_vk("reset_command_pool", e))?;
        }
        for cache in self.frames[frame_index].descriptor_caches.values_mut() {
            cache.reset(device)?;
        }

        let transfer_cb = self.frames[frame_index].transfer_command_buffer;
        unsafe {
            device
                .begin_command_buffer(transfer_cb, &vk::CommandBufferBeginInfo::default())
                .map_err(|e| Error::from_vk("begin_command_buffer", e))?;
        }
        let did_transfer = TransferPlanner::drain(
            device,
            transfer_cb,
            staging_buffer,
            staging,
            &mut self.pending_copies,
            pools,
            self.graphics_queue_family,
        );
        unsafe {
            device
                .end_command_buffer(transfer_cb)
                .map_err(|e| Error::from_vk("end_command_buffer", e))?;
        }
        self.frames[frame_index].staging_watermark = staging.watermark();

        // AcquiringImages
        let mut wait_semaphores = Vec::new();
        for (_, swapchain) in swapchains.iter_mut() {
            let index = swapchain.acquire(physical_device, device, frame_index, max_frames_in_flight)?;
            let _ = index;
            wait_semaphores.push(swapchain.image_available_semaphores[frame_index % swapchain.image_available_semaphores.len()]);
        }

        // RecordingPasses
        let graphics_cb = self.frames[frame_index].graphics_command_buffer;
        unsafe {
            device
                .begin_command_buffer(graphics_cb, &vk::CommandBufferBeginInfo::default())
                .map_err(|e| Error::from_vk("begin_command_buffer", e))?;
        }

        for pass in &self.pending_passes {
            record_pass(
                device,
                graphics_cb,
                pass,
                pools,
                pipelines,
                pipeline_caches,
                &mut self.frames[frame_index].descriptor_caches,
            )?;
        }

        unsafe {
            device
                .end_command_buffer(graphics_cb)
                .map_err(|e| Error::from_vk("end_command_buffer", e))?;
        }

        // Submitting
        let has_work = did_transfer || !self.pending_passes.is_empty();
        if has_work {
            unsafe {
                device
                    .reset_fences(&[fence])
                    .map_err(|e| Error::from_vk("reset_fences", e))?;
            }
            let command_buffers = [transfer_cb, graphics_cb];
            let wait_stages: Vec<vk::PipelineStageFlags> = wait_semaphores
                .iter()
                .map(|_| vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
                .collect();
            let signal = [self.frames[frame_index].work_finished_semaphore];
            let submit_info = vk::SubmitInfo::builder()
                .command_buffers(&command_buffers)
                .wait_semaphores(&wait_semaphores)
                .wait_dst_stage_mask(&wait_stages)
                .signal_semaphores(&signal);
            unsafe {
                device
                    .queue_submit(graphics_queue, &[submit_info.build()], fence)
                    .map_err(|e| Error::from_vk("queue_submit", e))?;
            }
        }

        // Presenting
        if !wait_semaphores.is_empty() {
            let work_finished = self.frames[frame_index].work_finished_semaphore;
            for (_, swapchain) in swapchains.iter_mut() {
                let needs_recreate = swapchain.present(graphics_queue, work_finished)?;
                if needs_recreate {
                    log::debug!("swapchain reported suboptimal/out-of-date at present; will recreate on next acquire");
                }
            }
        }

        // Idle
        self.pending_passes.clear();
        self.frame_index = (self.frame_index + 1) % self.frames.len();
        Ok(())
    }

    pub(crate) fn wait_all_fences(&self, device: &ash::Device) -> Result<()> {
        let fences: Vec<vk::Fence> = self.frames.iter().map(|f| f.fence).collect();
        unsafe {
            device
                .wait_for_fences(&fences, true, crate::config::MAX_FENCE_TIMEOUT)
                .map_err(|e| Error::from_vk("wait_for_fences", e))?;
        }
        Ok(())
    }

    pub(crate) fn destroy(&mut self, device: &ash::Device) {
        for frame in &mut self.frames {
            frame.destroy(device);
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn record_pass(
    device: &ash::Device,
    command_buffer: vk::CommandBuffer,
    pass: &RenderPassData,
    pools: &Pools,
    pipelines: &crate::handle::Pool<Pipeline>,
    pipeline_caches: &mut PipelineCaches,
    descriptor_caches: &mut FxHashMap<vk::PipelineLayout, FrameLayoutCache>,
) -> Result<()> {
    let first_pipeline = pass
        .draws
        .first()
        .and_then(|d| pipelines.get(d.pipeline))
        .ok_or_else(|| Error::Internal {
            context: "render pass has no draws to derive a render pass/framebuffer from".into(),
        })?;

    let views: Vec<vk::ImageView> = pass
        .attachments
        .iter()
        .filter_map(|h| pools.render_targets.get(*h))
        .map(|rt| rt.view)
        .collect();
    if views.len() != pass.attachments.len() {
        return Err(Error::Internal {
            context: "render pass references a stale render target handle".into(),
        });
    }
    if pass.clear_values.len() != pass.attachments.len() {
        return Err(Error::Internal {
            context: "clear value count does not match attachment count".into(),
        });
    }

    let extent = vk::Extent2D {
        width: pass.viewport.width as u32,
        height: pass.viewport.height as u32,
    };

    let framebuffer = pipeline_caches.framebuffer_for(
        device,
        FramebufferKey {
            render_pass: first_pipeline.render_pass,
            views: views.clone(),
            width: extent.width,
            height: extent.height,
        },
    )?;

    let vk_clear_values: Vec<vk::ClearValue> = pass.clear_values.iter().map(|c| c.to_vk()).collect();
    let render_area = vk::Rect2D { offset: vk::Offset2D { x: 0, y: 0 }, extent };
    let begin_info = vk::RenderPassBeginInfo::builder()
        .render_pass(first_pipeline.render_pass)
        .framebuffer(framebuffer)
        .render_area(render_area)
        .clear_values(&vk_clear_values);

    unsafe {
        device.cmd_begin_render_pass(command_buffer, &begin_info, vk::SubpassContents::INLINE);

        let viewport = vk::Viewport {
            x: pass.viewport.x,
            y: pass.viewport.y,
            width: pass.viewport.width,
            height: pass.viewport.height,
            min_depth: pass.viewport.min_depth,
            max_depth: pass.viewport.max_depth,
        };
        device.cmd_set_viewport(command_buffer, 0, &[viewport]);
        device.cmd_set_scissor(command_buffer, 0, &[render_area]);

        for draw in &pass.draws {
            let pipeline = pipelines.get(draw.pipeline).ok_or_else(|| Error::Internal {
                context: "draw references a stale pipeline handle".into(),
            })?;
            device.cmd_bind_pipeline(command_buffer, vk::PipelineBindPoint::GRAPHICS, pipeline.vk_pipeline);

            for (set_index, write_key) in &draw.set_writes {
                let set_layout = *pipeline.set_layouts.get(*set_index as usize).ok_or_else(|| Error::Internal {
                    context: "draw references a set index outside the pipeline's layout".into(),
                })?;
                let cache = descriptor_caches
                    .entry(pipeline.layout)
                    .or_insert_with(|| FrameLayoutCache::new(device).expect("descriptor pool creation"));
                let set = cache.find_or_allocate(device, set_layout, write_key.clone())?;
                device.cmd_bind_descriptor_sets(
                    command_buffer,
                    vk::PipelineBindPoint::GRAPHICS,
                    pipeline.layout,
                    *set_index,
                    &[set],
                    &[],
                );
            }

            if let Some(vertex_buffer) = pools.buffers.get(draw.vertex_buffer) {
                device.cmd_bind_vertex_buffers(command_buffer, 0, &[vertex_buffer.vk_buffer], &[0]);
            }
            device.cmd_draw(command_buffer, draw.vertex_count, 1, draw.first_vertex, 0);
        }

        device.cmd_end_render_pass(command_buffer);
    }

    Ok(())
}
