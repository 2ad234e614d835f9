//! The root `Context`: owns everything, exposes the public recording API
//! (spec §3 "Context", §4.1, §4.8).
//!
//! Flattens the thirteen-level device-wrapper inheritance the original had
//! (spec §9) into one struct composing instance/device/allocator plus the
//! per-kind pools and caches, the way the teacher's `VulkanRenderer`
//! (`examples/ennis-autograph-ng/src/renderer/backend/vk/mod.rs`) already
//! groups `entry`/`instance`/`device`/`queues`/`default_pool` on one type —
//! generalized here from that struct's handful of fields to the full set
//! spec §3 names.

use ash::vk;

use crate::config::{ContextConfig, FRAMES_IN_FLIGHT};
use crate::device::Device;
use crate::error::{Error, Result};
use crate::frame::{FrameScheduler, RenderPassData, SwapchainHandle};
use crate::handle::Pool;
use crate::instance::Instance;
use crate::memory::{self, Allocation};
use crate::pipeline::{self, Pipeline, PipelineCaches, PipelineHandle};
use crate::resources::{Buffer, BufferHandle, Image, ImageHandle, Pools, RenderTarget, RenderTargetHandle, Shader, ShaderHandle};
use crate::staging::StagingRing;
use crate::swapchain::Swapchain;
use crate::transfer::CopyCommand;
use crate::types::{BufferType, Format, MemoryUsage, PipelineStateDesc, RenderPassLayout, ShaderSource};
use crate::window::WindowDescriptor;

enum PendingDestroy {
    Buffer(BufferHandle),
    Image(ImageHandle),
    RenderTarget(RenderTargetHandle),
    Swapchain(SwapchainHandle),
    Pipeline(PipelineHandle),
}

struct DestroyEntry {
    item: PendingDestroy,
    /// Counts down once per `advance_frame`; reaches zero once every
    /// frame-in-flight slot has rotated past the call that requested the
    /// destroy, at which point the resource's last possible GPU reader has
    /// signalled its fence (spec §4.8's deferred-destroy contract).
    frames_remaining: u32,
}

pub struct Context {
    instance: Instance,
    device: Device,
    // Boxed so the debug messenger's `user_data` pointer (taken in
    // `Instance::new`, before this field has its final home) stays valid for
    // the box's lifetime regardless of how `Context` itself gets moved
    // around by its caller.
    config: Box<ContextConfig>,

    staging_allocation: Allocation,
    staging_buffer: vk::Buffer,
    staging: StagingRing,

    pools: Pools,
    pipeline_caches: PipelineCaches,
    pipelines: Pool<Pipeline>,
    swapchains: Pool<Swapchain>,

    scheduler: FrameScheduler,
    pending_destroys: Vec<DestroyEntry>,

    /// `create_X` calls add one, `destroy_X` calls subtract one; checked
    /// against zero at teardown (spec §4.1's "exactly one destroy_X before
    /// context destruction" contract). Counts calls, not live GPU objects,
    /// so it catches a missing `destroy_X` even though `drop` itself still
    /// force-cleans up anything left in the pools.
    live_handles: i64,
}

impl Context {
    pub fn new(config: ContextConfig) -> Result<Context> {
        // Box first: `Instance::new` hands the Vulkan driver a raw pointer to
        // `config` for the debug messenger's `user_data`, which must outlive
        // every subsequent validation callback for the life of the instance.
        // A heap allocation's address is stable across the moves a plain
        // stack value would suffer as `config` is threaded into the returned
        // `Context` below.
        let config = Box::new(config);
        let instance = Instance::new(&config)?;
        let physical_device = instance.select_physical_device()?;
        let device = Device::new(&instance, physical_device)?;

        let staging_buffer_info = vk::BufferCreateInfo::builder()
            .size(config.staging_buffer_size)
            .usage(vk::BufferUsageFlags::TRANSFER_SRC)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let staging_buffer = unsafe {
            device
                .handle
                .create_buffer(&staging_buffer_info, None)
                .map_err(|e| Error::from_vk("create_buffer", e))?
        };
        let requirements = unsafe { device.handle.get_buffer_memory_requirements(staging_buffer) };
        let staging_allocation = memory::allocate(&device.handle, &device.memory_properties, requirements, MemoryUsage::CpuOnly)?;
        unsafe {
            device
                .handle
                .bind_buffer_memory(staging_buffer, staging_allocation.memory, 0)
                .map_err(|e| Error::from_vk("bind_buffer_memory", e))?;
        }
        let mapped_ptr = staging_allocation
            .mapped_ptr
            .expect("staging buffer is always host-visible");
        let staging = StagingRing::new(config.staging_buffer_size as u32, mapped_ptr);

        let scheduler = FrameScheduler::new(&device.handle, device.graphics_queue_family, FRAMES_IN_FLIGHT)?;

        config.emit_log("context created");

        Ok(Context {
            instance,
            device,
            config,
            staging_allocation,
            staging_buffer,
            staging,
            pools: Pools::new(),
            pipeline_caches: PipelineCaches::new(),
            pipelines: Pool::new(),
            swapchains: Pool::new(),
            scheduler,
            pending_destroys: Vec::new(),
            live_handles: 0,
        })
    }

    pub fn create_swapchain(
        &mut self,
        window: &WindowDescriptor,
        present_mode: crate::types::PresentMode,
        format: Format,
    ) -> Result<SwapchainHandle> {
        let swapchain = Swapchain::new(
            &self.instance.entry,
            &self.instance.handle,
            self.device.physical_device,
            &self.device.handle,
            window,
            present_mode,
            format,
            FRAMES_IN_FLIGHT as u32,
        )?;
        let handle = self.swapchains.insert(swapchain);
        self.live_handles += 1;
        Ok(handle)
    }

    pub fn create_buffer(&mut self, size: vk::DeviceSize, ty: BufferType, memory_usage: MemoryUsage) -> Result<BufferHandle> {
        let usage = match ty {
            BufferType::VertexIndexBuffer => {
                vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::INDEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST
            }
            BufferType::UniformBufferObject => vk::BufferUsageFlags::UNIFORM_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
            BufferType::StorageBufferObject => vk::BufferUsageFlags::STORAGE_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
        };
        let create_info = vk::BufferCreateInfo::builder().size(size).usage(usage).sharing_mode(vk::SharingMode::EXCLUSIVE);
        let vk_buffer = unsafe {
            self.device
                .handle
                .create_buffer(&create_info, None)
                .map_err(|e| Error::from_vk("create_buffer", e))?
        };
        let requirements = unsafe { self.device.handle.get_buffer_memory_requirements(vk_buffer) };
        let allocation = memory::allocate(&self.device.handle, &self.device.memory_properties, requirements, memory_usage)?;
        unsafe {
            self.device
                .handle
                .bind_buffer_memory(vk_buffer, allocation.memory, 0)
                .map_err(|e| Error::from_vk("bind_buffer_memory", e))?;
        }

        let handle = self.pools.buffers.insert(Buffer {
            vk_buffer,
            allocation,
            ty,
            memory_usage,
            size,
            queue_family: self.device.graphics_queue_family,
        });
        self.name_object(vk_buffer, "buffer", handle);
        self.live_handles += 1;
        Ok(handle)
    }

    pub fn create_image(&mut self, format: Format, width: u32, height: u32, mip_levels: u32) -> Result<ImageHandle> {
        let usage = if format.is_depth() {
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT
        } else {
            vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::COLOR_ATTACHMENT
        };
        let create_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format.into())
            .extent(vk::Extent3D { width, height, depth: 1 })
            .mip_levels(mip_levels)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);
        let vk_image = unsafe {
            self.device
                .handle
                .create_image(&create_info, None)
                .map_err(|e| Error::from_vk("create_image", e))?
        };
        let requirements = unsafe { self.device.handle.get_image_memory_requirements(vk_image) };
        let allocation = memory::allocate(&self.device.handle, &self.device.memory_properties, requirements, MemoryUsage::GpuOnly)?;
        unsafe {
            self.device
                .handle
                .bind_image_memory(vk_image, allocation.memory, 0)
                .map_err(|e| Error::from_vk("bind_image_memory", e))?;
        }

        let aspect = if format.is_depth() {
            if format.has_stencil() {
                vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
            } else {
                vk::ImageAspectFlags::DEPTH
            }
        } else {
            vk::ImageAspectFlags::COLOR
        };
        let view_info = vk::ImageViewCreateInfo::builder()
            .image(vk_image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format.into())
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: aspect,
                base_mip_level: 0,
                level_count: mip_levels,
                base_array_layer: 0,
                layer_count: 1,
            });
        let default_view = unsafe {
            self.device
                .handle
                .create_image_view(&view_info, None)
                .map_err(|e| Error::from_vk("create_image_view", e))?
        };

        let handle = self.pools.images.insert(Image {
            vk_image,
            allocation,
            format,
            width,
            height,
            mip_levels,
            default_view,
            sampler: None,
            queue_family: self.device.graphics_queue_family,
        });
        self.name_object(vk_image, "image", handle);
        self.live_handles += 1;
        Ok(handle)
    }

    /// Enrolls an image's default view as a framebuffer-attachable render
    /// target (spec §3 "RenderTarget").
    pub fn create_render_target(&mut self, image: ImageHandle, layout: RenderPassLayout) -> Result<RenderTargetHandle> {
        let img = self
            .pools
            .images
            .get(image)
            .ok_or_else(|| Error::Internal { context: "create_render_target: stale image handle".into() })?;
        let handle = self.pools.render_targets.insert(RenderTarget {
            view: img.default_view,
            format: img.format,
            extent: vk::Extent2D { width: img.width, height: img.height },
            layout,
            owning_image: Some(image),
        });
        self.live_handles += 1;
        Ok(handle)
    }

    /// Enrolls an owned copy of `source` (spec §4.8 `create_shader`); the
    /// returned handle can back any number of `create_pipeline` calls.
    pub fn create_shader(&mut self, source: ShaderSource) -> ShaderHandle {
        let handle = self.pools.shaders.insert(Shader::from_source(&source));
        self.live_handles += 1;
        handle
    }

    pub fn create_pipeline(
        &mut self,
        shader: ShaderHandle,
        attachments: &[crate::types::AttachmentDescription],
        state: &PipelineStateDesc,
    ) -> Result<PipelineHandle> {
        let shader = self
            .pools
            .shaders
            .get(shader)
            .ok_or_else(|| Error::Internal { context: "create_pipeline: stale shader handle".into() })?;
        let pipeline = pipeline::create(&self.device.handle, &mut self.pipeline_caches, shader, attachments, state)?;
        let handle = self.pipelines.insert(pipeline);
        self.live_handles += 1;
        Ok(handle)
    }

    pub fn destroy_shader(&mut self, handle: ShaderHandle) {
        if self.pools.shaders.take(handle).is_some() {
            self.live_handles -= 1;
        }
    }

    /// Only valid for host-visible allocations (spec §4.8).
    pub fn begin_map_buffer(&self, buffer: BufferHandle) -> Result<*mut u8> {
        let buf = self.pools.buffers.get(buffer).ok_or_else(|| Error::Internal { context: "begin_map_buffer: stale handle".into() })?;
        buf.allocation
            .mapped_ptr
            .ok_or_else(|| Error::Internal { context: "begin_map_buffer: buffer is not host-visible".into() })
    }

    pub fn end_map_buffer(&self, _buffer: BufferHandle) {
        // Host-coherent memory is used throughout (spec §4.1's allocator
        // only requests `HOST_COHERENT` host-visible types), so there is no
        // explicit flush to perform here.
    }

    pub fn submit_copy(&mut self, command: CopyCommand) {
        self.scheduler.pending_copies.push_back(command);
    }

    pub fn submit_pass(&mut self, pass: RenderPassData) {
        self.scheduler.pending_passes.push(pass);
    }

    pub fn advance_frame(&mut self) -> Result<()> {
        self.scheduler.advance(
            &self.device.handle,
            self.device.graphics_queue,
            self.staging_buffer,
            &mut self.staging,
            &self.pools,
            &self.pipelines,
            &mut self.pipeline_caches,
            &mut self.swapchains,
            self.device.physical_device,
            FRAMES_IN_FLIGHT as u32,
        )?;
        self.drain_pending_destroys();
        Ok(())
    }

    pub fn wait_device_idle(&self) -> Result<()> {
        unsafe {
            self.device
                .handle
                .device_wait_idle()
                .map_err(|e| Error::from_vk("device_wait_idle", e))
        }
    }

    pub fn create_fence(&mut self, signaled: bool) -> Result<crate::resources::FenceHandle> {
        let mut flags = vk::FenceCreateFlags::empty();
        if signaled {
            flags |= vk::FenceCreateFlags::SIGNALED;
        }
        let fence = unsafe {
            self.device
                .handle
                .create_fence(&vk::FenceCreateInfo::builder().flags(flags), None)
                .map_err(|e| Error::from_vk("create_fence", e))?
        };
        let handle = self.pools.fences.insert(fence);
        self.live_handles += 1;
        Ok(handle)
    }

    pub fn destroy_fence(&mut self, handle: crate::resources::FenceHandle) {
        if let Some(fence) = self.pools.fences.take(handle) {
            unsafe { self.device.handle.destroy_fence(fence, None) };
            self.live_handles -= 1;
        }
    }

    pub fn create_semaphore(&mut self) -> Result<crate::resources::SemaphoreHandle> {
        let semaphore = unsafe {
            self.device
                .handle
                .create_semaphore(&vk::SemaphoreCreateInfo::default(), None)
                .map_err(|e| Error::from_vk("create_semaphore", e))?
        };
        let handle = self.pools.semaphores.insert(semaphore);
        self.live_handles += 1;
        Ok(handle)
    }

    pub fn destroy_semaphore(&mut self, handle: crate::resources::SemaphoreHandle) {
        if let Some(semaphore) = self.pools.semaphores.take(handle) {
            unsafe { self.device.handle.destroy_semaphore(semaphore, None) };
            self.live_handles -= 1;
        }
    }

    pub fn destroy_buffer(&mut self, handle: BufferHandle) {
        self.pending_destroys.push(DestroyEntry { item: PendingDestroy::Buffer(handle), frames_remaining: FRAMES_IN_FLIGHT as u32 });
        self.live_handles -= 1;
    }

    pub fn destroy_image(&mut self, handle: ImageHandle) {
        self.pending_destroys.push(DestroyEntry { item: PendingDestroy::Image(handle), frames_remaining: FRAMES_IN_FLIGHT as u32 });
        self.live_handles -= 1;
    }

    pub fn destroy_render_target(&mut self, handle: RenderTargetHandle) {
        self.pending_destroys
            .push(DestroyEntry { item: PendingDestroy::RenderTarget(handle), frames_remaining: FRAMES_IN_FLIGHT as u32 });
        self.live_handles -= 1;
    }

    pub fn destroy_swapchain(&mut self, handle: SwapchainHandle) {
        self.pending_destroys.push(DestroyEntry { item: PendingDestroy::Swapchain(handle), frames_remaining: FRAMES_IN_FLIGHT as u32 });
        self.live_handles -= 1;
    }

    pub fn destroy_pipeline(&mut self, handle: PipelineHandle) {
        self.pending_destroys.push(DestroyEntry { item: PendingDestroy::Pipeline(handle), frames_remaining: FRAMES_IN_FLIGHT as u32 });
        self.live_handles -= 1;
    }

    fn drain_pending_destroys(&mut self) {
        let mut ready = Vec::new();
        self.pending_destroys.retain_mut(|entry| {
            entry.frames_remaining = entry.frames_remaining.saturating_sub(1);
            if entry.frames_remaining == 0 {
                ready.push(std::mem::replace(&mut entry.item, PendingDestroy::Buffer(BufferHandle::NULL)));
                false
            } else {
                true
            }
        });

        for item in ready {
            match item {
                PendingDestroy::Buffer(handle) => {
                    if let Some(buffer) = self.pools.buffers.take(handle) {
                        unsafe { self.device.handle.destroy_buffer(buffer.vk_buffer, None) };
                        buffer.allocation.free(&self.device.handle);
                    }
                }
                PendingDestroy::Image(handle) => {
                    if let Some(image) = self.pools.images.take(handle) {
                        unsafe {
                            if let Some(sampler) = image.sampler {
                                self.device.handle.destroy_sampler(sampler, None);
                            }
                            self.device.handle.destroy_image_view(image.default_view, None);
                            self.device.handle.destroy_image(image.vk_image, None);
                        }
                        image.allocation.free(&self.device.handle);
                    }
                }
                PendingDestroy::RenderTarget(handle) => {
                    if let Some(rt) = self.pools.render_targets.take(handle) {
                        if rt.owning_image.is_some() {
                            unsafe { self.device.handle.destroy_image_view(rt.view, None) };
                        }
                    }
                }
                PendingDestroy::Swapchain(handle) => {
                    if let Some(mut swapchain) = self.swapchains.take(handle) {
                        swapchain.destroy(&self.device.handle);
                    }
                }
                PendingDestroy::Pipeline(handle) => {
                    if let Some(pipeline) = self.pipelines.take(handle) {
                        unsafe { self.device.handle.destroy_pipeline(pipeline.vk_pipeline, None) };
                    }
                }
            }
        }
    }

    fn name_object<H: vk::Handle>(&self, object: H, kind: &str, handle: impl std::fmt::Debug) {
        if let Some(debug_utils) = &self.instance.debug_utils {
            let name = std::ffi::CString::new(format!("{kind}#{handle:?}")).unwrap();
            let name_info = vk::DebugUtilsObjectNameInfoEXT::builder()
                .object_type(H::TYPE)
                .object_handle(object.as_raw())
                .object_name(&name);
            unsafe {
                let _ = debug_utils.set_debug_utils_object_name(self.device.handle.handle(), &name_info);
            }
        }
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        debug_assert_eq!(
            self.live_handles, 0,
            "{} create_X call(s) were never matched by a destroy_X before context teardown",
            self.live_handles
        );

        unsafe {
            let _ = self.device.handle.queue_wait_idle(self.device.graphics_queue);
            let _ = self.device.handle.device_wait_idle();
        }
        if let Err(e) = self.scheduler.wait_all_fences(&self.device.handle) {
            log::warn!("error waiting for in-flight fences during teardown: {e}");
        }

        self.scheduler.destroy(&self.device.handle);
        self.pipeline_caches.destroy_all(&self.device.handle);

        for pipeline in self.pipelines.drain() {
            unsafe { self.device.handle.destroy_pipeline(pipeline.vk_pipeline, None) };
        }
        self.pipelines.assert_empty("pipeline");

        for mut swapchain in self.swapchains.drain() {
            swapchain.destroy(&self.device.handle);
        }
        self.swapchains.assert_empty("swapchain");

        unsafe {
            self.device.handle.destroy_buffer(self.staging_buffer, None);
        }
        self.staging_allocation.free(&self.device.handle);

        self.pools.destroy_all(&self.device.handle);

        self.device.destroy();
        // `self.instance` is dropped after this function returns, destroying
        // the debug messenger and the instance itself.
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_destroy_waits_for_frames_in_flight_rotations() {
        let mut entry = DestroyEntry {
            item: PendingDestroy::Buffer(BufferHandle::NULL),
            frames_remaining: FRAMES_IN_FLIGHT as u32,
        };
        for _ in 0..FRAMES_IN_FLIGHT - 1 {
            entry.frames_remaining = entry.frames_remaining.saturating_sub(1);
            assert!(entry.frames_remaining > 0);
        }
        entry.frames_remaining = entry.frames_remaining.saturating_sub(1);
        assert_eq!(entry.frames_remaining, 0);
    }
}
