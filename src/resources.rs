//! Buffer, image, and render-target resource records, plus the object pools
//! that own every live GPU object (spec §3 "Core entities", §4.2 "Handle
//! Pools").
//!
//! One [`crate::handle::Pool`] per resource kind, matching spec §2's
//! breakdown ("buffers, images, image views, samplers, fences, semaphores,
//! command pools"). `Context::destroy` drains and destroys each pool in the
//! order spec §4.1's destructor contract names, then asserts every pool is
//! empty (global invariant 1).

use ash::vk;

use crate::memory::Allocation;
use crate::types::{BindingDescriptor, BufferType, Format, MemoryUsage, RenderPassLayout, ShaderSource, VertexAttribute};

pub struct Buffer {
    pub(crate) vk_buffer: vk::Buffer,
    pub(crate) allocation: Allocation,
    pub(crate) ty: BufferType,
    pub(crate) memory_usage: MemoryUsage,
    pub(crate) size: vk::DeviceSize,
    pub(crate) queue_family: u32,
}

pub struct Image {
    pub(crate) vk_image: vk::Image,
    pub(crate) allocation: Allocation,
    pub(crate) format: Format,
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) mip_levels: u32,
    pub(crate) default_view: vk::ImageView,
    pub(crate) sampler: Option<vk::Sampler>,
    pub(crate) queue_family: u32,
}

/// A framebuffer-attachable image subresource: either swapchain-owned
/// (`owning_image = None`, the swapchain destroys the view) or user-owned.
pub struct RenderTarget {
    pub(crate) view: vk::ImageView,
    pub(crate) format: Format,
    pub(crate) extent: vk::Extent2D,
    pub(crate) layout: RenderPassLayout,
    pub(crate) owning_image: Option<crate::handle::Handle<Image>>,
}

/// An owned copy of a [`ShaderSource`] (spec §4.8 `create_shader`):
/// bytecode and binding layout no longer borrow from the caller once
/// enrolled, so a `Shader` can outlive the call that created it and be
/// referenced by any number of `create_pipeline` calls.
pub struct Shader {
    pub(crate) vertex_spirv: Vec<u32>,
    pub(crate) fragment_spirv: Vec<u32>,
    pub(crate) vertex_stride: u32,
    pub(crate) vertex_attributes: Vec<VertexAttribute>,
    pub(crate) color_attachment_formats: Vec<Format>,
    pub(crate) depth_stencil_format: Option<Format>,
    pub(crate) set_layouts: Vec<Vec<BindingDescriptor>>,
}

impl Shader {
    pub(crate) fn from_source(source: &ShaderSource) -> Shader {
        Shader {
            vertex_spirv: source.vertex_spirv.to_vec(),
            fragment_spirv: source.fragment_spirv.to_vec(),
            vertex_stride: source.vertex_stride,
            vertex_attributes: source.vertex_attributes.to_vec(),
            color_attachment_formats: source.color_attachment_formats.to_vec(),
            depth_stencil_format: source.depth_stencil_format,
            set_layouts: source.set_layouts.iter().map(|set| set.to_vec()).collect(),
        }
    }
}

pub type BufferHandle = crate::handle::Handle<Buffer>;
pub type ImageHandle = crate::handle::Handle<Image>;
pub type RenderTargetHandle = crate::handle::Handle<RenderTarget>;
pub type ShaderHandle = crate::handle::Handle<Shader>;
pub type FenceHandle = crate::handle::Handle<vk::Fence>;
pub type SemaphoreHandle = crate::handle::Handle<vk::Semaphore>;

/// Every pool the context owns, per spec §4.2 and §2's object-pool row.
#[derive(Default)]
pub(crate) struct Pools {
    pub(crate) buffers: crate::handle::Pool<Buffer>,
    pub(crate) images: crate::handle::Pool<Image>,
    pub(crate) render_targets: crate::handle::Pool<RenderTarget>,
    pub(crate) shaders: crate::handle::Pool<Shader>,
    pub(crate) fences: crate::handle::Pool<vk::Fence>,
    pub(crate) semaphores: crate::handle::Pool<vk::Semaphore>,
    pub(crate) samplers: crate::handle::Pool<vk::Sampler>,
}

impl Pools {
    pub(crate) fn new() -> Pools {
        Pools::default()
    }

    /// Destroys every pool's live objects in the order spec §4.1's
    /// destructor names (semaphores, fences, ... images, buffers, samplers),
    /// then asserts each pool empty.
    pub(crate) fn destroy_all(&mut self, device: &ash::Device) {
        for view in self.render_targets.drain() {
            // Swapchain-owned views are destroyed by the swapchain manager;
            // only user-owned render targets are torn down here.
            if view.owning_image.is_some() {
                unsafe { device.destroy_image_view(view.view, None) };
            }
        }
        for sampler in self.samplers.drain() {
            unsafe { device.destroy_sampler(sampler, None) };
        }
        for semaphore in self.semaphores.drain() {
            unsafe { device.destroy_semaphore(semaphore, None) };
        }
        for fence in self.fences.drain() {
            unsafe { device.destroy_fence(fence, None) };
        }
        for image in self.images.drain() {
            unsafe {
                if let Some(sampler) = image.sampler {
                    device.destroy_sampler(sampler, None);
                }
                device.destroy_image_view(image.default_view, None);
                device.destroy_image(image.vk_image, None);
            }
            image.allocation.free(device);
        }
        for buffer in self.buffers.drain() {
            unsafe { device.destroy_buffer(buffer.vk_buffer, None) };
            buffer.allocation.free(device);
        }
        self.shaders.drain();

        self.render_targets.assert_empty("render target");
        self.samplers.assert_empty("sampler");
        self.semaphores.assert_empty("semaphore");
        self.fences.assert_empty("fence");
        self.images.assert_empty("image");
        self.buffers.assert_empty("buffer");
        self.shaders.assert_empty("shader");
    }
}
