//! A retained-mode Vulkan 1.2 rendering core: a frame scheduler, a staging
//! ring allocator, and content-addressed structural caches, wrapped up in a
//! single [`Context`](context::Context).

mod cache;
mod config;
mod context;
mod device;
mod error;
mod frame;
mod handle;
mod instance;
mod memory;
mod pipeline;
mod resources;
mod staging;
mod swapchain;
mod transfer;
mod types;
mod window;

pub use config::ContextConfig;
pub use context::Context;
pub use error::{Error, Result};
pub use frame::{DescriptorSetWriteKey, DescriptorWrite, DrawCommand, RenderPassData, SwapchainHandle};
pub use handle::Handle;
pub use pipeline::PipelineHandle;
pub use resources::{BufferHandle, FenceHandle, ImageHandle, RenderTargetHandle, SemaphoreHandle, ShaderHandle};
pub use transfer::{CopyCommand, MipLevelCopy};
pub use window::WindowDescriptor;

pub use types::{
    AttachmentDescription, AttachmentReference, BindingDescriptor, BindingType, BufferType,
    ClearValue, CullMode, Format, FrontFace, MemoryUsage, PipelineBlendDesc,
    PipelineDepthStencilDesc, PipelineRasterizationDesc, PipelineStateDesc, PolygonMode,
    PresentMode, PushConstantRangeDesc, RenderPassLayout, RenderPassLoad, RenderPassStore,
    SampleBit, ShaderSource, ShaderStageFlags, Viewport, VertexAttribute,
};
