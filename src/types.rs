//! Backend-neutral value types used across the public recording API.
//!
//! Enumerations here are exact and stable (spec §6): values line up with the
//! Vulkan enums they map to so that `From`/`Into` conversions in the backend
//! modules are trivial `match`es rather than arbitrary remappings.

use ash::vk;
use ordered_float::NotNan;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[repr(u32)]
pub enum PresentMode {
    Immediate = 0,
    Mailbox = 1,
    Fifo = 2,
    FifoRelaxed = 3,
}

impl From<PresentMode> for vk::PresentModeKHR {
    fn from(mode: PresentMode) -> Self {
        match mode {
            PresentMode::Immediate => vk::PresentModeKHR::IMMEDIATE,
            PresentMode::Mailbox => vk::PresentModeKHR::MAILBOX,
            PresentMode::Fifo => vk::PresentModeKHR::FIFO,
            PresentMode::FifoRelaxed => vk::PresentModeKHR::FIFO_RELAXED,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Format {
    R8Unorm,
    R8G8B8Unorm,
    R8G8B8A8Unorm,
    B8G8R8Unorm,
    B8G8R8A8Unorm,
    Depth16Unorm,
    Depth32Float,
    Depth16UnormStencil8Uint,
    Depth24UnormStencil8Uint,
    Depth32FloatStencil8Uint,
}

impl Format {
    pub fn is_depth(self) -> bool {
        matches!(
            self,
            Format::Depth16Unorm
                | Format::Depth32Float
                | Format::Depth16UnormStencil8Uint
                | Format::Depth24UnormStencil8Uint
                | Format::Depth32FloatStencil8Uint
        )
    }

    pub fn has_stencil(self) -> bool {
        matches!(
            self,
            Format::Depth16UnormStencil8Uint
                | Format::Depth24UnormStencil8Uint
                | Format::Depth32FloatStencil8Uint
        )
    }

    /// Bytes per texel for the formats that are valid as a copy destination.
    /// Depth/stencil formats are never the destination of a `submit_copy`.
    pub fn texel_size(self) -> u32 {
        match self {
            Format::R8Unorm => 1,
            Format::R8G8B8Unorm | Format::B8G8R8Unorm => 3,
            Format::R8G8B8A8Unorm | Format::B8G8R8A8Unorm => 4,
            _ => panic!("{self:?} has no defined texel size for host-side copies"),
        }
    }
}

impl From<Format> for vk::Format {
    fn from(format: Format) -> Self {
        match format {
            Format::R8Unorm => vk::Format::R8_UNORM,
            Format::R8G8B8Unorm => vk::Format::R8G8B8_UNORM,
            Format::R8G8B8A8Unorm => vk::Format::R8G8B8A8_UNORM,
            Format::B8G8R8Unorm => vk::Format::B8G8R8_UNORM,
            Format::B8G8R8A8Unorm => vk::Format::B8G8R8A8_UNORM,
            Format::Depth16Unorm => vk::Format::D16_UNORM,
            Format::Depth32Float => vk::Format::D32_SFLOAT,
            Format::Depth16UnormStencil8Uint => vk::Format::D16_UNORM_S8_UINT,
            Format::Depth24UnormStencil8Uint => vk::Format::D24_UNORM_S8_UINT,
            Format::Depth32FloatStencil8Uint => vk::Format::D32_SFLOAT_S8_UINT,
        }
    }
}

bitflags::bitflags! {
    /// Powers of two 1..64, matching `vk::SampleCountFlags`.
    #[derive(Default)]
    pub struct SampleBit: u32 {
        const X1 = 1;
        const X2 = 2;
        const X4 = 4;
        const X8 = 8;
        const X16 = 16;
        const X32 = 32;
        const X64 = 64;
    }
}

impl From<SampleBit> for vk::SampleCountFlags {
    fn from(bit: SampleBit) -> Self {
        vk::SampleCountFlags::from_raw(bit.bits())
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum RenderPassLoad {
    Load,
    Clear,
}

impl From<RenderPassLoad> for vk::AttachmentLoadOp {
    fn from(op: RenderPassLoad) -> Self {
        match op {
            RenderPassLoad::Load => vk::AttachmentLoadOp::LOAD,
            RenderPassLoad::Clear => vk::AttachmentLoadOp::CLEAR,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum RenderPassStore {
    Store,
    DontCare,
}

impl From<RenderPassStore> for vk::AttachmentStoreOp {
    fn from(op: RenderPassStore) -> Self {
        match op {
            RenderPassStore::Store => vk::AttachmentStoreOp::STORE,
            RenderPassStore::DontCare => vk::AttachmentStoreOp::DONT_CARE,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum RenderPassLayout {
    Undefined,
    AsAttachment,
    ShaderReadOnly,
    Present,
}

impl From<RenderPassLayout> for vk::ImageLayout {
    fn from(layout: RenderPassLayout) -> Self {
        match layout {
            RenderPassLayout::Undefined => vk::ImageLayout::UNDEFINED,
            RenderPassLayout::AsAttachment => vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            RenderPassLayout::ShaderReadOnly => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            RenderPassLayout::Present => vk::ImageLayout::PRESENT_SRC_KHR,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum AttachmentReference {
    ColorReadOnly,
    ColorAttachment,
    DepthStencilReadOnly,
    DepthStencilAttachment,
}

impl AttachmentReference {
    pub fn layout(self) -> vk::ImageLayout {
        match self {
            AttachmentReference::ColorReadOnly => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            AttachmentReference::ColorAttachment => vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            AttachmentReference::DepthStencilReadOnly => {
                vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL
            }
            AttachmentReference::DepthStencilAttachment => {
                vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
            }
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum BindingType {
    UniformBufferObject,
    StorageBufferObject,
    Sampler,
}

impl From<BindingType> for vk::DescriptorType {
    fn from(ty: BindingType) -> Self {
        match ty {
            BindingType::UniformBufferObject => vk::DescriptorType::UNIFORM_BUFFER,
            BindingType::StorageBufferObject => vk::DescriptorType::STORAGE_BUFFER,
            BindingType::Sampler => vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum BufferType {
    VertexIndexBuffer,
    UniformBufferObject,
    StorageBufferObject,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum MemoryUsage {
    GpuOnly,
    CpuOnly,
    CpuToGpu,
    GpuToCpu,
}

bitflags::bitflags! {
    #[derive(Default)]
    pub struct ShaderStageFlags: u32 {
        const VERTEX = 1 << 0;
        const FRAGMENT = 1 << 1;
    }
}

/// A single shader + binding-layout package, as produced by the (external,
/// out of scope) bytecode loader. `set_layouts[set][binding]` names the
/// binding's type/count/stage, used to derive `DescriptorSetLayoutKey`s.
pub struct ShaderSource<'a> {
    pub vertex_spirv: &'a [u32],
    pub fragment_spirv: &'a [u32],
    pub vertex_stride: u32,
    pub vertex_attributes: &'a [VertexAttribute],
    pub color_attachment_formats: &'a [Format],
    pub depth_stencil_format: Option<Format>,
    pub set_layouts: &'a [&'a [BindingDescriptor]],
}

#[derive(Copy, Clone, Debug)]
pub struct VertexAttribute {
    pub location: u32,
    pub format: Format,
    pub offset: u32,
}

#[derive(Copy, Clone, Debug)]
pub struct BindingDescriptor {
    pub name: &'static str,
    pub binding: u32,
    pub ty: BindingType,
    pub size: u32,
    pub count: u32,
    pub stage: ShaderStageFlags,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

#[derive(Copy, Clone, Debug)]
pub enum ClearValue {
    Color([f32; 4]),
    DepthStencil { depth: f32, stencil: u32 },
}

impl ClearValue {
    pub(crate) fn to_vk(self) -> vk::ClearValue {
        match self {
            ClearValue::Color(c) => vk::ClearValue {
                color: vk::ClearColorValue { float32: c },
            },
            ClearValue::DepthStencil { depth, stencil } => vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue { depth, stencil },
            },
        }
    }
}

/// A single attachment slot within a render pass, as described by the client.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct AttachmentDescription {
    pub format: Format,
    pub samples: SampleBit,
    pub load: RenderPassLoad,
    pub store: RenderPassStore,
    pub stencil_load: RenderPassLoad,
    pub stencil_store: RenderPassStore,
    pub initial_layout: RenderPassLayout,
    pub final_layout: RenderPassLayout,
    pub reference: AttachmentReference,
}

pub(crate) fn not_nan(v: f32) -> NotNan<f32> {
    NotNan::new(v).expect("NaN is not a valid value here")
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct PushConstantRangeDesc {
    pub stage: ShaderStageFlags,
    pub offset: u32,
    pub size: u32,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum CullMode {
    None,
    Front,
    Back,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum PolygonMode {
    Fill,
    Line,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum FrontFace {
    Clockwise,
    CounterClockwise,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct PipelineRasterizationDesc {
    pub cull_mode: CullMode,
    pub polygon_mode: PolygonMode,
    pub front_face: FrontFace,
}

impl Default for PipelineRasterizationDesc {
    fn default() -> Self {
        PipelineRasterizationDesc {
            cull_mode: CullMode::Back,
            polygon_mode: PolygonMode::Fill,
            front_face: FrontFace::CounterClockwise,
        }
    }
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct PipelineDepthStencilDesc {
    pub depth_test_enable: bool,
    pub depth_write_enable: bool,
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct PipelineBlendDesc {
    pub enable: bool,
}

/// The "root signature" and fixed-function state a pipeline is created with
/// (spec §4.8: `create_pipeline(shader, root_signature, attachments,
/// pipeline_format)`). Viewport/scissor are left dynamic — set per-pass
/// during recording (spec §4.7 step 3) — so they are not part of this desc.
#[derive(Clone, Debug, Default)]
pub struct PipelineStateDesc<'a> {
    pub push_constant_ranges: &'a [PushConstantRangeDesc],
    pub rasterization: PipelineRasterizationDesc,
    pub depth_stencil: PipelineDepthStencilDesc,
    pub blend: PipelineBlendDesc,
}
