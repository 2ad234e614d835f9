//! Render-pass structural key and creation (spec §4.3, §3 "RenderPass
//! (cached)").
//!
//! The key folds per-attachment-description content, then per-subpass
//! content (bind point + input/color/resolve/depth-stencil/preserve
//! references), then per-dependency content — never pointer identity, per
//! spec §9's "store sub-arrays as owned sequences inside the cache key".

use ash::vk;

use crate::error::{Error, Result};
use crate::types::AttachmentDescription;

/// `vk::SUBPASS_EXTERNAL` represented as a key-friendly sentinel.
pub(crate) const SUBPASS_EXTERNAL: u32 = vk::SUBPASS_EXTERNAL;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub(crate) struct AttachmentRef {
    pub(crate) attachment: u32,
    pub(crate) layout: crate::types::RenderPassLayout,
}

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub(crate) struct SubpassDescription {
    pub(crate) input_refs: Vec<AttachmentRef>,
    pub(crate) color_refs: Vec<AttachmentRef>,
    pub(crate) resolve_refs: Vec<AttachmentRef>,
    pub(crate) depth_stencil_ref: Option<AttachmentRef>,
    pub(crate) preserve_refs: Vec<u32>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub(crate) struct SubpassDependency {
    pub(crate) src_subpass: u32,
    pub(crate) dst_subpass: u32,
    pub(crate) src_stage_mask: u32,
    pub(crate) dst_stage_mask: u32,
    pub(crate) src_access_mask: u32,
    pub(crate) dst_access_mask: u32,
}

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub(crate) struct RenderPassKey {
    pub(crate) attachments: Vec<AttachmentDescription>,
    pub(crate) subpasses: Vec<SubpassDescription>,
    pub(crate) dependencies: Vec<SubpassDependency>,
}

fn to_vk_attachment(a: &AttachmentDescription) -> vk::AttachmentDescription {
    vk::AttachmentDescription {
        format: a.format.into(),
        samples: a.samples.into(),
        load_op: a.load.into(),
        store_op: a.store.into(),
        stencil_load_op: a.stencil_load.into(),
        stencil_store_op: a.stencil_store.into(),
        initial_layout: a.initial_layout.into(),
        final_layout: a.final_layout.into(),
        ..Default::default()
    }
}

fn to_vk_ref(r: &AttachmentRef) -> vk::AttachmentReference {
    vk::AttachmentReference {
        attachment: r.attachment,
        layout: r.layout.into(),
    }
}

/// Builds and creates the Vulkan render pass object for `key`. Called only
/// on a cache miss (spec §4.7's RecordingPasses step 1).
pub(crate) fn create(device: &ash::Device, key: &RenderPassKey) -> Result<vk::RenderPass> {
    let vk_attachments: Vec<vk::AttachmentDescription> =
        key.attachments.iter().map(to_vk_attachment).collect();

    // Owned per-subpass reference arrays must outlive the
    // `SubpassDescription` builders that borrow them.
    let mut input_refs = Vec::with_capacity(key.subpasses.len());
    let mut color_refs = Vec::with_capacity(key.subpasses.len());
    let mut resolve_refs = Vec::with_capacity(key.subpasses.len());
    let mut depth_refs = Vec::with_capacity(key.subpasses.len());

    for s in &key.subpasses {
        input_refs.push(s.input_refs.iter().map(to_vk_ref).collect::<Vec<_>>());
        color_refs.push(s.color_refs.iter().map(to_vk_ref).collect::<Vec<_>>());
        resolve_refs.push(s.resolve_refs.iter().map(to_vk_ref).collect::<Vec<_>>());
        depth_refs.push(s.depth_stencil_ref.as_ref().map(to_vk_ref));
    }

    let vk_subpasses: Vec<vk::SubpassDescription> = key
        .subpasses
        .iter()
        .enumerate()
        .map(|(i, s)| {
            let mut builder = vk::SubpassDescription::builder()
                .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
                .input_attachments(&input_refs[i])
                .color_attachments(&color_refs[i])
                .preserve_attachments(&s.preserve_refs);
            if !resolve_refs[i].is_empty() {
                builder = builder.resolve_attachments(&resolve_refs[i]);
            }
            if let Some(depth) = &depth_refs[i] {
                builder = builder.depth_stencil_attachment(depth);
            }
            builder.build()
        })
        .collect();

    let vk_dependencies: Vec<vk::SubpassDependency> = key
        .dependencies
        .iter()
        .map(|d| vk::SubpassDependency {
            src_subpass: d.src_subpass,
            dst_subpass: d.dst_subpass,
            src_stage_mask: vk::PipelineStageFlags::from_raw(d.src_stage_mask),
            dst_stage_mask: vk::PipelineStageFlags::from_raw(d.dst_stage_mask),
            src_access_mask: vk::AccessFlags::from_raw(d.src_access_mask),
            dst_access_mask: vk::AccessFlags::from_raw(d.dst_access_mask),
            ..Default::default()
        })
        .collect();

    let create_info = vk::RenderPassCreateInfo::builder()
        .attachments(&vk_attachments)
        .subpasses(&vk_subpasses)
        .dependencies(&vk_dependencies);

    unsafe {
        device
            .create_render_pass(&create_info, None)
            .map_err(|e| Error::from_vk("create_render_pass", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        AttachmentReference, Format, RenderPassLayout, RenderPassLoad, RenderPassStore, SampleBit,
    };

    fn single_color_attachment() -> AttachmentDescription {
        AttachmentDescription {
            format: Format::B8G8R8A8Unorm,
            samples: SampleBit::X1,
            load: RenderPassLoad::Clear,
            store: RenderPassStore::Store,
            stencil_load: RenderPassLoad::Load,
            stencil_store: RenderPassStore::DontCare,
            initial_layout: RenderPassLayout::Undefined,
            final_layout: RenderPassLayout::Present,
            reference: AttachmentReference::ColorAttachment,
        }
    }

    #[test]
    fn structurally_equal_keys_compare_equal() {
        let k1 = RenderPassKey {
            attachments: vec![single_color_attachment()],
            subpasses: vec![],
            dependencies: vec![],
        };
        let k2 = RenderPassKey {
            attachments: vec![single_color_attachment()],
            subpasses: vec![],
            dependencies: vec![],
        };
        assert_eq!(k1, k2);

        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};
        let mut h1 = DefaultHasher::new();
        k1.hash(&mut h1);
        let mut h2 = DefaultHasher::new();
        k2.hash(&mut h2);
        assert_eq!(h1.finish(), h2.finish());
    }

    #[test]
    fn differing_load_op_breaks_equality() {
        let mut other = single_color_attachment();
        other.load = RenderPassLoad::Load;
        let k1 = RenderPassKey {
            attachments: vec![single_color_attachment()],
            subpasses: vec![],
            dependencies: vec![],
        };
        let k2 = RenderPassKey {
            attachments: vec![other],
            subpasses: vec![],
            dependencies: vec![],
        };
        assert_ne!(k1, k2);
    }
}
