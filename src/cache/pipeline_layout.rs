//! Pipeline-layout structural key and creation (spec §4.3, §3).
//!
//! Key = ordered descriptor-set-layout handles + ordered push-constant-range
//! triples. Set layouts are folded by the already-cached `vk::DescriptorSetLayout`
//! handle rather than re-hashing their bindings, since two structurally equal
//! `DescriptorSetLayoutKey`s are guaranteed (spec §8.1) to already resolve to
//! the same handle.

use ash::vk;

use crate::error::{Error, Result};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub(crate) struct PushConstantRange {
    pub(crate) stage_mask: u32,
    pub(crate) offset: u32,
    pub(crate) size: u32,
}

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub(crate) struct PipelineLayoutKey {
    pub(crate) set_layouts: Vec<vk::DescriptorSetLayout>,
    pub(crate) push_constant_ranges: Vec<PushConstantRange>,
}

pub(crate) fn create(device: &ash::Device, key: &PipelineLayoutKey) -> Result<vk::PipelineLayout> {
    let vk_ranges: Vec<vk::PushConstantRange> = key
        .push_constant_ranges
        .iter()
        .map(|r| vk::PushConstantRange {
            stage_flags: vk::ShaderStageFlags::from_raw(r.stage_mask),
            offset: r.offset,
            size: r.size,
        })
        .collect();

    let create_info = vk::PipelineLayoutCreateInfo::builder()
        .set_layouts(&key.set_layouts)
        .push_constant_ranges(&vk_ranges);

    unsafe {
        device
            .create_pipeline_layout(&create_info, None)
            .map_err(|e| Error::from_vk("create_pipeline_layout", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_layouts_are_equal() {
        let k1 = PipelineLayoutKey {
            set_layouts: vec![],
            push_constant_ranges: vec![],
        };
        let k2 = PipelineLayoutKey {
            set_layouts: vec![],
            push_constant_ranges: vec![],
        };
        assert_eq!(k1, k2);
    }

    #[test]
    fn differing_push_constant_range_breaks_equality() {
        let k1 = PipelineLayoutKey {
            set_layouts: vec![],
            push_constant_ranges: vec![PushConstantRange {
                stage_mask: 1,
                offset: 0,
                size: 64,
            }],
        };
        let k2 = PipelineLayoutKey {
            set_layouts: vec![],
            push_constant_ranges: vec![PushConstantRange {
                stage_mask: 1,
                offset: 0,
                size: 128,
            }],
        };
        assert_ne!(k1, k2);
    }
}
