//! Descriptor-set-layout structural key and creation (spec §4.3, §3).
//!
//! Key = ordered bindings `(index, type, count, stage-mask)`, folded in
//! declaration order — the same order the shader's `ShaderSource::set_layouts`
//! entry for that set provided, so two calls with equivalent bindings in the
//! same order always collide in the cache (spec §8.1's idempotence property).

use ash::vk;

use crate::error::{Error, Result};
use crate::types::BindingType;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub(crate) struct BindingKey {
    pub(crate) binding: u32,
    pub(crate) ty: BindingType,
    pub(crate) count: u32,
    pub(crate) stage_mask: u32,
}

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub(crate) struct DescriptorSetLayoutKey {
    pub(crate) bindings: Vec<BindingKey>,
}

pub(crate) fn create(
    device: &ash::Device,
    key: &DescriptorSetLayoutKey,
) -> Result<vk::DescriptorSetLayout> {
    let vk_bindings: Vec<vk::DescriptorSetLayoutBinding> = key
        .bindings
        .iter()
        .map(|b| vk::DescriptorSetLayoutBinding {
            binding: b.binding,
            descriptor_type: b.ty.into(),
            descriptor_count: b.count,
            stage_flags: vk::ShaderStageFlags::from_raw(b.stage_mask),
            p_immutable_samplers: std::ptr::null(),
        })
        .collect();

    let create_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&vk_bindings);

    unsafe {
        device
            .create_descriptor_set_layout(&create_info, None)
            .map_err(|e| Error::from_vk("create_descriptor_set_layout", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binding_order_is_significant() {
        let a = BindingKey {
            binding: 0,
            ty: BindingType::UniformBufferObject,
            count: 1,
            stage_mask: 1,
        };
        let b = BindingKey {
            binding: 1,
            ty: BindingType::Sampler,
            count: 1,
            stage_mask: 2,
        };
        let k1 = DescriptorSetLayoutKey {
            bindings: vec![a, b],
        };
        let k2 = DescriptorSetLayoutKey {
            bindings: vec![b, a],
        };
        assert_ne!(k1, k2);
    }

    #[test]
    fn identical_binding_lists_are_equal() {
        let a = BindingKey {
            binding: 0,
            ty: BindingType::StorageBufferObject,
            count: 4,
            stage_mask: 1,
        };
        let k1 = DescriptorSetLayoutKey { bindings: vec![a] };
        let k2 = DescriptorSetLayoutKey { bindings: vec![a] };
        assert_eq!(k1, k2);
    }
}
