//! Descriptor-set write-key and the per-frame, per-pipeline-layout
//! descriptor-set cache (spec §4.3, §4.7 step 4, §3 "DescriptorSet
//! (per-frame cached)").
//!
//! The write-key folds write-descriptor content — binding, type, count, and
//! either buffer `(handle, offset, range)` or image `(view, layout,
//! sampler)` — deliberately excluding the destination set, since the lookup
//! happens before the set that would be written exists (spec §4.3: "the
//! lookup key predates the set it would write to").

use ash::vk;

use crate::error::{Error, Result};
use crate::types::BindingType;

use super::CacheMap;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum DescriptorWrite {
    Buffer {
        binding: u32,
        ty: BindingType,
        count: u32,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        range: vk::DeviceSize,
    },
    Image {
        binding: u32,
        ty: BindingType,
        count: u32,
        view: vk::ImageView,
        layout: vk::ImageLayout,
        sampler: vk::Sampler,
    },
}

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct DescriptorSetWriteKey {
    pub writes: Vec<DescriptorWrite>,
}

/// Descriptor-set allocation + write-key cache for one `(pipeline-layout,
/// frame-index)` pair. Owns the pool it allocates from; `reset` is called
/// once per frame slot's reuse, wiping both the pool and the cache map at
/// once (pool sets cannot outlive the frame fence that guards them, spec
/// §3's `PerFrameState` invariant 5).
pub(crate) struct FrameLayoutCache {
    pool: vk::DescriptorPool,
    cache: CacheMap<DescriptorSetWriteKey, vk::DescriptorSet>,
}

const SETS_PER_POOL: u32 = 256;

fn pool_sizes() -> [vk::DescriptorPoolSize; 3] {
    [
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::UNIFORM_BUFFER,
            descriptor_count: SETS_PER_POOL,
        },
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::STORAGE_BUFFER,
            descriptor_count: SETS_PER_POOL,
        },
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            descriptor_count: SETS_PER_POOL,
        },
    ]
}

impl FrameLayoutCache {
    pub(crate) fn new(device: &ash::Device) -> Result<FrameLayoutCache> {
        let sizes = pool_sizes();
        let create_info = vk::DescriptorPoolCreateInfo::builder()
            .max_sets(SETS_PER_POOL)
            .pool_sizes(&sizes);
        let pool = unsafe {
            device
                .create_descriptor_pool(&create_info, None)
                .map_err(|e| Error::from_vk("create_descriptor_pool", e))?
        };
        Ok(FrameLayoutCache {
            pool,
            cache: CacheMap::new(),
        })
    }

    /// Returns the cached set for `key`, allocating and writing it on a
    /// miss (spec §4.7 step 4: "on miss, allocate a descriptor set from the
    /// corresponding pool and write it; on hit, reuse").
    pub(crate) fn find_or_allocate(
        &mut self,
        device: &ash::Device,
        set_layout: vk::DescriptorSetLayout,
        key: DescriptorSetWriteKey,
    ) -> Result<vk::DescriptorSet> {
        if let Some(set) = self.cache.find(&key) {
            return Ok(set);
        }

        let layouts = [set_layout];
        let alloc_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(self.pool)
            .set_layouts(&layouts);
        let set = unsafe {
            device
                .allocate_descriptor_sets(&alloc_info)
                .map_err(|e| Error::from_vk("allocate_descriptor_sets", e))?[0]
        };

        write_descriptor_set(device, set, &key.writes);
        self.cache.add(key, set);
        Ok(set)
    }

    /// Resets the pool (freeing every set allocated from it) and clears the
    /// write-key cache, readying this frame slot for reuse once its fence
    /// has signalled.
    pub(crate) fn reset(&mut self, device: &ash::Device) -> Result<()> {
        unsafe {
            device
                .reset_descriptor_pool(self.pool, vk::DescriptorPoolResetFlags::empty())
                .map_err(|e| Error::from_vk("reset_descriptor_pool", e))?;
        }
        self.cache.clear();
        Ok(())
    }

    pub(crate) fn destroy(&self, device: &ash::Device) {
        unsafe {
            device.destroy_descriptor_pool(self.pool, None);
        }
    }
}

fn write_descriptor_set(device: &ash::Device, set: vk::DescriptorSet, writes: &[DescriptorWrite]) {
    let mut buffer_infos = Vec::with_capacity(writes.len());
    let mut image_infos = Vec::with_capacity(writes.len());
    for w in writes {
        match w {
            DescriptorWrite::Buffer { buffer, offset, range, .. } => {
                buffer_infos.push(Some(vk::DescriptorBufferInfo {
                    buffer: *buffer,
                    offset: *offset,
                    range: *range,
                }));
                image_infos.push(None);
            }
            DescriptorWrite::Image { view, layout, sampler, .. } => {
                image_infos.push(Some(vk::DescriptorImageInfo {
                    sampler: *sampler,
                    image_view: *view,
                    image_layout: *layout,
                }));
                buffer_infos.push(None);
            }
        }
    }

    let vk_writes: Vec<vk::WriteDescriptorSet> = writes
        .iter()
        .enumerate()
        .map(|(i, w)| {
            let (binding, ty, count) = match w {
                DescriptorWrite::Buffer { binding, ty, count, .. } => (*binding, *ty, *count),
                DescriptorWrite::Image { binding, ty, count, .. } => (*binding, *ty, *count),
            };
            let mut builder = vk::WriteDescriptorSet::builder()
                .dst_set(set)
                .dst_binding(binding)
                .dst_array_element(0)
                .descriptor_type(ty.into())
                .descriptor_count(count);
            builder = match &buffer_infos[i] {
                Some(info) => builder.buffer_info(std::slice::from_ref(info)),
                None => builder,
            };
            builder = match &image_infos[i] {
                Some(info) => builder.image_info(std::slice::from_ref(info)),
                None => builder,
            };
            builder.build()
        })
        .collect();

    unsafe {
        device.update_descriptor_sets(&vk_writes, &[]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_key_excludes_destination_set_by_construction() {
        // The key type has no `dst_set` field at all; equal writes to
        // different (not-yet-allocated) sets are indistinguishable, which is
        // the point: the cache key predates the set.
        let w = DescriptorWrite::Buffer {
            binding: 0,
            ty: BindingType::UniformBufferObject,
            count: 1,
            buffer: vk::Buffer::null(),
            offset: 0,
            range: 64,
        };
        let k1 = DescriptorSetWriteKey { writes: vec![w] };
        let k2 = DescriptorSetWriteKey { writes: vec![w] };
        assert_eq!(k1, k2);
    }

    #[test]
    fn differing_buffer_handle_breaks_equality() {
        let w1 = DescriptorWrite::Buffer {
            binding: 0,
            ty: BindingType::UniformBufferObject,
            count: 1,
            buffer: vk::Buffer::from_raw(1),
            offset: 0,
            range: 64,
        };
        let w2 = DescriptorWrite::Buffer {
            binding: 0,
            ty: BindingType::UniformBufferObject,
            count: 1,
            buffer: vk::Buffer::from_raw(2),
            offset: 0,
            range: 64,
        };
        assert_ne!(
            DescriptorSetWriteKey { writes: vec![w1] },
            DescriptorSetWriteKey { writes: vec![w2] }
        );
    }
}
