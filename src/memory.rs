//! A small VMA-style allocator: memory-type selection, dedicated
//! allocations, and persistent mapping for host-visible memory.
//!
//! Each [`Allocation`] owns one `vk::DeviceMemory`; the staging buffer (the
//! only allocation that needs a stable host pointer across the process
//! lifetime) is mapped once at creation and never unmapped until destroyed,
//! matching the teacher's `mapped_region: *mut u8` field in
//! `examples/ennis-autograph-ng/src/upload_buffer.rs`.

use ash::vk;

use crate::error::{Error, Result};
use crate::types::MemoryUsage;

pub(crate) struct Allocation {
    pub(crate) memory: vk::DeviceMemory,
    pub(crate) size: vk::DeviceSize,
    pub(crate) mapped_ptr: Option<*mut u8>,
}

// SAFETY: `mapped_ptr` points into host-visible, coherent device memory
// owned exclusively by this allocation; the pointer itself carries no
// thread-affinity, and the single-threaded scheduling model (spec §5) means
// no two threads ever touch it concurrently.
unsafe impl Send for Allocation {}

fn memory_property_flags(usage: MemoryUsage) -> vk::MemoryPropertyFlags {
    match usage {
        MemoryUsage::GpuOnly => vk::MemoryPropertyFlags::DEVICE_LOCAL,
        MemoryUsage::CpuOnly => {
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT
        }
        MemoryUsage::CpuToGpu => {
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT
        }
        MemoryUsage::GpuToCpu => {
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_CACHED
        }
    }
}

fn is_host_visible(usage: MemoryUsage) -> bool {
    !matches!(usage, MemoryUsage::GpuOnly)
}

pub(crate) fn find_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    required: vk::MemoryPropertyFlags,
) -> Result<u32> {
    for i in 0..memory_properties.memory_type_count {
        let type_supported = (type_bits & (1 << i)) != 0;
        let props_supported = memory_properties.memory_types[i as usize]
            .property_flags
            .contains(required);
        if type_supported && props_supported {
            return Ok(i);
        }
    }
    Err(Error::InitFailed {
        reason: format!("no memory type matches requirements {required:?}"),
    })
}

pub(crate) fn allocate(
    device: &ash::Device,
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    requirements: vk::MemoryRequirements,
    usage: MemoryUsage,
) -> Result<Allocation> {
    let required_flags = memory_property_flags(usage);
    let type_index = find_memory_type(memory_properties, requirements.memory_type_bits, required_flags)?;

    let alloc_info = vk::MemoryAllocateInfo::builder()
        .allocation_size(requirements.size)
        .memory_type_index(type_index);

    let memory = unsafe {
        device
            .allocate_memory(&alloc_info, None)
            .map_err(|e| Error::from_vk("allocate_memory", e))?
    };

    let mapped_ptr = if is_host_visible(usage) {
        let ptr = unsafe {
            device
                .map_memory(memory, 0, vk::WHOLE_SIZE, vk::MemoryMapFlags::empty())
                .map_err(|e| Error::from_vk("map_memory", e))?
        };
        Some(ptr as *mut u8)
    } else {
        None
    };

    Ok(Allocation {
        memory,
        size: requirements.size,
        mapped_ptr,
    })
}

impl Allocation {
    pub(crate) fn free(&self, device: &ash::Device) {
        unsafe {
            // vkFreeMemory implicitly unmaps; no explicit vkUnmapMemory call
            // is required or safe to make after this point.
            device.free_memory(self.memory, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(types: &[(u32, vk::MemoryPropertyFlags)]) -> vk::PhysicalDeviceMemoryProperties {
        let mut p = vk::PhysicalDeviceMemoryProperties::default();
        p.memory_type_count = types.len() as u32;
        for (i, (heap, flags)) in types.iter().enumerate() {
            p.memory_types[i] = vk::MemoryType {
                property_flags: *flags,
                heap_index: *heap,
            };
        }
        p
    }

    #[test]
    fn finds_device_local_type() {
        let p = props(&[
            (0, vk::MemoryPropertyFlags::HOST_VISIBLE),
            (0, vk::MemoryPropertyFlags::DEVICE_LOCAL),
        ]);
        let idx = find_memory_type(&p, 0b11, vk::MemoryPropertyFlags::DEVICE_LOCAL).unwrap();
        assert_eq!(idx, 1);
    }

    #[test]
    fn respects_type_bits_mask() {
        let p = props(&[
            (0, vk::MemoryPropertyFlags::DEVICE_LOCAL),
            (0, vk::MemoryPropertyFlags::DEVICE_LOCAL),
        ]);
        // only type index 1 is allowed by the mask, even though 0 also matches
        let idx = find_memory_type(&p, 0b10, vk::MemoryPropertyFlags::DEVICE_LOCAL).unwrap();
        assert_eq!(idx, 1);
    }

    #[test]
    fn errors_when_no_type_matches() {
        let p = props(&[(0, vk::MemoryPropertyFlags::DEVICE_LOCAL)]);
        assert!(find_memory_type(&p, 0b1, vk::MemoryPropertyFlags::HOST_VISIBLE).is_err());
    }
}
