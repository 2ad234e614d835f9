//! Logical device creation and queue-family resolution.
//!
//! Flattens what the original's device wrapper spread across thirteen
//! inheritance levels (spec §9) into one `Device` struct composing the
//! instance, queue info, and allocator, the way
//! `examples/ennis-autograph-ng/src/renderer/backend/vk/mod.rs`'s
//! `VulkanRenderer` already groups `entry`/`instance`/`device`/`queues`/
//! `default_pool` in a single struct. Queue-family search is grounded on
//! `examples/ennis-autograph-ng/src/device/queue.rs`, simplified to the
//! single graphics+transfer queue the spec calls for (no separate transfer/
//! compute/present families — Non-goals exclude multi-queue scheduling).

use ash::vk;
use std::ffi::CStr;

use crate::error::{Error, Result};
use crate::instance::Instance;

pub(crate) struct Device {
    pub(crate) handle: ash::Device,
    pub(crate) physical_device: vk::PhysicalDevice,
    pub(crate) memory_properties: vk::PhysicalDeviceMemoryProperties,
    pub(crate) properties: vk::PhysicalDeviceProperties,
    pub(crate) graphics_queue_family: u32,
    pub(crate) graphics_queue: vk::Queue,
}

/// Finds the first queue family exposing both `GRAPHICS` and `TRANSFER`,
/// per spec §4.1 ("family chosen as the first family exposing both bits").
fn find_graphics_transfer_family(props: &[vk::QueueFamilyProperties]) -> Result<u32> {
    props
        .iter()
        .position(|p| {
            p.queue_flags
                .contains(vk::QueueFlags::GRAPHICS | vk::QueueFlags::TRANSFER)
        })
        .map(|i| i as u32)
        .ok_or_else(|| Error::InitFailed {
            reason: "no queue family exposes both GRAPHICS and TRANSFER".into(),
        })
}

impl Device {
    pub(crate) fn new(instance: &Instance, physical_device: vk::PhysicalDevice) -> Result<Device> {
        let queue_family_properties = unsafe {
            instance
                .handle
                .get_physical_device_queue_family_properties(physical_device)
        };
        let graphics_queue_family = find_graphics_transfer_family(&queue_family_properties)?;

        let queue_priorities = [1.0_f32];
        let queue_create_info = vk::DeviceQueueCreateInfo::builder()
            .queue_family_index(graphics_queue_family)
            .queue_priorities(&queue_priorities);

        let supported_features = unsafe {
            instance
                .handle
                .get_physical_device_features(physical_device)
        };
        let enabled_features = vk::PhysicalDeviceFeatures {
            sampler_anisotropy: supported_features.sampler_anisotropy,
            shader_sampled_image_array_dynamic_indexing: supported_features
                .shader_sampled_image_array_dynamic_indexing,
            fill_mode_non_solid: supported_features.fill_mode_non_solid,
            ..Default::default()
        };

        let device_extensions = [ash::extensions::khr::Swapchain::name().as_ptr()];
        let queue_infos = [queue_create_info.build()];
        let device_create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&device_extensions)
            .enabled_features(&enabled_features);

        let handle = unsafe {
            instance
                .handle
                .create_device(physical_device, &device_create_info, None)
                .map_err(|e| Error::InitFailed {
                    reason: format!("vkCreateDevice failed: {e:?}"),
                })?
        };

        let graphics_queue = unsafe { handle.get_device_queue(graphics_queue_family, 0) };
        let memory_properties =
            unsafe { instance.handle.get_physical_device_memory_properties(physical_device) };
        let properties = unsafe {
            instance
                .handle
                .get_physical_device_properties(physical_device)
        };

        let device_name =
            unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }.to_string_lossy();
        log::info!("selected physical device: {device_name}");

        Ok(Device {
            handle,
            physical_device,
            memory_properties,
            properties,
            graphics_queue_family,
            graphics_queue,
        })
    }

    /// Destroys the logical device. `Instance` outlives `Device` and is
    /// dropped separately by the owning `Context`.
    pub(crate) fn destroy(&self) {
        unsafe {
            self.handle.destroy_device(None);
        }
    }
}
