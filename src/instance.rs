//! Instance creation, debug messenger, and physical-device selection.
//!
//! Grounded on `examples/ennis-autograph-ng/src/renderer/backend/vk/instance.rs`
//! for the layer/extension negotiation shape (enumerate what the driver
//! supports, intersect with what was requested, log the difference) and on
//! `examples/tfufuz1-NovaDE/novade-vulkan-renderer/src/lib.rs` for the modern
//! `ash` 0.37 builder API and `VK_EXT_debug_utils` callback, since the
//! teacher's own code targets the since-removed `VK_EXT_debug_report`.

use std::ffi::{CStr, CString};
use std::os::raw::c_char;

use ash::extensions::ext::DebugUtils;
use ash::vk;

use crate::config::ContextConfig;
use crate::error::{Error, Result};

pub(crate) struct Instance {
    pub(crate) entry: ash::Entry,
    pub(crate) handle: ash::Instance,
    pub(crate) debug_utils: Option<DebugUtils>,
    pub(crate) debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
}

unsafe extern "system" fn vulkan_debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    let data = &*callback_data;
    let message = if data.p_message.is_null() {
        std::borrow::Cow::from("")
    } else {
        CStr::from_ptr(data.p_message).to_string_lossy()
    };

    // Only WARNING and ERROR are routed through the caller-supplied
    // callbacks (spec §4.1); everything else only goes to the `log` facade.
    match severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            log::error!(target: "vulkan", "[{message_type:?}] {message}");
            if !user_data.is_null() {
                let config = &*(user_data as *const ContextConfig);
                config.emit_warning(&format!("vulkan error: {message}"));
            }
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            log::warn!(target: "vulkan", "[{message_type:?}] {message}");
            if !user_data.is_null() {
                let config = &*(user_data as *const ContextConfig);
                config.emit_warning(&format!("vulkan warning: {message}"));
            }
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => {
            log::debug!(target: "vulkan", "[{message_type:?}] {message}");
        }
        _ => {
            log::trace!(target: "vulkan", "[{message_type:?}] {message}");
        }
    }
    vk::FALSE
}

fn platform_surface_extension() -> &'static CStr {
    #[cfg(all(unix, not(target_os = "macos")))]
    {
        ash::extensions::khr::XlibSurface::name()
    }
    #[cfg(windows)]
    {
        ash::extensions::khr::Win32Surface::name()
    }
    #[cfg(target_os = "macos")]
    {
        ash::extensions::mvk::MacOSSurface::name()
    }
}

impl Instance {
    pub(crate) fn new(config: &ContextConfig) -> Result<Instance> {
        let entry = unsafe {
            ash::Entry::load().map_err(|e| Error::InitFailed {
                reason: format!("failed to load the Vulkan loader: {e}"),
            })?
        };

        let app_name = CString::new("vkframe").unwrap();
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name)
            .engine_name(&app_name)
            .api_version(vk::API_VERSION_1_2);

        let available_extensions = unsafe {
            entry
                .enumerate_instance_extension_properties(None)
                .map_err(|e| Error::from_vk("enumerate_instance_extension_properties", e))?
        };
        let available_layers = unsafe {
            entry
                .enumerate_instance_layer_properties()
                .map_err(|e| Error::from_vk("enumerate_instance_layer_properties", e))?
        };

        let mut wanted_extensions = vec![
            ash::extensions::khr::Surface::name().to_owned(),
            platform_surface_extension().to_owned(),
        ];
        let mut debug_utils_requested = true;
        wanted_extensions.push(DebugUtils::name().to_owned());

        let (enabled_extensions, dropped_extensions) =
            intersect(&wanted_extensions, &available_extensions, |p| unsafe {
                CStr::from_ptr(p.extension_name.as_ptr()).to_owned()
            });
        if dropped_extensions.iter().any(|e| e.as_c_str() == DebugUtils::name()) {
            debug_utils_requested = false;
        }
        if !dropped_extensions.is_empty() {
            config.emit_warning(&format!(
                "instance extensions not supported by the driver, skipping: {dropped_extensions:?}"
            ));
        }

        let mut wanted_layers: Vec<CString> = config
            .requested_layers()
            .into_iter()
            .map(|s| CString::new(s).unwrap())
            .collect();
        wanted_layers.push(CString::new("VK_LAYER_KHRONOS_validation").unwrap());
        for extra in config.requested_instance_extensions() {
            wanted_extensions.push(CString::new(extra).unwrap());
        }

        let (enabled_layers, dropped_layers) =
            intersect(&wanted_layers, &available_layers, |p| unsafe {
                CStr::from_ptr(p.layer_name.as_ptr()).to_owned()
            });
        if !dropped_layers.is_empty() {
            config.emit_warning(&format!(
                "validation layers not supported by the driver, skipping: {dropped_layers:?}"
            ));
        }

        let enabled_extension_ptrs: Vec<*const c_char> =
            enabled_extensions.iter().map(|e| e.as_ptr()).collect();
        let enabled_layer_ptrs: Vec<*const c_char> =
            enabled_layers.iter().map(|e| e.as_ptr()).collect();

        let mut debug_messenger_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(vulkan_debug_callback))
            .user_data(config as *const ContextConfig as *mut std::ffi::c_void);

        let mut instance_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&enabled_extension_ptrs)
            .enabled_layer_names(&enabled_layer_ptrs);
        if debug_utils_requested {
            instance_info = instance_info.push_next(&mut debug_messenger_info);
        }

        let handle = unsafe {
            entry
                .create_instance(&instance_info, None)
                .map_err(|e| Error::InitFailed {
                    reason: format!("vkCreateInstance failed: {e:?}"),
                })?
        };

        let (debug_utils, debug_messenger) = if debug_utils_requested {
            let loader = DebugUtils::new(&entry, &handle);
            let messenger = unsafe {
                loader
                    .create_debug_utils_messenger(&debug_messenger_info, None)
                    .ok()
            };
            (Some(loader), messenger)
        } else {
            (None, None)
        };

        Ok(Instance {
            entry,
            handle,
            debug_utils,
            debug_messenger,
        })
    }

    /// Selects the physical device with the largest primary (device-local)
    /// memory heap, per spec §4.1.
    pub(crate) fn select_physical_device(&self) -> Result<vk::PhysicalDevice> {
        let devices = unsafe {
            self.handle
                .enumerate_physical_devices()
                .map_err(|e| Error::from_vk("enumerate_physical_devices", e))?
        };
        if devices.is_empty() {
            return Err(Error::InitFailed {
                reason: "no Vulkan-capable physical devices found".into(),
            });
        }

        devices
            .into_iter()
            .max_by_key(|&pdev| {
                let props = unsafe { self.handle.get_physical_device_memory_properties(pdev) };
                props.memory_heaps[..props.memory_heap_count as usize]
                    .iter()
                    .filter(|h| h.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
                    .map(|h| h.size)
                    .max()
                    .unwrap_or(0)
            })
            .ok_or_else(|| Error::InitFailed {
                reason: "no Vulkan-capable physical devices found".into(),
            })
    }
}

fn intersect<P>(
    wanted: &[CString],
    available: &[P],
    name_of: impl Fn(&P) -> CString,
) -> (Vec<CString>, Vec<CString>) {
    let available_names: Vec<CString> = available.iter().map(name_of).collect();
    let mut enabled = Vec::new();
    let mut dropped = Vec::new();
    for w in wanted {
        if available_names.iter().any(|a| a == w) {
            enabled.push(w.clone());
        } else {
            dropped.push(w.clone());
        }
    }
    (enabled, dropped)
}

impl Drop for Instance {
    fn drop(&mut self) {
        unsafe {
            if let (Some(loader), Some(messenger)) = (&self.debug_utils, self.debug_messenger) {
                loader.destroy_debug_utils_messenger(messenger, None);
            }
            self.handle.destroy_instance(None);
        }
    }
}
