//! Swapchain creation, recreation, and per-frame image acquisition
//! (spec §4.6).
//!
//! The modern `ash` swapchain-creation shape (loaders held alongside the
//! handle, `old_swapchain` passed through on recreate) is grounded on
//! `examples/tfufuz1-NovaDE/novade-vulkan-renderer/src/swapchain.rs`. Surface
//! creation from a `raw-window-handle` descriptor is hand-written per
//! platform the way that same crate hand-writes its Wayland surface
//! creation, since no `ash-window`-equivalent crate is in the dependency
//! stack.

use ash::extensions::khr;
use ash::vk;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};

use crate::error::{Error, Result};
use crate::types::{Format, PresentMode};
use crate::window::WindowDescriptor;

fn create_surface(
    entry: &ash::Entry,
    instance: &ash::Instance,
    window: &WindowDescriptor,
) -> Result<vk::SurfaceKHR> {
    match (window.window_handle, window.display_handle) {
        #[cfg(all(unix, not(target_os = "macos")))]
        (RawWindowHandle::Xlib(window), RawDisplayHandle::Xlib(display)) => {
            let loader = khr::XlibSurface::new(entry, instance);
            let create_info = vk::XlibSurfaceCreateInfoKHR::builder()
                .dpy(display.display as *mut _)
                .window(window.window);
            unsafe {
                loader
                    .create_xlib_surface(&create_info, None)
                    .map_err(|e| Error::from_vk("create_xlib_surface", e))
            }
        }
        #[cfg(windows)]
        (RawWindowHandle::Win32(window), _) => {
            let loader = khr::Win32Surface::new(entry, instance);
            let create_info = vk::Win32SurfaceCreateInfoKHR::builder()
                .hinstance(window.hinstance)
                .hwnd(window.hwnd);
            unsafe {
                loader
                    .create_win32_surface(&create_info, None)
                    .map_err(|e| Error::from_vk("create_win32_surface", e))
            }
        }
        #[cfg(target_os = "macos")]
        (RawWindowHandle::AppKit(window), _) => {
            let loader = ash::extensions::mvk::MacOSSurface::new(entry, instance);
            let create_info = vk::MacOSSurfaceCreateInfoMVK::builder().view(window.ns_view);
            unsafe {
                loader
                    .create_mac_os_surface(&create_info, None)
                    .map_err(|e| Error::from_vk("create_mac_os_surface", e))
            }
        }
        _ => Err(Error::InitFailed {
            reason: "unsupported window handle kind for this platform".into(),
        }),
    }
}

pub struct Swapchain {
    surface: vk::SurfaceKHR,
    surface_loader: khr::Surface,
    swapchain_loader: khr::Swapchain,
    pub(crate) handle: vk::SwapchainKHR,
    pub(crate) format: vk::Format,
    present_mode: vk::PresentModeKHR,
    pub(crate) extent: vk::Extent2D,
    pub(crate) images: Vec<vk::Image>,
    pub(crate) views: Vec<vk::ImageView>,
    pub(crate) image_available_semaphores: Vec<vk::Semaphore>,
    pub(crate) current_image_index: u32,
    /// The window's current framebuffer size, used only when the surface
    /// itself defers extent to the application (spec §4.6).
    requested_extent: vk::Extent2D,
}

impl Swapchain {
    pub(crate) fn new(
        entry: &ash::Entry,
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        device: &ash::Device,
        window: &WindowDescriptor,
        present_mode: PresentMode,
        format: Format,
        max_frames_in_flight: u32,
    ) -> Result<Swapchain> {
        let surface = create_surface(entry, instance, window)?;
        let surface_loader = khr::Surface::new(entry, instance);
        let swapchain_loader = khr::Swapchain::new(instance, device);

        let wanted_format: vk::Format = format.into();
        let supported_formats = unsafe {
            surface_loader
                .get_physical_device_surface_formats(physical_device, surface)
                .map_err(|e| Error::from_vk("get_physical_device_surface_formats", e))?
        };
        if !supported_formats.iter().any(|f| f.format == wanted_format) {
            unsafe { surface_loader.destroy_surface(surface, None) };
            return Err(Error::UnsupportedSurfaceFormat { requested: format });
        }
        let color_space = supported_formats
            .iter()
            .find(|f| f.format == wanted_format)
            .unwrap()
            .color_space;

        let wanted_present_mode: vk::PresentModeKHR = present_mode.into();
        let supported_present_modes = unsafe {
            surface_loader
                .get_physical_device_surface_present_modes(physical_device, surface)
                .map_err(|e| Error::from_vk("get_physical_device_surface_present_modes", e))?
        };
        if !supported_present_modes.contains(&wanted_present_mode) {
            unsafe { surface_loader.destroy_surface(surface, None) };
            return Err(Error::UnsupportedPresentMode);
        }

        let mut swapchain = Swapchain {
            surface,
            surface_loader,
            swapchain_loader,
            handle: vk::SwapchainKHR::null(),
            format: wanted_format,
            present_mode: wanted_present_mode,
            extent: vk::Extent2D { width: 0, height: 0 },
            images: Vec::new(),
            views: Vec::new(),
            image_available_semaphores: Vec::new(),
            current_image_index: 0,
            requested_extent: vk::Extent2D { width: window.width, height: window.height },
        };
        swapchain.recreate(physical_device, device, color_space, max_frames_in_flight, vk::SwapchainKHR::null())?;
        Ok(swapchain)
    }

    fn recreate(
        &mut self,
        physical_device: vk::PhysicalDevice,
        device: &ash::Device,
        color_space: vk::ColorSpaceKHR,
        max_frames_in_flight: u32,
        old_swapchain: vk::SwapchainKHR,
    ) -> Result<()> {
        let capabilities = unsafe {
            self.surface_loader
                .get_physical_device_surface_capabilities(physical_device, self.surface)
                .map_err(|e| Error::from_vk("get_physical_device_surface_capabilities", e))?
        };

        // Clamp to [MAX_FRAMES_IN_FLIGHT, maxImageCount] rather than
        // [minImageCount, MAX_FRAMES_IN_FLIGHT]: the surface's own minimum
        // always wins over our desired frame count, and a missing
        // maxImageCount (0) means "no upper bound" (spec §4.6).
        let image_count = max_frames_in_flight
            .max(capabilities.min_image_count)
            .min(if capabilities.max_image_count == 0 {
                u32::MAX
            } else {
                capabilities.max_image_count
            });

        let extent = if capabilities.current_extent.width != u32::MAX {
            capabilities.current_extent
        } else {
            vk::Extent2D {
                width: self
                    .requested_extent
                    .width
                    .clamp(capabilities.min_image_extent.width, capabilities.max_image_extent.width),
                height: self
                    .requested_extent
                    .height
                    .clamp(capabilities.min_image_extent.height, capabilities.max_image_extent.height),
            }
        };

        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(self.surface)
            .min_image_count(image_count)
            .image_format(self.format)
            .image_color_space(color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(self.present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);

        let handle = unsafe {
            self.swapchain_loader
                .create_swapchain(&create_info, None)
                .map_err(|e| Error::from_vk("create_swapchain", e))?
        };

        if old_swapchain != vk::SwapchainKHR::null() {
            for view in self.views.drain(..) {
                unsafe { device.destroy_image_view(view, None) };
            }
            for semaphore in self.image_available_semaphores.drain(..) {
                unsafe { device.destroy_semaphore(semaphore, None) };
            }
            unsafe { self.swapchain_loader.destroy_swapchain(old_swapchain, None) };
        }

        let images = unsafe {
            self.swapchain_loader
                .get_swapchain_images(handle)
                .map_err(|e| Error::from_vk("get_swapchain_images", e))?
        };

        let mut views = Vec::with_capacity(images.len());
        for &image in &images {
            let view_info = vk::ImageViewCreateInfo::builder()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(self.format)
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                });
            let view = unsafe {
                device
                    .create_image_view(&view_info, None)
                    .map_err(|e| Error::from_vk("create_image_view", e))?
            };
            views.push(view);
        }

        let mut image_available_semaphores = Vec::with_capacity(images.len());
        for _ in &images {
            let semaphore = unsafe {
                device
                    .create_semaphore(&vk::SemaphoreCreateInfo::default(), None)
                    .map_err(|e| Error::from_vk("create_semaphore", e))?
            };
            image_available_semaphores.push(semaphore);
        }

        self.handle = handle;
        self.extent = extent;
        self.images = images;
        self.views = views;
        self.image_available_semaphores = image_available_semaphores;
        self.current_image_index = 0;
        Ok(())
    }

    /// Acquires the next image, recreating the swapchain in place on
    /// `OUT_OF_DATE`/`SUBOPTIMAL` and retrying exactly once (spec §4.6's
    /// acquire table).
    pub(crate) fn acquire(
        &mut self,
        physical_device: vk::PhysicalDevice,
        device: &ash::Device,
        semaphore_index: usize,
        max_frames_in_flight: u32,
    ) -> Result<u32> {
        let color_space = self.surface_color_space(physical_device)?;
        match self.try_acquire(semaphore_index) {
            Ok(index) => Ok(index),
            Err(AcquireOutcome::NeedsRecreate) => {
                unsafe {
                    device
                        .device_wait_idle()
                        .map_err(|e| Error::from_vk("device_wait_idle", e))?;
                }
                let old = self.handle;
                self.recreate(physical_device, device, color_space, max_frames_in_flight, old)?;
                match self.try_acquire(semaphore_index) {
                    Ok(index) => Ok(index),
                    Err(_) => Err(Error::Internal {
                        context: "swapchain acquire failed again immediately after recreate".into(),
                    }),
                }
            }
            Err(AcquireOutcome::Error(e)) => Err(e),
        }
    }

    fn surface_color_space(&self, physical_device: vk::PhysicalDevice) -> Result<vk::ColorSpaceKHR> {
        let formats = unsafe {
            self.surface_loader
                .get_physical_device_surface_formats(physical_device, self.surface)
                .map_err(|e| Error::from_vk("get_physical_device_surface_formats", e))?
        };
        Ok(formats
            .iter()
            .find(|f| f.format == self.format)
            .map(|f| f.color_space)
            .unwrap_or(vk::ColorSpaceKHR::SRGB_NONLINEAR))
    }

    fn try_acquire(&mut self, semaphore_index: usize) -> std::result::Result<u32, AcquireOutcome> {
        let semaphore = self.image_available_semaphores[semaphore_index % self.image_available_semaphores.len()];
        let result = unsafe {
            self.swapchain_loader.acquire_next_image(
                self.handle,
                u64::MAX,
                semaphore,
                vk::Fence::null(),
            )
        };
        match result {
            Ok((index, suboptimal)) => {
                if suboptimal {
                    Err(AcquireOutcome::NeedsRecreate)
                } else {
                    self.current_image_index = index;
                    Ok(index)
                }
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Err(AcquireOutcome::NeedsRecreate),
            Err(vk::Result::TIMEOUT) => Err(AcquireOutcome::Error(Error::AcquireTimeout)),
            Err(other) => Err(AcquireOutcome::Error(Error::from_vk("acquire_next_image", other))),
        }
    }

    /// Presents the current image; returns `true` if the swapchain needs
    /// recreation before the next acquire (spec §4.6/§4.7 Presenting state).
    pub(crate) fn present(
        &mut self,
        queue: vk::Queue,
        wait_semaphore: vk::Semaphore,
    ) -> Result<bool> {
        let swapchains = [self.handle];
        let indices = [self.current_image_index];
        let waits = [wait_semaphore];
        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&waits)
            .swapchains(&swapchains)
            .image_indices(&indices);

        match unsafe { self.swapchain_loader.queue_present(queue, &present_info) } {
            Ok(suboptimal) => Ok(suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(true),
            Err(other) => Err(Error::from_vk("queue_present", other)),
        }
    }

    pub(crate) fn destroy(&mut self, device: &ash::Device) {
        unsafe {
            let _ = device.device_wait_idle();
            for semaphore in self.image_available_semaphores.drain(..) {
                device.destroy_semaphore(semaphore, None);
            }
            for view in self.views.drain(..) {
                device.destroy_image_view(view, None);
            }
            self.swapchain_loader.destroy_swapchain(self.handle, None);
            self.surface_loader.destroy_surface(self.surface, None);
        }
    }
}

enum AcquireOutcome {
    NeedsRecreate,
    Error(Error),
}
