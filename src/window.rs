//! The window/surface descriptor the core consumes to produce a platform
//! surface (spec §6 "Window descriptor").
//!
//! Modeled on `raw_window_handle::RawWindowHandle`/`RawDisplayHandle` rather
//! than a hand-rolled `{HINSTANCE,HWND}`/`{Display*,Window}` enum — the same
//! idiomatic choice every Vulkan-on-Rust example in the pack makes (see
//! DESIGN.md). The core never dereferences the handles itself; it only hands
//! them to the platform `*SurfaceKHR` extension in `swapchain.rs`.

use raw_window_handle::{RawDisplayHandle, RawWindowHandle};

/// A backend-neutral, platform-tagged window handle pair.
///
/// `raw-window-handle` carries no notion of window size, so the current
/// framebuffer size is passed alongside it: the swapchain needs it whenever
/// the surface itself defers extent to the application (`current_extent ==
/// {u32::MAX, u32::MAX}`, spec §4.6).
#[derive(Copy, Clone, Debug)]
pub struct WindowDescriptor {
    pub window_handle: RawWindowHandle,
    pub display_handle: RawDisplayHandle,
    pub width: u32,
    pub height: u32,
}
