//! Error taxonomy for the renderer core.
//!
//! Every fallible public entry point returns [`Result<T>`]. Swapchain
//! `OUT_OF_DATE`/`SUBOPTIMAL` are recovered internally (one idle+recreate+retry)
//! and never reach the caller as an error; everything else is surfaced here.

use crate::types::Format;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("host memory exhausted")]
    OutOfHostMemory,

    #[error("device memory exhausted")]
    OutOfDeviceMemory,

    #[error("device lost")]
    DeviceLost,

    #[error("surface lost, swapchain must be destroyed and recreated")]
    SurfaceLost,

    #[error("timed out waiting for a swapchain image to become ready")]
    AcquireTimeout,

    #[error("surface does not support the requested format {requested:?}")]
    UnsupportedSurfaceFormat { requested: Format },

    #[error("surface does not support the requested present mode")]
    UnsupportedPresentMode,

    #[error("context initialization failed: {reason}")]
    InitFailed { reason: String },

    #[error("internal error: driver returned an unexpected result ({context})")]
    Internal { context: String },
}

impl Error {
    pub(crate) fn from_vk(context: &str, result: ash::vk::Result) -> Error {
        use ash::vk::Result as Vk;
        match result {
            Vk::ERROR_OUT_OF_HOST_MEMORY => Error::OutOfHostMemory,
            Vk::ERROR_OUT_OF_DEVICE_MEMORY => Error::OutOfDeviceMemory,
            Vk::ERROR_DEVICE_LOST => Error::DeviceLost,
            Vk::ERROR_SURFACE_LOST_KHR => Error::SurfaceLost,
            other => Error::Internal {
                context: format!("{context}: {other:?}"),
            },
        }
    }
}
