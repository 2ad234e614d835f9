//! Context configuration.
//!
//! Mirrors the teacher's `cfg.get::<Vec<String>>("gfx.vulkan.instance_extensions")`
//! pattern (`examples/ennis-autograph-ng/src/renderer/backend/vk/instance.rs`):
//! an optional `config::Config` source can seed the validation-layer and
//! instance-extension allow-lists, with [`ContextConfig`]'s own fields taking
//! precedence when set explicitly.

pub const DEFAULT_STAGING_BUFFER_SIZE: u64 = 64 * 1024 * 1024;
pub const FRAMES_IN_FLIGHT: usize = 2;

/// Effectively "wait forever" for `vkWaitForFences` (spec §4.7): the frame
/// scheduler only waits on a fence it itself submitted work against, so a
/// real timeout would only ever fire on a genuine device hang.
pub(crate) const MAX_FENCE_TIMEOUT: u64 = u64::MAX;

pub type LogFn = Box<dyn Fn(&str) + Send + Sync>;

/// Options accepted by [`crate::context::Context::new`].
pub struct ContextConfig {
    pub staging_buffer_size: u64,
    pub warning_fn: Option<LogFn>,
    pub log_fn: Option<LogFn>,
    /// Optional `config::Config` source for `gfx.vulkan.layers` and
    /// `gfx.vulkan.instance_extensions` (both `Vec<String>`). Entries are
    /// intersected with what the driver actually reports as supported; the
    /// difference is logged, never treated as fatal.
    pub config_source: Option<config::Config>,
}

impl Default for ContextConfig {
    fn default() -> Self {
        ContextConfig {
            staging_buffer_size: DEFAULT_STAGING_BUFFER_SIZE,
            warning_fn: None,
            log_fn: None,
            config_source: None,
        }
    }
}

impl ContextConfig {
    pub(crate) fn requested_layers(&self) -> Vec<String> {
        self.config_source
            .as_ref()
            .and_then(|c| c.get::<Vec<String>>("gfx.vulkan.layers").ok())
            .unwrap_or_default()
    }

    pub(crate) fn requested_instance_extensions(&self) -> Vec<String> {
        self.config_source
            .as_ref()
            .and_then(|c| c.get::<Vec<String>>("gfx.vulkan.instance_extensions").ok())
            .unwrap_or_default()
    }

    pub(crate) fn emit_log(&self, message: &str) {
        log::info!("{message}");
        if let Some(f) = &self.log_fn {
            f(message);
        }
    }

    pub(crate) fn emit_warning(&self, message: &str) {
        log::warn!("{message}");
        if let Some(f) = &self.warning_fn {
            f(message);
        }
    }
}
