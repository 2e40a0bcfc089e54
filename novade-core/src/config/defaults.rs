//! Default configuration values.
//!
//! Used by `serde`'s `default` attribute on the configuration structures so a
//! missing key or section falls back to the documented value.

use crate::config::{DamageConfig, LoggingConfig, SchedulerConfig};
use std::path::PathBuf;

/// Name of the rendering backend used when `rendering` is not set.
pub const DEFAULT_RENDERING_BACKEND: &str = "headless";

/// 50 Hz, used when the display cannot report its refresh rate.
pub const DEFAULT_REFRESH_INTERVAL_MS: u64 = 20;

/// Floor for the adaptive repaint interval.
pub const MINIMUM_REPAINT_INTERVAL_MS: u64 = 10;

/// Cumulative fraction of a window's area after which it is repainted whole.
pub const WINDOW_FULLY_DAMAGED_RATIO: f32 = 0.9;

/// Damage notifications per paint cycle after which a window is repainted whole.
pub const DAMAGE_NOTIFY_MAX: u16 = 24;

pub(crate) fn default_rendering() -> String {
    DEFAULT_RENDERING_BACKEND.to_string()
}

pub(crate) fn default_plugins() -> Vec<String> {
    Vec::new()
}

pub(crate) fn default_scheduler_config() -> SchedulerConfig {
    SchedulerConfig {
        fallback_refresh_interval_ms: default_fallback_refresh_interval_ms(),
        minimum_repaint_interval_ms: default_minimum_repaint_interval_ms(),
    }
}

pub(crate) fn default_fallback_refresh_interval_ms() -> u64 {
    DEFAULT_REFRESH_INTERVAL_MS
}

pub(crate) fn default_minimum_repaint_interval_ms() -> u64 {
    MINIMUM_REPAINT_INTERVAL_MS
}

pub(crate) fn default_damage_config() -> DamageConfig {
    DamageConfig {
        fully_damaged_ratio: default_fully_damaged_ratio(),
        notify_max: default_notify_max(),
    }
}

pub(crate) fn default_fully_damaged_ratio() -> f32 {
    WINDOW_FULLY_DAMAGED_RATIO
}

pub(crate) fn default_notify_max() -> u16 {
    DAMAGE_NOTIFY_MAX
}

pub(crate) fn default_logging_config() -> LoggingConfig {
    LoggingConfig {
        level: default_log_level(),
        file_path: default_log_file_path(),
        format: default_log_format(),
    }
}

pub(crate) fn default_log_level() -> String {
    "info".to_string()
}

pub(crate) fn default_log_file_path() -> Option<PathBuf> {
    None
}

pub(crate) fn default_log_format() -> String {
    "text".to_string()
}
