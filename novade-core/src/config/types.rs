//! Configuration data structures.
//!
//! [`CompositorConfig`] is the root of the TOML document. Every field carries a
//! `serde` default from [`super::defaults`] and unknown keys are rejected with
//! `#[serde(deny_unknown_fields)]`, so a typo surfaces as a parse error instead
//! of being silently ignored.

use super::defaults;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Logging subsystem settings consumed by [`crate::logging::init_logging`].
///
/// ```
/// use novade_core::config::LoggingConfig;
/// use std::path::PathBuf;
///
/// let log_config: LoggingConfig = toml::from_str(r#"
/// level = "debug"
/// file_path = "/var/log/nova-compmgr.log"
/// format = "json"
/// "#).unwrap();
/// assert_eq!(log_config.level, "debug");
/// assert_eq!(log_config.file_path, Some(PathBuf::from("/var/log/nova-compmgr.log")));
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// One of "trace", "debug", "info", "warn", "error" (case-insensitive).
    #[serde(default = "defaults::default_log_level")]
    pub level: String,
    /// Optional log file. Relative paths are resolved against the state directory.
    #[serde(default = "defaults::default_log_file_path")]
    pub file_path: Option<PathBuf>,
    /// "text" or "json".
    #[serde(default = "defaults::default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        defaults::default_logging_config()
    }
}

/// Repaint scheduler settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchedulerConfig {
    /// Refresh interval used when the display cannot report its refresh rate.
    #[serde(default = "defaults::default_fallback_refresh_interval_ms")]
    pub fallback_refresh_interval_ms: u64,
    /// Lower bound of the adaptive repaint interval.
    #[serde(default = "defaults::default_minimum_repaint_interval_ms")]
    pub minimum_repaint_interval_ms: u64,
}

impl SchedulerConfig {
    pub fn fallback_refresh_interval(&self) -> Duration {
        Duration::from_millis(self.fallback_refresh_interval_ms)
    }

    pub fn minimum_repaint_interval(&self) -> Duration {
        Duration::from_millis(self.minimum_repaint_interval_ms)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        defaults::default_scheduler_config()
    }
}

/// Per-window damage accounting settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DamageConfig {
    /// Cumulative damaged fraction at which a window counts as fully damaged.
    #[serde(default = "defaults::default_fully_damaged_ratio")]
    pub fully_damaged_ratio: f32,
    /// A window that already received more notifications than this in one
    /// cycle counts as fully damaged.
    #[serde(default = "defaults::default_notify_max")]
    pub notify_max: u16,
}

impl Default for DamageConfig {
    fn default() -> Self {
        defaults::default_damage_config()
    }
}

/// Root configuration of the compositing manager.
///
/// ```
/// use novade_core::config::CompositorConfig;
///
/// let config: CompositorConfig = toml::from_str(r#"
/// rendering = "headless"
/// plugins = ["visible"]
///
/// [scheduler]
/// minimum_repaint_interval_ms = 8
/// "#).unwrap();
/// assert_eq!(config.plugins, vec!["visible".to_string()]);
/// assert_eq!(config.scheduler.minimum_repaint_interval_ms, 8);
/// assert_eq!(config.scheduler.fallback_refresh_interval_ms, 20);
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CompositorConfig {
    /// Name of the rendering backend.
    #[serde(default = "defaults::default_rendering")]
    pub rendering: String,
    /// Plugins to load, in dispatch order.
    #[serde(default = "defaults::default_plugins")]
    pub plugins: Vec<String>,
    #[serde(default = "defaults::default_scheduler_config")]
    pub scheduler: SchedulerConfig,
    #[serde(default = "defaults::default_damage_config")]
    pub damage: DamageConfig,
    #[serde(default = "defaults::default_logging_config")]
    pub logging: LoggingConfig,
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self {
            rendering: defaults::default_rendering(),
            plugins: defaults::default_plugins(),
            scheduler: defaults::default_scheduler_config(),
            damage: defaults::default_damage_config(),
            logging: defaults::default_logging_config(),
        }
    }
}
