//! Configuration loading.
//!
//! [`ConfigLoader`] reads the TOML document either from an explicit path (the
//! `--config` flag) or from the first existing file of the XDG search list
//! (`$XDG_CONFIG_DIRS/nova-compmgr/config.toml`, then the user config
//! directory). Without any file the defaults are used. Every loaded document
//! goes through [`ConfigLoader::validate_config`].

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::config::CompositorConfig;
use crate::error::{ConfigError, CoreError};
use crate::utils::fs as nova_fs;
use crate::utils::paths::{config_search_paths, get_app_state_dir};

/// Result of a configuration lookup: the validated configuration and the file it
/// came from, if any.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: CompositorConfig,
    pub source: Option<PathBuf>,
}

/// Namespace for configuration loading and validation.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Searches the XDG configuration directories and loads the first file found.
    pub fn load() -> Result<LoadedConfig, CoreError> {
        Self::load_from_locations(&config_search_paths())
    }

    /// Loads the first existing file among `locations`, or the defaults when none
    /// exists. A file that exists but cannot be read or parsed is an error.
    pub fn load_from_locations(locations: &[PathBuf]) -> Result<LoadedConfig, CoreError> {
        for path in locations {
            match fs::read_to_string(path) {
                Ok(content) => {
                    let config = Self::load_from_str(&content)?;
                    return Ok(LoadedConfig {
                        config,
                        source: Some(path.clone()),
                    });
                }
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(CoreError::Config(ConfigError::ReadError {
                        path: path.clone(),
                        source: e,
                    }))
                }
            }
        }
        let mut config = CompositorConfig::default();
        Self::validate_config(&mut config)?;
        Ok(LoadedConfig { config, source: None })
    }

    /// Loads an explicitly requested file. Absence is an error here.
    pub fn load_from_path(path: &Path) -> Result<LoadedConfig, CoreError> {
        let content = fs::read_to_string(path).map_err(|e| {
            CoreError::Config(ConfigError::ReadError {
                path: path.to_path_buf(),
                source: e,
            })
        })?;
        let config = Self::load_from_str(&content)?;
        Ok(LoadedConfig {
            config,
            source: Some(path.to_path_buf()),
        })
    }

    /// Parses and validates a TOML document.
    pub fn load_from_str(content: &str) -> Result<CompositorConfig, CoreError> {
        let mut config: CompositorConfig =
            toml::from_str(content).map_err(|e| CoreError::Config(ConfigError::ParseError(e)))?;
        Self::validate_config(&mut config)?;
        Ok(config)
    }

    /// Validates `config` in place, normalizing case-insensitive values and
    /// resolving a relative log file path against the state directory.
    pub fn validate_config(config: &mut CompositorConfig) -> Result<(), CoreError> {
        let invalid = |msg: String| CoreError::Config(ConfigError::ValidationError(msg));

        config.rendering = config.rendering.trim().to_string();
        if config.rendering.is_empty() {
            return Err(invalid("rendering backend name must not be empty".to_string()));
        }

        let mut seen: Vec<&str> = Vec::with_capacity(config.plugins.len());
        for name in &config.plugins {
            if name.trim().is_empty() {
                return Err(invalid("plugin names must not be empty".to_string()));
            }
            if seen.contains(&name.as_str()) {
                return Err(invalid(format!("plugin '{}' is listed more than once", name)));
            }
            seen.push(name);
        }

        let scheduler = &config.scheduler;
        if scheduler.minimum_repaint_interval_ms == 0 {
            return Err(invalid("minimum_repaint_interval_ms must be greater than zero".to_string()));
        }
        if scheduler.minimum_repaint_interval_ms > scheduler.fallback_refresh_interval_ms {
            return Err(invalid(format!(
                "minimum_repaint_interval_ms ({}) exceeds fallback_refresh_interval_ms ({})",
                scheduler.minimum_repaint_interval_ms, scheduler.fallback_refresh_interval_ms
            )));
        }

        let ratio = config.damage.fully_damaged_ratio;
        if !(ratio > 0.0 && ratio <= 1.0) {
            return Err(invalid(format!(
                "fully_damaged_ratio must be within (0, 1], got {}",
                ratio
            )));
        }

        let level_lower = config.logging.level.to_lowercase();
        match level_lower.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => config.logging.level = level_lower,
            _ => {
                return Err(invalid(format!(
                    "Invalid log level: '{}'. Must be one of trace, debug, info, warn, error.",
                    config.logging.level
                )))
            }
        }

        let format_lower = config.logging.format.to_lowercase();
        match format_lower.as_str() {
            "text" | "json" => config.logging.format = format_lower,
            _ => {
                return Err(invalid(format!(
                    "Invalid log format: '{}'. Must be one of text, json.",
                    config.logging.format
                )))
            }
        }

        if let Some(file_path) = &config.logging.file_path {
            let absolute_path = if file_path.is_absolute() {
                file_path.clone()
            } else {
                get_app_state_dir()?.join(file_path)
            };
            if let Some(parent_dir) = absolute_path.parent() {
                if !parent_dir.exists() {
                    nova_fs::ensure_dir_exists(parent_dir)?;
                }
            }
            config.logging.file_path = Some(absolute_path);
        }

        Ok(())
    }
}
