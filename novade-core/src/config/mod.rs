//! Configuration management.
//!
//! - [`types`]: the TOML schema ([`CompositorConfig`] and its sections).
//! - [`defaults`]: default values referenced by `#[serde(default = ...)]`.
//! - [`loader`]: [`ConfigLoader`], which locates, parses and validates the file.
//!
//! ```rust,ignore
//! use novade_core::config::ConfigLoader;
//!
//! match ConfigLoader::load() {
//!     Ok(loaded) => println!("backend: {}", loaded.config.rendering),
//!     Err(e) => eprintln!("Failed to load configuration: {}", e),
//! }
//! ```

pub mod defaults;
pub mod loader;
pub mod types;

pub use loader::{ConfigLoader, LoadedConfig};
pub use types::{CompositorConfig, DamageConfig, LoggingConfig, SchedulerConfig};
