//! # NovaDE Core
//!
//! Infrastructure shared by the NovaDE compositing manager crates:
//!
//! - [`error`]: [`CoreError`], [`ConfigError`] and [`LoggingError`].
//! - [`config`]: the TOML configuration schema and its loader.
//! - [`logging`]: `tracing` subscriber setup (console and rolling file output).
//! - [`utils`]: XDG path resolution and filesystem helpers.
//!
//! ```rust,ignore
//! use novade_core::{config::ConfigLoader, logging};
//!
//! let loaded = ConfigLoader::load()?;
//! if logging::init_logging(&loaded.config.logging, false).is_err() {
//!     logging::init_minimal_logging();
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod utils;

pub use config::{CompositorConfig, ConfigLoader, DamageConfig, LoggingConfig, SchedulerConfig};
pub use error::{ConfigError, CoreError, LoggingError};
pub use logging::{init_logging, init_minimal_logging};
