//! General utilities for NovaDE core.
//!
//! - [`fs`]: directory checks and creation.
//! - [`paths`]: XDG directory resolution and the configuration search list.

pub mod fs;
pub mod paths;

pub use fs::{ensure_dir_exists, require_existing_dir};
