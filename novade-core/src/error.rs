//! Error handling for the NovaDE core layer.
//!
//! The main error type for this crate is [`CoreError`], which wraps the more
//! specific [`ConfigError`] and [`LoggingError`]. The compositing-manager
//! binary maps every `CoreError` surfacing during startup to a diagnostic and
//! a failure exit status.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Core error type for the NovaDE infrastructure layer.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Errors related to configuration loading, parsing, or validation.
    #[error("Configuration Error: {0}")]
    Config(#[from] ConfigError),

    /// Errors raised while installing the global `tracing` subscriber.
    #[error("Logging Error: {0}")]
    Logging(#[from] LoggingError),

    /// Filesystem operations (creating directories, reading files) that failed
    /// outside of configuration loading.
    #[error("Filesystem Error: {message} (Path: {path:?})")]
    Filesystem {
        message: String,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// General I/O errors not covered by other specific variants.
    #[error("I/O Error: {0}")]
    Io(#[from] io::Error),

    /// Invalid input provided to a function, e.g. an empty search path.
    #[error("Invalid Input: {0}")]
    InvalidInput(String),
}

/// Error type for configuration-related operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("Failed to read configuration file from {path:?}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The configuration file is not valid TOML or does not match the schema.
    #[error("Failed to parse configuration file: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Parsed values are out of range or inconsistent.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),

    /// No configuration file exists at any of the searched locations.
    #[error("Configuration file not found at expected locations: {locations:?}")]
    NotFound { locations: Vec<PathBuf> },

    /// A required base directory (XDG config/state home) could not be determined.
    #[error("Could not determine base directory for {dir_type}")]
    DirectoryUnavailable { dir_type: String },
}

/// Error type for logging initialization.
#[derive(Debug, Error)]
pub enum LoggingError {
    /// The subscriber could not be installed or the configuration is unusable.
    #[error("Failed to initialize logging: {0}")]
    InitializationFailure(String),

    /// A log filter directive could not be parsed.
    #[error("Failed to set log filter: {0}")]
    FilterError(String),

    /// Writing to a log sink failed.
    #[error("Logging I/O error: {0}")]
    IoError(#[from] io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::error::Error;
    use std::io::{Error as IoError, ErrorKind};

    #[test]
    fn test_core_error_config_variant() {
        let core_err = CoreError::Config(ConfigError::ValidationError("empty backend".to_string()));

        assert_eq!(
            format!("{}", core_err),
            "Configuration Error: Configuration validation failed: empty backend"
        );
        match core_err.source().and_then(|s| s.downcast_ref::<ConfigError>()) {
            Some(ConfigError::ValidationError(msg)) => assert_eq!(msg, "empty backend"),
            other => panic!("Incorrect source for CoreError::Config: {:?}", other),
        }
    }

    #[test]
    fn test_core_error_logging_variant_wraps_source() {
        let core_err: CoreError = LoggingError::InitializationFailure("already set".to_string()).into();
        assert_eq!(
            format!("{}", core_err),
            "Logging Error: Failed to initialize logging: already set"
        );
        assert!(core_err.source().is_some());
    }

    #[test]
    fn test_core_error_filesystem_variant() {
        let path = PathBuf::from("/tmp/nova-compmgr/state");
        let core_err = CoreError::Filesystem {
            message: "Failed to create directory".to_string(),
            path: path.clone(),
            source: IoError::new(ErrorKind::PermissionDenied, "denied"),
        };

        assert_eq!(
            format!("{}", core_err),
            format!("Filesystem Error: Failed to create directory (Path: {:?})", path)
        );
        let source = core_err.source().and_then(|s| s.downcast_ref::<IoError>());
        assert_eq!(source.map(|e| e.kind()), Some(ErrorKind::PermissionDenied));
    }

    #[test]
    fn test_config_error_read_error_keeps_path_and_source() {
        let path = PathBuf::from("/etc/xdg/nova-compmgr/config.toml");
        let config_err = ConfigError::ReadError {
            path: path.clone(),
            source: IoError::new(ErrorKind::NotFound, "missing"),
        };

        assert_eq!(
            format!("{}", config_err),
            format!("Failed to read configuration file from {:?}", path)
        );
        assert!(config_err.source().is_some());
    }

    #[test]
    fn test_config_error_parse_error_from_toml() {
        let toml_err = toml::from_str::<toml::Value>("rendering = ").unwrap_err();
        let config_err: ConfigError = toml_err.into();
        assert!(format!("{}", config_err).starts_with("Failed to parse configuration file:"));
    }

    #[test]
    fn test_config_error_not_found_lists_locations() {
        let config_err = ConfigError::NotFound {
            locations: vec![PathBuf::from("/etc/xdg/a.toml"), PathBuf::from("/home/u/.config/a.toml")],
        };
        let rendered = format!("{}", config_err);
        assert!(rendered.contains("/etc/xdg/a.toml"));
        assert!(rendered.contains("/home/u/.config/a.toml"));
    }

    #[test]
    fn test_logging_error_io_from() {
        let logging_err: LoggingError = IoError::new(ErrorKind::BrokenPipe, "pipe closed").into();
        assert_eq!(format!("{}", logging_err), "Logging I/O error: pipe closed");
    }
}
