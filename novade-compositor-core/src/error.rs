use thiserror::Error;

use crate::protocol::{ProtocolError, WindowId};

/// Failures of the display transport.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Display connection is broken")]
    Disconnected,
    #[error("Display connection I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed message on the display connection: {0}")]
    Codec(String),
    #[error("Expected a {expected} reply, got {actual}")]
    UnexpectedReply { expected: &'static str, actual: &'static str },
    #[error("Request failed: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("No request with sequence number {0} is awaiting a reply")]
    UnknownSequence(u64),
}

impl TransportError {
    /// Whether the connection can no longer be used.
    pub fn is_fatal(&self) -> bool {
        matches!(self, TransportError::Disconnected | TransportError::Io(_) | TransportError::Codec(_))
    }

    /// The protocol error carried by a failed reply, if any.
    pub fn protocol_error(&self) -> Option<&ProtocolError> {
        match self {
            TransportError::Protocol(error) => Some(error),
            _ => None,
        }
    }
}

/// Failures reported by a rendering backend.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Rendering backend '{backend}' failed to initialize: {reason}")]
    Initialization { backend: String, reason: String },
    #[error("Rendering backend '{backend}' failed to finish initialization: {reason}")]
    FinalizeInitialization { backend: String, reason: String },
    #[error("Unknown rendering backend '{0}'")]
    Unknown(String),
}

/// Failures reported by a plugin while loading.
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("Plugin '{plugin}' failed to initialize: {reason}")]
    Initialization { plugin: String, reason: String },
    #[error("Unknown plugin '{0}'")]
    Unknown(String),
}

/// Failures of the compositing-manager ownership handshake.
#[derive(Debug, Error)]
pub enum OwnershipError {
    #[error("Another compositing manager is already running (selection owner {owner})")]
    AlreadyRunning { owner: WindowId },
    #[error("Compositing manager selection ownership was not confirmed")]
    NotConfirmed,
    #[error("Ownership handshake step '{step}' called in state {state}")]
    OutOfOrder { step: &'static str, state: String },
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Errors that end the compositing manager.
#[derive(Debug, Error)]
pub enum CompositorError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Ownership(#[from] OwnershipError),
    #[error("Required extension '{0}' is missing or too old")]
    MissingExtension(&'static str),
    #[error("Another compositing manager is already redirecting windows")]
    RedirectionRefused,
    #[error("Protocol error during startup: {0}")]
    Startup(ProtocolError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ErrorCode;

    fn protocol_error() -> ProtocolError {
        ProtocolError {
            sequence: 3,
            code: ErrorCode::Window,
            resource: 0x200,
            request: "GetWindowInfo".to_string(),
        }
    }

    #[test]
    fn test_transport_error_fatality() {
        assert!(TransportError::Disconnected.is_fatal());
        assert!(TransportError::Codec("eof".to_string()).is_fatal());
        assert!(!TransportError::Protocol(protocol_error()).is_fatal());
        assert_eq!(
            TransportError::Protocol(protocol_error()).protocol_error().map(|e| e.code),
            Some(ErrorCode::Window)
        );
    }

    #[test]
    fn test_ownership_error_wraps_into_compositor_error() {
        let err: CompositorError = OwnershipError::AlreadyRunning { owner: WindowId(0x1400001) }.into();
        assert_eq!(
            err.to_string(),
            "Another compositing manager is already running (selection owner 0x01400001)"
        );
    }

    #[test]
    fn test_transport_error_source_chain() {
        let err = OwnershipError::from(TransportError::Disconnected);
        assert_eq!(err.to_string(), "Display connection is broken");
    }
}
