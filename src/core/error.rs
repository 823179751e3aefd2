//! Error types for the Logos test harness.

use thiserror::Error;

/// Result type alias for harness operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while driving the hosting core.
#[derive(Error, Debug)]
pub enum Error {
    // Core library errors
    #[error("Failed to load core library {path}: {reason}")]
    LibraryLoad { path: String, reason: String },

    #[error("Core library is missing symbol {0}")]
    SymbolMissing(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Plugin call errors
    #[error("Plugin {0} is not connected")]
    PluginNotConnected(String),

    #[error("Remote call {plugin}.{method} failed: {message}")]
    RemoteCallFailed {
        plugin: String,
        method: String,
        message: String,
    },

    #[error("Callback for {plugin}.{method} was dropped without a result")]
    CallbackDropped { plugin: String, method: String },

    #[error("Timed out after {millis}ms waiting for {plugin}.{method}")]
    Timeout {
        plugin: String,
        method: String,
        millis: u64,
    },

    // Serialization errors
    #[error("Serialization error: {0}")]
    SerializationError(String),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}

impl From<std::ffi::NulError> for Error {
    fn from(err: std::ffi::NulError) -> Self {
        Error::InvalidArgument(format!(
            "string contains an interior NUL byte at position {}",
            err.nul_position()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;

    #[test]
    fn test_nul_error_conversion() {
        let err: Error = CString::new("bad\0name").unwrap_err().into();
        match err {
            Error::InvalidArgument(msg) => assert!(msg.contains("position 3")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_remote_call_display() {
        let err = Error::RemoteCallFailed {
            plugin: "waku_module".to_string(),
            method: "initWaku".to_string(),
            message: "bad config".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Remote call waku_module.initWaku failed: bad config"
        );
    }
}
