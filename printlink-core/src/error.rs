//! Error types for printer operations.

use std::time::Duration;

use thiserror::Error;

/// Errors raised by the protocol layer.
///
/// Transport trouble at publish time is reported as a `false` return rather
/// than through this type; the `NotConnected`, `Transport` and `Timeout`
/// variants exist for the transport seam and the facade.
#[derive(Debug, Error)]
pub enum PrinterError {
    /// Strict mode read before any report arrived.
    #[error("printer values not available yet")]
    NotReady,

    /// Transport is down.
    #[error("not connected to the printer")]
    NotConnected,

    /// G-code syntax or parameter out of range.
    #[error("invalid command: {0}")]
    InvalidCommand(String),

    /// Report payload of an unexpected shape.
    #[error("malformed report: {0}")]
    MalformedReport(String),

    /// Snapshot field present but not convertible to the declared type.
    #[error("field `{key}` is not {expected}: {found}")]
    Coercion {
        key: String,
        expected: &'static str,
        found: String,
    },

    /// MQTT client error.
    #[error("transport error: {0}")]
    Transport(String),

    /// Publish was not acknowledged in time.
    #[error("publish not acknowledged after {0:?}")]
    Timeout(Duration),

    /// File transfer collaborator failed or is missing.
    #[error("transfer error: {0}")]
    Transfer(String),

    /// Invalid or unreadable configuration.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PrinterError {
    pub(crate) fn coercion(key: &str, expected: &'static str, found: &serde_json::Value) -> Self {
        Self::Coercion {
            key: key.to_string(),
            expected,
            found: found.to_string(),
        }
    }
}

/// Result type for printer operations.
pub type Result<T> = std::result::Result<T, PrinterError>;
