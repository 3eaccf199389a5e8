//! Error types for the ScanLink client.
//!
//! All error categories are unified into a single `SlError` enum with
//! conversions from underlying library errors.

use thiserror::Error;

/// Convenience type alias for Results using SlError.
pub type SlResult<T> = Result<T, SlError>;

/// Unified error type covering all error categories in ScanLink.
#[derive(Error, Debug)]
pub enum SlError {
    // -- Configuration errors --
    /// Failed to load or parse configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// A required configuration value is missing.
    #[error("missing configuration: {0}")]
    MissingConfig(String),

    // -- Transport errors --
    /// The transport could not be opened or failed while open.
    #[error("transport error: {0}")]
    Transport(String),

    /// The WebSocket handshake did not complete in time.
    #[error("connect timeout after {0} ms")]
    ConnectTimeout(u64),

    /// An operation required an open connection.
    #[error("not connected")]
    NotConnected,

    /// The client event loop has stopped.
    #[error("client stopped")]
    ClientStopped,

    // -- Protocol errors --
    /// An inbound frame could not be decoded.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    // -- File/IO errors --
    /// File system operation failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    // -- Notification errors --
    /// Desktop notification failed.
    #[error("notification error: {0}")]
    Notification(String),

    // -- Generic --
    /// Wrapping anyhow errors for interop.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<serde_json::Error> for SlError {
    fn from(e: serde_json::Error) -> Self {
        SlError::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for SlError {
    fn from(e: toml::de::Error) -> Self {
        SlError::Config(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sl_error_display() {
        let err = SlError::Config("bad value".to_string());
        assert_eq!(err.to_string(), "configuration error: bad value");
        assert_eq!(SlError::ConnectTimeout(500).to_string(), "connect timeout after 500 ms");
    }

    #[test]
    fn test_json_error_conversion() {
        let err: SlError = serde_json::from_str::<serde_json::Value>("{").unwrap_err().into();
        assert!(matches!(err, SlError::Serialization(_)));
    }
}
