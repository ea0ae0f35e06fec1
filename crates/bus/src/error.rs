//! Error types for the bus
//!
//! Flat hierarchy. Remote failures arrive as strings because that is
//! all the wire carries.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, BusError>;

/// Boxed error returned by event handlers and typed request handlers
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum BusError {
    /// The remote handler failed, or no handler was registered there
    #[error("{0}")]
    Remote(String),

    #[error("Timeout error for request with name \"{name}\" and timeout {timeout_ms}!")]
    Timeout { name: String, timeout_ms: u64 },

    #[error("Duplicate request handler for \"{0}\"!")]
    DuplicateHandler(String),

    #[error("Bus \"{0}\" was destroyed")]
    Destroyed(String),

    #[error("Bus \"{0}\" was retired by change_adapter")]
    Retired(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Validation failures for inbound wire payloads
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Unknown message type {0}")]
    UnknownType(u64),

    #[error("Missing field `{0}`")]
    MissingField(&'static str),

    #[error("Malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
}
