//! Error types for the window transport

use thiserror::Error;

pub type Result<T> = std::result::Result<T, WindowError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WindowError {
    #[error("Invalid origin: {0}")]
    InvalidOrigin(String),

    /// A child context with neither an opener nor a parent
    #[error("No target window: context has no opener and no parent")]
    NoTarget,

    /// Nothing configured, derivable or owned to post to
    #[error("Unknown peer origin: configure `origins` explicitly")]
    UnknownOrigin,
}
