//! Common Error Types

use thiserror::Error;

/// Errors raised while parsing shared types from their string forms.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// Unknown attachment type name.
    #[error("Unknown attachment type: {0}")]
    UnknownAttachmentType(String),

    /// Unknown container name.
    #[error("Unknown container: {0}")]
    UnknownContainer(String),
}

/// Result alias for common operations.
pub type Result<T> = std::result::Result<T, Error>;
