//! Attachment Errors

use thiserror::Error;
use uuid::Uuid;

use super::repository::RepositoryError;
use super::validator::ValidationError;
use crate::scan::ScanError;
use crate::storage::StorageError;

/// Errors surfaced by [`AttachmentService`](super::AttachmentService).
#[derive(Debug, Error)]
pub enum AttachmentError {
    /// The upload failed validation. Never retried.
    #[error("Invalid attachment: {0}")]
    Validation(#[from] ValidationError),

    /// The scan service found malware.
    #[error("Infected file: {file_name}")]
    Infected {
        file_name: String,
        viruses: Vec<String>,
    },

    /// The scan service gave no verdict for a file.
    #[error("No scan verdict for {file_name}")]
    ScanInconclusive { file_name: String },

    /// The scan service could not be used. The upload may be retried.
    #[error("Virus scan failed: {0}")]
    ScanTransport(#[from] ScanError),

    /// No attachment with this id.
    #[error("Attachment not found: {0}")]
    NotFound(Uuid),

    /// The attachment exists but its content does not.
    #[error("Attachment content not found: {0}")]
    ContentNotFound(Uuid),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
}

impl AttachmentError {
    /// Stable failure code for callers.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "INVALID_ATTACHMENT",
            Self::Infected { .. } => "INFECTED_CONTENT",
            Self::ScanInconclusive { .. } => "SCAN_INCONCLUSIVE",
            Self::ScanTransport(_) => "SCAN_FAILED",
            Self::NotFound(_) => "ATTACHMENT_NOT_FOUND",
            Self::ContentNotFound(_) => "CONTENT_NOT_FOUND",
            Self::Storage(_) => "STORAGE_ERROR",
            Self::Repository(_) => "DATABASE_ERROR",
        }
    }
}
