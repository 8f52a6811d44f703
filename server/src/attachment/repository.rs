//! Attachment Metadata Repository
//!
//! Metadata rows plus the legacy inline content rows of each family.

use async_trait::async_trait;
use lupa_common::{AttachmentMetadata, AttachmentType};
use thiserror::Error;
use uuid::Uuid;

use super::family::AttachmentFamily;

/// Repository errors.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// No row to update, or it was migrated concurrently.
    #[error("Attachment {0} not found or not eligible")]
    NotFound(Uuid),

    /// A stored value could not be mapped to a domain type.
    #[error("Invalid attachment row: {0}")]
    InvalidRow(String),

    /// The backing store could not be reached.
    #[error("Repository unavailable: {0}")]
    Unavailable(String),
}

/// Fields of a new attachment; id and timestamp are assigned on insert.
#[derive(Debug, Clone)]
pub struct NewAttachment {
    pub owner_id: i64,
    pub file_name: String,
    pub content_type: String,
    pub size: i64,
    pub created_by: String,
    pub attachment_type: Option<AttachmentType>,
}

/// Where a new attachment's bytes live.
#[derive(Debug, Clone)]
pub enum StoredContent {
    /// Legacy inline content row.
    Inline(Vec<u8>),
    /// Object-store path.
    Blob(String),
}

/// An attachment still holding inline content.
#[derive(Debug, Clone)]
pub struct InlineAttachment {
    pub metadata: AttachmentMetadata,
    pub content: Vec<u8>,
}

/// Metadata and inline content access for all families.
#[async_trait]
pub trait AttachmentRepository: Send + Sync {
    /// Insert metadata and, for inline content, the content row, atomically.
    async fn insert(
        &self,
        family: &dyn AttachmentFamily,
        attachment: NewAttachment,
        content: StoredContent,
    ) -> Result<AttachmentMetadata, RepositoryError>;

    async fn find(
        &self,
        family: &dyn AttachmentFamily,
        id: Uuid,
    ) -> Result<Option<AttachmentMetadata>, RepositoryError>;

    /// All attachments of an owner, oldest first.
    async fn find_by_owner(
        &self,
        family: &dyn AttachmentFamily,
        owner_id: i64,
    ) -> Result<Vec<AttachmentMetadata>, RepositoryError>;

    /// Number of attachments of an owner.
    async fn count_by_owner(
        &self,
        family: &dyn AttachmentFamily,
        owner_id: i64,
    ) -> Result<i64, RepositoryError>;

    /// Number of attachments still holding inline content.
    async fn count_inline(&self, family: &dyn AttachmentFamily) -> Result<i64, RepositoryError>;

    /// Any one attachment still holding inline content.
    async fn pick_inline(
        &self,
        family: &dyn AttachmentFamily,
    ) -> Result<Option<InlineAttachment>, RepositoryError>;

    /// Point an attachment at `blob_path` and drop its inline content in one
    /// transaction.
    ///
    /// Fails with [`RepositoryError::NotFound`] and changes nothing if the
    /// row is gone or already has a blob location.
    async fn swap_to_blob(
        &self,
        family: &dyn AttachmentFamily,
        id: Uuid,
        blob_path: &str,
    ) -> Result<(), RepositoryError>;

    /// Inline content of an attachment, if it still has any.
    async fn read_inline(
        &self,
        family: &dyn AttachmentFamily,
        id: Uuid,
    ) -> Result<Option<Vec<u8>>, RepositoryError>;

    /// Delete one attachment and its inline content. Returns whether it existed.
    async fn delete(&self, family: &dyn AttachmentFamily, id: Uuid)
        -> Result<bool, RepositoryError>;

    /// Delete every attachment of an owner. Returns how many were removed.
    async fn delete_by_owner(
        &self,
        family: &dyn AttachmentFamily,
        owner_id: i64,
    ) -> Result<u64, RepositoryError>;
}
