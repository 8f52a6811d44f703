//! Content migration engine.
//!
//! Per attachment: copy the inline bytes to a fresh object, then in one
//! transaction point the metadata at the object and drop the inline row. A
//! failed swap deletes the object again, so the attachment keeps exactly
//! one copy of its content either way.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use lupa_common::Container;
use thiserror::Error;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::attachment::{AttachmentFamily, AttachmentRepository, RepositoryError};
use crate::lock::{run_if_unlocked, DistributedLock, LockError};
use crate::storage::{ObjectStore, StorageError};

/// Migration tick failures. The attachment keeps its inline content in
/// every case and is retried on a later tick.
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Migration lock failed: {0}")]
    Lock(#[from] LockError),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// Copying the content to the object store failed.
    #[error("Failed to upload content of attachment {attachment_id}: {source}")]
    Storage {
        attachment_id: Uuid,
        #[source]
        source: StorageError,
    },

    /// The pointer swap failed after the object was written.
    ///
    /// `compensated` tells whether the object was deleted again; if not, it
    /// is orphaned at `blob_path`.
    #[error("Pointer swap failed for attachment {attachment_id}: {source}")]
    PointerSwap {
        attachment_id: Uuid,
        blob_path: String,
        compensated: bool,
        #[source]
        source: RepositoryError,
    },
}

/// Result of one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Another node holds the family's lock.
    Skipped,
    /// No attachment of the family has inline content left.
    Idle,
    /// One attachment was moved to the object store.
    Migrated { attachment_id: Uuid, blob_path: String },
}

/// Moves one family's inline content to the object store, one row per tick.
pub struct MigrationEngine {
    family: Arc<dyn AttachmentFamily>,
    repository: Arc<dyn AttachmentRepository>,
    store: Arc<dyn ObjectStore>,
    lock: Arc<dyn DistributedLock>,
    lock_ttl: Duration,
}

impl MigrationEngine {
    pub fn new(
        family: Arc<dyn AttachmentFamily>,
        repository: Arc<dyn AttachmentRepository>,
        store: Arc<dyn ObjectStore>,
        lock: Arc<dyn DistributedLock>,
        lock_ttl: Duration,
    ) -> Self {
        Self {
            family,
            repository,
            store,
            lock,
            lock_ttl,
        }
    }

    pub fn family(&self) -> &dyn AttachmentFamily {
        self.family.as_ref()
    }

    /// Migrate at most one attachment while holding the family's lock.
    ///
    /// Returns [`TickOutcome::Skipped`] immediately if the lock is held.
    #[instrument(skip(self), fields(family = self.family.name()))]
    pub async fn tick(&self) -> Result<TickOutcome, MigrationError> {
        run_if_unlocked(
            self.lock.as_ref(),
            self.family.migration_lock(),
            self.lock_ttl,
            self.migrate_one(),
        )
        .await?
        .unwrap_or(Ok(TickOutcome::Skipped))
    }

    async fn migrate_one(&self) -> Result<TickOutcome, MigrationError> {
        let family = self.family.as_ref();

        let remaining = self.repository.count_inline(family).await?;
        info!(family = family.name(), remaining, "Attachments with inline content remaining");

        let Some(inline) = self.repository.pick_inline(family).await? else {
            return Ok(TickOutcome::Idle);
        };
        let attachment_id = inline.metadata.id;
        let container = family.container();
        let blob_path = family.generate_blob_path(inline.metadata.owner_id);

        self.store
            .upload(
                container,
                &blob_path,
                &inline.metadata.file_name,
                &inline.metadata.content_type,
                Bytes::from(inline.content),
            )
            .await
            .map_err(|source| MigrationError::Storage {
                attachment_id,
                source,
            })?;

        if let Err(source) = self
            .repository
            .swap_to_blob(family, attachment_id, &blob_path)
            .await
        {
            let compensated = self.compensate(container, attachment_id, &blob_path).await;
            return Err(MigrationError::PointerSwap {
                attachment_id,
                blob_path,
                compensated,
                source,
            });
        }

        info!(
            family = family.name(),
            %attachment_id,
            %container,
            path = %blob_path,
            "Migrated attachment content to object store"
        );
        Ok(TickOutcome::Migrated {
            attachment_id,
            blob_path,
        })
    }

    /// Delete the object written for a failed swap. Returns whether it is gone.
    async fn compensate(&self, container: Container, attachment_id: Uuid, path: &str) -> bool {
        match self.store.delete(container, path).await {
            Ok(_) => {
                warn!(
                    family = self.family.name(),
                    %attachment_id,
                    %container,
                    path,
                    "Pointer swap failed, uploaded object deleted"
                );
                true
            }
            Err(e) => {
                error!(
                    family = self.family.name(),
                    %attachment_id,
                    %container,
                    path,
                    error = %e,
                    "Pointer swap failed and object could not be deleted, clean up manually"
                );
                false
            }
        }
    }
}
