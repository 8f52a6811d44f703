//! In-memory attachment repository for tests and local development.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::multiple::RefMulti;
use dashmap::DashMap;
use lupa_common::AttachmentMetadata;
use uuid::Uuid;

use super::family::AttachmentFamily;
use super::repository::{
    AttachmentRepository, InlineAttachment, NewAttachment, RepositoryError, StoredContent,
};

#[derive(Debug, Clone)]
struct Row {
    metadata: AttachmentMetadata,
    inline: Option<Vec<u8>>,
}

/// [`AttachmentRepository`] kept in a concurrent map keyed by family and id.
///
/// Each row holds its metadata and inline content together, so the pointer
/// swap updates both under one entry lock.
#[derive(Debug, Default)]
pub struct MemoryAttachmentRepository {
    rows: DashMap<(&'static str, Uuid), Row>,
    fail_next_swap: AtomicBool,
    fail_next_insert: AtomicBool,
}

impl MemoryAttachmentRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next [`swap_to_blob`](AttachmentRepository::swap_to_blob)
    /// fail without changing anything.
    pub fn fail_next_swap(&self) {
        self.fail_next_swap.store(true, Ordering::SeqCst);
    }

    /// Make the next [`insert`](AttachmentRepository::insert) fail without
    /// storing anything.
    pub fn fail_next_insert(&self) {
        self.fail_next_insert.store(true, Ordering::SeqCst);
    }

    fn rows_of<'a>(
        &'a self,
        family: &'a dyn AttachmentFamily,
    ) -> impl Iterator<Item = RefMulti<'a, (&'static str, Uuid), Row>> + 'a {
        self.rows.iter().filter(move |e| e.key().0 == family.name())
    }
}

#[async_trait]
impl AttachmentRepository for MemoryAttachmentRepository {
    async fn insert(
        &self,
        family: &dyn AttachmentFamily,
        attachment: NewAttachment,
        content: StoredContent,
    ) -> Result<AttachmentMetadata, RepositoryError> {
        if self.fail_next_insert.swap(false, Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable("injected insert failure".into()));
        }

        let (blob_location, inline) = match content {
            StoredContent::Blob(path) => (Some(path), None),
            StoredContent::Inline(bytes) => (None, Some(bytes)),
        };
        let metadata = AttachmentMetadata {
            id: Uuid::new_v4(),
            file_name: attachment.file_name,
            content_type: attachment.content_type,
            size: attachment.size,
            created_by: attachment.created_by,
            created_at: Utc::now(),
            owner_id: attachment.owner_id,
            blob_location,
            attachment_type: attachment.attachment_type,
        };

        self.rows.insert(
            (family.name(), metadata.id),
            Row {
                metadata: metadata.clone(),
                inline,
            },
        );
        Ok(metadata)
    }

    async fn find(
        &self,
        family: &dyn AttachmentFamily,
        id: Uuid,
    ) -> Result<Option<AttachmentMetadata>, RepositoryError> {
        Ok(self
            .rows
            .get(&(family.name(), id))
            .map(|row| row.metadata.clone()))
    }

    async fn find_by_owner(
        &self,
        family: &dyn AttachmentFamily,
        owner_id: i64,
    ) -> Result<Vec<AttachmentMetadata>, RepositoryError> {
        let mut found: Vec<_> = self
            .rows_of(family)
            .filter(|e| e.metadata.owner_id == owner_id)
            .map(|e| e.metadata.clone())
            .collect();
        found.sort_by_key(|m| (m.created_at, m.id));
        Ok(found)
    }

    async fn count_by_owner(
        &self,
        family: &dyn AttachmentFamily,
        owner_id: i64,
    ) -> Result<i64, RepositoryError> {
        Ok(self
            .rows_of(family)
            .filter(|e| e.metadata.owner_id == owner_id)
            .count() as i64)
    }

    async fn count_inline(&self, family: &dyn AttachmentFamily) -> Result<i64, RepositoryError> {
        Ok(self.rows_of(family).filter(|e| e.inline.is_some()).count() as i64)
    }

    async fn pick_inline(
        &self,
        family: &dyn AttachmentFamily,
    ) -> Result<Option<InlineAttachment>, RepositoryError> {
        Ok(self.rows_of(family).find_map(|e| {
            match (&e.metadata.blob_location, &e.inline) {
                (None, Some(content)) => Some(InlineAttachment {
                    metadata: e.metadata.clone(),
                    content: content.clone(),
                }),
                _ => None,
            }
        }))
    }

    async fn swap_to_blob(
        &self,
        family: &dyn AttachmentFamily,
        id: Uuid,
        blob_path: &str,
    ) -> Result<(), RepositoryError> {
        if self.fail_next_swap.swap(false, Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable("injected swap failure".into()));
        }

        let mut row = self
            .rows
            .get_mut(&(family.name(), id))
            .ok_or(RepositoryError::NotFound(id))?;
        if row.metadata.blob_location.is_some() {
            return Err(RepositoryError::NotFound(id));
        }
        row.metadata.blob_location = Some(blob_path.to_string());
        row.inline = None;
        Ok(())
    }

    async fn read_inline(
        &self,
        family: &dyn AttachmentFamily,
        id: Uuid,
    ) -> Result<Option<Vec<u8>>, RepositoryError> {
        Ok(self
            .rows
            .get(&(family.name(), id))
            .and_then(|row| row.inline.clone()))
    }

    async fn delete(
        &self,
        family: &dyn AttachmentFamily,
        id: Uuid,
    ) -> Result<bool, RepositoryError> {
        Ok(self.rows.remove(&(family.name(), id)).is_some())
    }

    async fn delete_by_owner(
        &self,
        family: &dyn AttachmentFamily,
        owner_id: i64,
    ) -> Result<u64, RepositoryError> {
        let mut removed = 0;
        self.rows.retain(|key, row| {
            let matches = key.0 == family.name() && row.metadata.owner_id == owner_id;
            if matches {
                removed += 1;
            }
            !matches
        });
        Ok(removed)
    }
}
