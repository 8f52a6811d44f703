//! Attachment Service
//!
//! Upload, download and delete for one attachment family. Uploads run
//! validate, count check, scan, store and persist strictly in that order,
//! so a rejected file never reaches the scan service or the object store.

use std::sync::Arc;

use lupa_common::{AttachmentContent, AttachmentMetadata, AttachmentType};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use super::error::AttachmentError;
use super::family::AttachmentFamily;
use super::repository::{AttachmentRepository, NewAttachment, StoredContent};
use super::scan_pipeline::ensure_clean;
use super::validator::{validate_for_type, AttachmentValidator, UploadFile, ValidationError};
use crate::config::Config;
use crate::scan::{FileScanInput, FileScanner, ScanClient, ScanError};
use crate::storage::ObjectStore;

/// Attachment operations of one family.
#[derive(Clone)]
pub struct AttachmentService {
    family: Arc<dyn AttachmentFamily>,
    repository: Arc<dyn AttachmentRepository>,
    store: Arc<dyn ObjectStore>,
    scanner: Arc<dyn FileScanner>,
    validator: AttachmentValidator,
}

impl AttachmentService {
    pub fn new(
        family: Arc<dyn AttachmentFamily>,
        repository: Arc<dyn AttachmentRepository>,
        store: Arc<dyn ObjectStore>,
        scanner: Arc<dyn FileScanner>,
        validator: AttachmentValidator,
    ) -> Self {
        Self {
            family,
            repository,
            store,
            scanner,
            validator,
        }
    }

    /// Service wired to the scan service and upload limits of `config`.
    pub fn from_config(
        family: Arc<dyn AttachmentFamily>,
        repository: Arc<dyn AttachmentRepository>,
        store: Arc<dyn ObjectStore>,
        config: &Config,
    ) -> Result<Self, ScanError> {
        let scanner = ScanClient::new(&config.clamav_url, config.scan_timeout)?;
        let validator =
            AttachmentValidator::new(config.max_upload_size, config.max_attachments_per_owner);
        Ok(Self::new(family, repository, store, Arc::new(scanner), validator))
    }

    /// Family served by this service.
    pub fn family(&self) -> &dyn AttachmentFamily {
        self.family.as_ref()
    }

    /// Validate, scan and store a new attachment of `owner_id`.
    ///
    /// If the metadata write fails, the uploaded object is deleted again.
    #[instrument(
        skip(self, file),
        fields(family = self.family.name(), file_name = %file.file_name)
    )]
    pub async fn add_attachment(
        &self,
        owner_id: i64,
        file: UploadFile,
        attachment_type: Option<AttachmentType>,
        created_by: &str,
    ) -> Result<AttachmentMetadata, AttachmentError> {
        match (self.family.has_attachment_type(), attachment_type) {
            (true, None) => return Err(ValidationError::MissingAttachmentType.into()),
            (false, Some(_)) => return Err(ValidationError::UnexpectedAttachmentType.into()),
            _ => {}
        }

        let file = self.validator.validate(&file)?;
        if let Some(attachment_type) = attachment_type {
            validate_for_type(&file.file_name, attachment_type)?;
        }

        let existing = self
            .repository
            .count_by_owner(self.family.as_ref(), owner_id)
            .await?;
        if let Err(e) = self.validator.check_count(existing) {
            warn!(owner_id, existing, "Attachment limit reached");
            return Err(e.into());
        }

        ensure_clean(
            self.scanner.as_ref(),
            &[FileScanInput {
                name: file.file_name.clone(),
                bytes: file.bytes.clone(),
            }],
        )
        .await?;

        let container = self.family.container();
        let blob_path = self.family.generate_blob_path(owner_id);
        self.store
            .upload(
                container,
                &blob_path,
                &file.file_name,
                &file.content_type,
                file.bytes.clone(),
            )
            .await?;

        let new_attachment = NewAttachment {
            owner_id,
            file_name: file.file_name.clone(),
            content_type: file.content_type.clone(),
            size: file.size() as i64,
            created_by: created_by.to_string(),
            attachment_type,
        };

        match self
            .repository
            .insert(
                self.family.as_ref(),
                new_attachment,
                StoredContent::Blob(blob_path.clone()),
            )
            .await
        {
            Ok(metadata) => {
                info!(
                    attachment_id = %metadata.id,
                    owner_id,
                    %container,
                    path = %blob_path,
                    size = metadata.size,
                    "Attachment added"
                );
                Ok(metadata)
            }
            Err(e) => {
                if let Err(cleanup) = self.store.delete(container, &blob_path).await {
                    error!(
                        %container,
                        path = %blob_path,
                        error = %cleanup,
                        "Failed to delete object after metadata write failed, object is orphaned"
                    );
                }
                Err(e.into())
            }
        }
    }

    /// Content of an attachment, from the object store or inline storage.
    #[instrument(skip(self), fields(family = self.family.name()))]
    pub async fn get_content(&self, id: Uuid) -> Result<AttachmentContent, AttachmentError> {
        let metadata = self.find(id).await?;

        let bytes = match &metadata.blob_location {
            Some(path) => match self.store.download(self.family.container(), path).await {
                Ok(download) => download.bytes.to_vec(),
                Err(e) if e.is_not_found() => {
                    warn!(attachment_id = %id, path = %path, "Attachment object missing");
                    return Err(AttachmentError::ContentNotFound(id));
                }
                Err(e) => return Err(e.into()),
            },
            None => self
                .repository
                .read_inline(self.family.as_ref(), id)
                .await?
                .ok_or(AttachmentError::ContentNotFound(id))?,
        };

        Ok(AttachmentContent {
            file_name: metadata.file_name,
            content_type: metadata.content_type,
            bytes,
        })
    }

    /// Metadata of every attachment of an owner.
    pub async fn list_metadata(
        &self,
        owner_id: i64,
    ) -> Result<Vec<AttachmentMetadata>, AttachmentError> {
        Ok(self
            .repository
            .find_by_owner(self.family.as_ref(), owner_id)
            .await?)
    }

    /// Delete one attachment and its content.
    ///
    /// The object goes first; a retry after a failed metadata delete finds
    /// the object already gone, which is not an error.
    #[instrument(skip(self), fields(family = self.family.name()))]
    pub async fn delete_attachment(&self, id: Uuid) -> Result<(), AttachmentError> {
        let metadata = self.find(id).await?;

        if let Some(path) = &metadata.blob_location {
            let removed = self.store.delete(self.family.container(), path).await?;
            if !removed {
                warn!(attachment_id = %id, path = %path, "Attachment object was already missing");
            }
        }
        self.repository.delete(self.family.as_ref(), id).await?;

        info!(attachment_id = %id, owner_id = metadata.owner_id, "Attachment deleted");
        Ok(())
    }

    /// Delete every attachment of an owner, including objects left behind
    /// by interrupted migrations under the owner's prefix.
    #[instrument(skip(self), fields(family = self.family.name()))]
    pub async fn delete_all_for_owner(&self, owner_id: i64) -> Result<u64, AttachmentError> {
        let objects = self
            .store
            .delete_all_by_prefix(self.family.container(), &self.family.owner_prefix(owner_id))
            .await?;
        let rows = self
            .repository
            .delete_by_owner(self.family.as_ref(), owner_id)
            .await?;

        info!(owner_id, objects, rows, "Deleted all attachments of owner");
        Ok(rows)
    }

    async fn find(&self, id: Uuid) -> Result<AttachmentMetadata, AttachmentError> {
        self.repository
            .find(self.family.as_ref(), id)
            .await?
            .ok_or(AttachmentError::NotFound(id))
    }
}
