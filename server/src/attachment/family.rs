//! Attachment Families
//!
//! Each owning entity keeps its attachments in its own metadata and content
//! tables and its own object-store container. Everything that differs
//! between families is expressed here, so the service, repositories and
//! migration engine never branch on which family they serve.

use lupa_common::Container;
use uuid::Uuid;

/// Per-family naming and path conventions.
pub trait AttachmentFamily: Send + Sync + 'static {
    /// Short name used in logs and configuration.
    fn name(&self) -> &'static str;

    /// Container that holds this family's objects.
    fn container(&self) -> Container;

    /// Table holding one metadata row per attachment.
    fn metadata_table(&self) -> &'static str;

    /// Table holding legacy inline content, keyed by attachment id.
    fn content_table(&self) -> &'static str;

    /// Column in the metadata table referencing the owning record.
    fn owner_column(&self) -> &'static str;

    /// Whether attachments of this family carry an attachment type.
    fn has_attachment_type(&self) -> bool;

    /// Distributed lock serializing this family's content migration.
    fn migration_lock(&self) -> &'static str;

    /// Object path prefix shared by all attachments of one owner.
    fn owner_prefix(&self, owner_id: i64) -> String {
        owner_id.to_string()
    }

    /// Fresh, unique object path for a new attachment of `owner_id`.
    fn generate_blob_path(&self, owner_id: i64) -> String {
        format!("{}/{}", self.owner_prefix(owner_id), Uuid::new_v4())
    }
}

/// Attachments of projects.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProjectFamily;

impl AttachmentFamily for ProjectFamily {
    fn name(&self) -> &'static str {
        "project"
    }

    fn container(&self) -> Container {
        Container::ProjectAttachments
    }

    fn metadata_table(&self) -> &'static str {
        "project_attachment"
    }

    fn content_table(&self) -> &'static str {
        "project_attachment_content"
    }

    fn owner_column(&self) -> &'static str {
        "project_id"
    }

    fn has_attachment_type(&self) -> bool {
        false
    }

    fn migration_lock(&self) -> &'static str {
        "project-attachment-content-migration"
    }
}

/// Attachments of permit applications.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApplicationFamily;

impl AttachmentFamily for ApplicationFamily {
    fn name(&self) -> &'static str {
        "application"
    }

    fn container(&self) -> Container {
        Container::ApplicationAttachments
    }

    fn metadata_table(&self) -> &'static str {
        "application_attachment"
    }

    fn content_table(&self) -> &'static str {
        "application_attachment_content"
    }

    fn owner_column(&self) -> &'static str {
        "application_id"
    }

    fn has_attachment_type(&self) -> bool {
        true
    }

    fn migration_lock(&self) -> &'static str {
        "application-attachment-content-migration"
    }
}
