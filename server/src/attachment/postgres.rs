//! `PostgreSQL` attachment repository.
//!
//! Queries are built per family from the table and column names in
//! [`AttachmentFamily`]; those are static identifiers, never user input.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lupa_common::{AttachmentMetadata, AttachmentType};
use sqlx::{FromRow, PgPool};
use tracing::debug;
use uuid::Uuid;

use super::family::AttachmentFamily;
use super::repository::{
    AttachmentRepository, InlineAttachment, NewAttachment, RepositoryError, StoredContent,
};
use crate::db::db_error;

#[derive(Debug, FromRow)]
struct AttachmentRow {
    id: Uuid,
    file_name: String,
    content_type: String,
    size: i64,
    created_by: String,
    created_at: DateTime<Utc>,
    owner_id: i64,
    blob_location: Option<String>,
    attachment_type: Option<String>,
}

#[derive(Debug, FromRow)]
struct InlineRow {
    #[sqlx(flatten)]
    attachment: AttachmentRow,
    content: Vec<u8>,
}

impl TryFrom<AttachmentRow> for AttachmentMetadata {
    type Error = RepositoryError;

    fn try_from(row: AttachmentRow) -> Result<Self, Self::Error> {
        let attachment_type = row
            .attachment_type
            .as_deref()
            .map(str::parse::<AttachmentType>)
            .transpose()
            .map_err(|e| RepositoryError::InvalidRow(e.to_string()))?;

        Ok(Self {
            id: row.id,
            file_name: row.file_name,
            content_type: row.content_type,
            size: row.size,
            created_by: row.created_by,
            created_at: row.created_at,
            owner_id: row.owner_id,
            blob_location: row.blob_location,
            attachment_type,
        })
    }
}

/// Select list mapping a family's metadata table onto [`AttachmentRow`].
fn columns(family: &dyn AttachmentFamily) -> String {
    let attachment_type = if family.has_attachment_type() {
        "attachment_type"
    } else {
        "NULL::text AS attachment_type"
    };
    format!(
        "id, file_name, content_type, size, created_by, created_at, {} AS owner_id, \
         blob_location, {attachment_type}",
        family.owner_column()
    )
}

/// [`AttachmentRepository`] over the families' `PostgreSQL` tables.
#[derive(Debug, Clone)]
pub struct PgAttachmentRepository {
    pool: PgPool,
}

impl PgAttachmentRepository {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AttachmentRepository for PgAttachmentRepository {
    async fn insert(
        &self,
        family: &dyn AttachmentFamily,
        attachment: NewAttachment,
        content: StoredContent,
    ) -> Result<AttachmentMetadata, RepositoryError> {
        let metadata = AttachmentMetadata {
            id: Uuid::new_v4(),
            file_name: attachment.file_name,
            content_type: attachment.content_type,
            size: attachment.size,
            created_by: attachment.created_by,
            created_at: Utc::now(),
            owner_id: attachment.owner_id,
            blob_location: match &content {
                StoredContent::Blob(path) => Some(path.clone()),
                StoredContent::Inline(_) => None,
            },
            attachment_type: attachment.attachment_type,
        };

        let (type_column, type_param) = if family.has_attachment_type() {
            (", attachment_type", ", $9")
        } else {
            ("", "")
        };
        let query = format!(
            "INSERT INTO {} (id, file_name, content_type, size, created_by, created_at, {}, \
             blob_location{type_column}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8{type_param})",
            family.metadata_table(),
            family.owner_column(),
        );

        let mut tx = self.pool.begin().await?;

        let mut insert = sqlx::query(&query)
            .bind(metadata.id)
            .bind(&metadata.file_name)
            .bind(&metadata.content_type)
            .bind(metadata.size)
            .bind(&metadata.created_by)
            .bind(metadata.created_at)
            .bind(metadata.owner_id)
            .bind(&metadata.blob_location);
        if family.has_attachment_type() {
            insert = insert.bind(metadata.attachment_type.map(AttachmentType::as_str));
        }
        insert
            .execute(&mut *tx)
            .await
            .map_err(db_error!(
                "insert_attachment",
                family = family.name(),
                owner_id = metadata.owner_id
            ))?;

        if let StoredContent::Inline(bytes) = content {
            sqlx::query(&format!(
                "INSERT INTO {} (attachment_id, content) VALUES ($1, $2)",
                family.content_table()
            ))
            .bind(metadata.id)
            .bind(bytes)
            .execute(&mut *tx)
            .await
            .map_err(db_error!(
                "insert_attachment_content",
                family = family.name(),
                attachment_id = %metadata.id
            ))?;
        }

        tx.commit().await?;
        Ok(metadata)
    }

    async fn find(
        &self,
        family: &dyn AttachmentFamily,
        id: Uuid,
    ) -> Result<Option<AttachmentMetadata>, RepositoryError> {
        let row = sqlx::query_as::<_, AttachmentRow>(&format!(
            "SELECT {} FROM {} WHERE id = $1",
            columns(family),
            family.metadata_table()
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error!("find_attachment", family = family.name(), attachment_id = %id))?;

        row.map(AttachmentMetadata::try_from).transpose()
    }

    async fn find_by_owner(
        &self,
        family: &dyn AttachmentFamily,
        owner_id: i64,
    ) -> Result<Vec<AttachmentMetadata>, RepositoryError> {
        let rows = sqlx::query_as::<_, AttachmentRow>(&format!(
            "SELECT {} FROM {} WHERE {} = $1 ORDER BY created_at, id",
            columns(family),
            family.metadata_table(),
            family.owner_column()
        ))
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error!(
            "find_attachments_by_owner",
            family = family.name(),
            owner_id = owner_id
        ))?;

        rows.into_iter().map(AttachmentMetadata::try_from).collect()
    }

    async fn count_by_owner(
        &self,
        family: &dyn AttachmentFamily,
        owner_id: i64,
    ) -> Result<i64, RepositoryError> {
        let count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM {} WHERE {} = $1",
            family.metadata_table(),
            family.owner_column()
        ))
        .bind(owner_id)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error!(
            "count_attachments_by_owner",
            family = family.name(),
            owner_id = owner_id
        ))?;
        Ok(count)
    }

    async fn count_inline(&self, family: &dyn AttachmentFamily) -> Result<i64, RepositoryError> {
        let count: i64 =
            sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", family.content_table()))
                .fetch_one(&self.pool)
                .await
                .map_err(db_error!("count_inline_content", family = family.name()))?;
        Ok(count)
    }

    async fn pick_inline(
        &self,
        family: &dyn AttachmentFamily,
    ) -> Result<Option<InlineAttachment>, RepositoryError> {
        let row = sqlx::query_as::<_, InlineRow>(&format!(
            "SELECT {}, content FROM {} JOIN {} ON attachment_id = id \
             WHERE blob_location IS NULL LIMIT 1",
            columns(family),
            family.metadata_table(),
            family.content_table()
        ))
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error!("pick_inline_content", family = family.name()))?;

        row.map(|row| {
            Ok(InlineAttachment {
                metadata: row.attachment.try_into()?,
                content: row.content,
            })
        })
        .transpose()
    }

    async fn swap_to_blob(
        &self,
        family: &dyn AttachmentFamily,
        id: Uuid,
        blob_path: &str,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(&format!(
            "UPDATE {} SET blob_location = $2 WHERE id = $1 AND blob_location IS NULL",
            family.metadata_table()
        ))
        .bind(id)
        .bind(blob_path)
        .execute(&mut *tx)
        .await
        .map_err(db_error!("set_blob_location", family = family.name(), attachment_id = %id))?
        .rows_affected();

        if updated == 0 {
            // Dropping the transaction rolls it back
            return Err(RepositoryError::NotFound(id));
        }

        sqlx::query(&format!(
            "DELETE FROM {} WHERE attachment_id = $1",
            family.content_table()
        ))
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(db_error!("delete_inline_content", family = family.name(), attachment_id = %id))?;

        tx.commit().await?;
        debug!(
            family = family.name(),
            attachment_id = %id,
            blob_path,
            "Swapped attachment to blob"
        );
        Ok(())
    }

    async fn read_inline(
        &self,
        family: &dyn AttachmentFamily,
        id: Uuid,
    ) -> Result<Option<Vec<u8>>, RepositoryError> {
        let content: Option<Vec<u8>> = sqlx::query_scalar(&format!(
            "SELECT content FROM {} WHERE attachment_id = $1",
            family.content_table()
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error!("read_inline_content", family = family.name(), attachment_id = %id))?;
        Ok(content)
    }

    async fn delete(
        &self,
        family: &dyn AttachmentFamily,
        id: Uuid,
    ) -> Result<bool, RepositoryError> {
        let deleted = sqlx::query(&format!(
            "DELETE FROM {} WHERE id = $1",
            family.metadata_table()
        ))
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(db_error!("delete_attachment", family = family.name(), attachment_id = %id))?
        .rows_affected();
        Ok(deleted > 0)
    }

    async fn delete_by_owner(
        &self,
        family: &dyn AttachmentFamily,
        owner_id: i64,
    ) -> Result<u64, RepositoryError> {
        let deleted = sqlx::query(&format!(
            "DELETE FROM {} WHERE {} = $1",
            family.metadata_table(),
            family.owner_column()
        ))
        .bind(owner_id)
        .execute(&self.pool)
        .await
        .map_err(db_error!(
            "delete_attachments_by_owner",
            family = family.name(),
            owner_id = owner_id
        ))?
        .rows_affected();
        Ok(deleted)
    }
}
