//! Attachment Types

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;

/// Kind of an application attachment.
///
/// Project attachments carry no type; application attachments always do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttachmentType {
    /// Any supporting document.
    Other,
    /// Traffic arrangement plan.
    TrafficArrangement,
    /// Power of attorney.
    PowerOfAttorney,
}

impl AttachmentType {
    /// All attachment types.
    pub const ALL: [Self; 3] = [
        Self::Other,
        Self::TrafficArrangement,
        Self::PowerOfAttorney,
    ];

    /// Database and wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Other => "OTHER",
            Self::TrafficArrangement => "TRAFFIC_ARRANGEMENT",
            Self::PowerOfAttorney => "POWER_OF_ATTORNEY",
        }
    }

    /// Whether this type only accepts PDF documents.
    #[must_use]
    pub const fn requires_pdf(self) -> bool {
        matches!(self, Self::TrafficArrangement | Self::PowerOfAttorney)
    }
}

impl fmt::Display for AttachmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttachmentType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::UnknownAttachmentType(s.to_string()))
    }
}

/// Attachment metadata as stored in a family's metadata table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentMetadata {
    /// Attachment ID.
    pub id: Uuid,
    /// Sanitized original filename.
    pub file_name: String,
    /// MIME type essence, e.g. `application/pdf`.
    pub content_type: String,
    /// Content size in bytes.
    pub size: i64,
    /// User who uploaded the attachment.
    pub created_by: String,
    /// When the attachment was created.
    pub created_at: DateTime<Utc>,
    /// ID of the owning record.
    pub owner_id: i64,
    /// Object-store key, `None` while the content is still inline.
    pub blob_location: Option<String>,
    /// Attachment type (application attachments only).
    pub attachment_type: Option<AttachmentType>,
}

impl AttachmentMetadata {
    /// Whether the content lives in the object store.
    #[must_use]
    pub const fn is_migrated(&self) -> bool {
        self.blob_location.is_some()
    }
}

/// Attachment content with the headers needed to serve it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentContent {
    /// Original filename.
    pub file_name: String,
    /// MIME type.
    pub content_type: String,
    /// File bytes.
    pub bytes: Vec<u8>,
}
