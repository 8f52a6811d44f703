//! Object Storage
//!
//! Uniform access to durable object storage, addressed by logical
//! [`Container`] and object path. Every uploaded object carries its
//! content-type and a canonical content-disposition header naming the
//! original file.

mod memory;
mod s3;

use async_trait::async_trait;
use bytes::Bytes;
use lupa_common::Container;
use thiserror::Error;

pub use memory::MemoryObjectStore;
pub use s3::S3ObjectStore;

/// Object storage errors.
#[derive(Debug, Error)]
pub enum StorageError {
    /// No object at the given path.
    #[error("Object not found: {container}/{path}")]
    NotFound { container: Container, path: String },

    /// A prefix delete found a nested directory under the owner prefix.
    #[error("Unexpected subdirectory under {container}/{prefix}: {path}")]
    UnexpectedSubdirectory {
        container: Container,
        prefix: String,
        path: String,
    },

    /// Request failed or timed out.
    #[error("Object store request failed: {0}")]
    Transport(String),

    /// Store is misconfigured or a container is not accessible.
    #[error("Object store configuration error: {0}")]
    Config(String),
}

impl StorageError {
    /// Whether this error means the object does not exist.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Downloaded object content.
#[derive(Debug, Clone)]
pub struct Download {
    /// Stored content-type, `application/octet-stream` when unset.
    pub content_type: String,
    /// Content length in bytes.
    pub content_length: u64,
    /// Object bytes.
    pub bytes: Bytes,
}

/// Stored object headers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectProperties {
    pub content_type: Option<String>,
    pub content_disposition: Option<String>,
    pub content_length: u64,
}

/// Durable object storage.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Create or overwrite an object, setting its content-type and a
    /// canonical content-disposition for `file_name`.
    async fn upload(
        &self,
        container: Container,
        path: &str,
        file_name: &str,
        content_type: &str,
        bytes: Bytes,
    ) -> Result<(), StorageError>;

    /// Fetch an object.
    async fn download(&self, container: Container, path: &str) -> Result<Download, StorageError>;

    /// Remove an object. Returns whether it existed.
    async fn delete(&self, container: Container, path: &str) -> Result<bool, StorageError>;

    /// Remove every object directly under `prefix`. Returns how many were removed.
    ///
    /// Fails without deleting anything if a nested directory is found under
    /// the prefix.
    async fn delete_all_by_prefix(
        &self,
        container: Container,
        prefix: &str,
    ) -> Result<u64, StorageError>;

    /// Whether an object exists.
    async fn exists(&self, container: Container, path: &str) -> Result<bool, StorageError>;

    /// Every object path in a container.
    async fn list(&self, container: Container) -> Result<Vec<String>, StorageError>;

    /// Stored headers of an object.
    async fn properties(
        &self,
        container: Container,
        path: &str,
    ) -> Result<ObjectProperties, StorageError>;

    /// Replace the headers of an object without touching its content.
    async fn set_headers(
        &self,
        container: Container,
        path: &str,
        content_type: &str,
        content_disposition: &str,
    ) -> Result<(), StorageError>;
}

/// Normalize an owner prefix to end with exactly one `/`.
pub(crate) fn directory_prefix(prefix: &str) -> String {
    format!("{}/", prefix.trim_end_matches('/'))
}

/// Check that every key under `prefix` is a direct child.
pub(crate) fn ensure_flat<'a>(
    container: Container,
    prefix: &str,
    keys: impl IntoIterator<Item = &'a str>,
) -> Result<(), StorageError> {
    for key in keys {
        let rest = key.strip_prefix(prefix).unwrap_or(key);
        if rest.contains('/') {
            return Err(StorageError::UnexpectedSubdirectory {
                container,
                prefix: prefix.to_string(),
                path: key.to_string(),
            });
        }
    }
    Ok(())
}
