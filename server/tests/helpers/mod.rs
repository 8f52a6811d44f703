//! Reusable test helpers for integration tests.
//!
//! Builds attachment services and migration engines over the in-memory
//! backends, plus scanner and object-store doubles for failure injection.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use lupa_common::Container;
use lupa_server::attachment::{
    AttachmentFamily, AttachmentRepository, AttachmentService, AttachmentValidator,
    MemoryAttachmentRepository, NewAttachment, StoredContent,
};
use lupa_server::lock::MemoryDistributedLock;
use lupa_server::migration::MigrationEngine;
use lupa_server::scan::{FileScanInput, FileScanResult, FileScanner, ScanError, ScanVerdict};
use lupa_server::storage::{
    Download, MemoryObjectStore, ObjectProperties, ObjectStore, StorageError,
};
use tokio::sync::Notify;
use uuid::Uuid;

pub const LOCK_TTL: Duration = Duration::from_secs(60);

/// Scanner that reports the same verdict for every file and counts calls.
pub struct FixedScanner {
    verdict: ScanVerdict,
    calls: AtomicUsize,
}

impl FixedScanner {
    pub fn new(verdict: ScanVerdict) -> Arc<Self> {
        Arc::new(Self {
            verdict,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FileScanner for FixedScanner {
    async fn scan(&self, files: &[FileScanInput]) -> Result<Vec<FileScanResult>, ScanError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(files
            .iter()
            .map(|f| FileScanResult {
                name: f.name.clone(),
                verdict: self.verdict,
                viruses: if self.verdict == ScanVerdict::Infected {
                    vec!["Eicar-Test-Signature".into()]
                } else {
                    Vec::new()
                },
            })
            .collect())
    }
}

/// Object store whose single-object deletes always fail.
pub struct UndeletableStore {
    pub inner: Arc<MemoryObjectStore>,
}

#[async_trait]
impl ObjectStore for UndeletableStore {
    async fn upload(
        &self,
        container: Container,
        path: &str,
        file_name: &str,
        content_type: &str,
        bytes: Bytes,
    ) -> Result<(), StorageError> {
        self.inner
            .upload(container, path, file_name, content_type, bytes)
            .await
    }

    async fn download(&self, container: Container, path: &str) -> Result<Download, StorageError> {
        self.inner.download(container, path).await
    }

    async fn delete(&self, _container: Container, _path: &str) -> Result<bool, StorageError> {
        Err(StorageError::Transport("connection reset".into()))
    }

    async fn delete_all_by_prefix(
        &self,
        container: Container,
        prefix: &str,
    ) -> Result<u64, StorageError> {
        self.inner.delete_all_by_prefix(container, prefix).await
    }

    async fn exists(&self, container: Container, path: &str) -> Result<bool, StorageError> {
        self.inner.exists(container, path).await
    }

    async fn list(&self, container: Container) -> Result<Vec<String>, StorageError> {
        self.inner.list(container).await
    }

    async fn properties(
        &self,
        container: Container,
        path: &str,
    ) -> Result<ObjectProperties, StorageError> {
        self.inner.properties(container, path).await
    }

    async fn set_headers(
        &self,
        container: Container,
        path: &str,
        content_type: &str,
        content_disposition: &str,
    ) -> Result<(), StorageError> {
        self.inner
            .set_headers(container, path, content_type, content_disposition)
            .await
    }
}

/// Object store whose uploads wait for [`GatedStore::release`].
///
/// `entered` is signalled once an upload has started, so a test can act
/// while the caller is parked mid-upload.
pub struct GatedStore {
    pub inner: Arc<MemoryObjectStore>,
    pub entered: Notify,
    release: Notify,
}

impl GatedStore {
    pub fn new(inner: Arc<MemoryObjectStore>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            entered: Notify::new(),
            release: Notify::new(),
        })
    }

    /// Let the parked upload continue.
    pub fn release(&self) {
        self.release.notify_one();
    }
}

#[async_trait]
impl ObjectStore for GatedStore {
    async fn upload(
        &self,
        container: Container,
        path: &str,
        file_name: &str,
        content_type: &str,
        bytes: Bytes,
    ) -> Result<(), StorageError> {
        self.entered.notify_one();
        self.release.notified().await;
        self.inner
            .upload(container, path, file_name, content_type, bytes)
            .await
    }

    async fn download(&self, container: Container, path: &str) -> Result<Download, StorageError> {
        self.inner.download(container, path).await
    }

    async fn delete(&self, container: Container, path: &str) -> Result<bool, StorageError> {
        self.inner.delete(container, path).await
    }

    async fn delete_all_by_prefix(
        &self,
        container: Container,
        prefix: &str,
    ) -> Result<u64, StorageError> {
        self.inner.delete_all_by_prefix(container, prefix).await
    }

    async fn exists(&self, container: Container, path: &str) -> Result<bool, StorageError> {
        self.inner.exists(container, path).await
    }

    async fn list(&self, container: Container) -> Result<Vec<String>, StorageError> {
        self.inner.list(container).await
    }

    async fn properties(
        &self,
        container: Container,
        path: &str,
    ) -> Result<ObjectProperties, StorageError> {
        self.inner.properties(container, path).await
    }

    async fn set_headers(
        &self,
        container: Container,
        path: &str,
        content_type: &str,
        content_disposition: &str,
    ) -> Result<(), StorageError> {
        self.inner
            .set_headers(container, path, content_type, content_disposition)
            .await
    }
}

/// In-memory backends shared by services and engines of one test.
pub struct Backends {
    pub repository: Arc<MemoryAttachmentRepository>,
    pub store: Arc<MemoryObjectStore>,
    pub lock: Arc<MemoryDistributedLock>,
}

impl Backends {
    pub fn new() -> Self {
        Self {
            repository: Arc::new(MemoryAttachmentRepository::new()),
            store: Arc::new(MemoryObjectStore::new()),
            lock: Arc::new(MemoryDistributedLock::new()),
        }
    }

    pub fn service(
        &self,
        family: Arc<dyn AttachmentFamily>,
        scanner: Arc<dyn FileScanner>,
    ) -> AttachmentService {
        self.service_with_limit(family, scanner, 20)
    }

    /// Service allowing at most `max_attachments` attachments per owner.
    pub fn service_with_limit(
        &self,
        family: Arc<dyn AttachmentFamily>,
        scanner: Arc<dyn FileScanner>,
        max_attachments: usize,
    ) -> AttachmentService {
        AttachmentService::new(
            family,
            self.repository.clone(),
            self.store.clone(),
            scanner,
            AttachmentValidator::new(1024 * 1024, max_attachments),
        )
    }

    pub fn engine(&self, family: Arc<dyn AttachmentFamily>) -> MigrationEngine {
        self.engine_with_store(family, self.store.clone())
    }

    pub fn engine_with_store(
        &self,
        family: Arc<dyn AttachmentFamily>,
        store: Arc<dyn ObjectStore>,
    ) -> MigrationEngine {
        MigrationEngine::new(
            family,
            self.repository.clone(),
            store,
            self.lock.clone(),
            LOCK_TTL,
        )
    }

    /// Insert a legacy attachment whose content lives in the database.
    pub async fn insert_inline(
        &self,
        family: &dyn AttachmentFamily,
        owner_id: i64,
        file_name: &str,
        content: &[u8],
    ) -> Uuid {
        let attachment_type = family
            .has_attachment_type()
            .then_some(lupa_common::AttachmentType::Other);
        self.repository
            .insert(
                family,
                NewAttachment {
                    owner_id,
                    file_name: file_name.into(),
                    content_type: "application/pdf".into(),
                    size: content.len() as i64,
                    created_by: "legacy".into(),
                    attachment_type,
                },
                StoredContent::Inline(content.to_vec()),
            )
            .await
            .expect("Failed to insert inline attachment")
            .id
    }
}
