//! In-memory object store for tests and local development.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use lupa_common::disposition::content_disposition_for;
use lupa_common::Container;

use super::{directory_prefix, ensure_flat, Download, ObjectProperties, ObjectStore, StorageError};

#[derive(Debug, Clone)]
struct StoredObject {
    bytes: Bytes,
    content_type: Option<String>,
    content_disposition: Option<String>,
}

/// Object store kept in a concurrent map.
///
/// [`set_connected(false)`](Self::set_connected) makes every mutating call
/// fail with a transport error; reads keep working.
#[derive(Debug)]
pub struct MemoryObjectStore {
    objects: DashMap<(Container, String), StoredObject>,
    connected: AtomicBool,
}

impl Default for MemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryObjectStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            objects: DashMap::new(),
            connected: AtomicBool::new(true),
        }
    }

    /// Simulate losing (or regaining) the connection to the store.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Store an object with arbitrary headers, bypassing the canonical
    /// content-disposition. Used to seed objects written by older releases.
    pub fn insert_raw(
        &self,
        container: Container,
        path: &str,
        bytes: impl Into<Bytes>,
        content_type: Option<&str>,
        content_disposition: Option<&str>,
    ) {
        self.objects.insert(
            (container, path.to_string()),
            StoredObject {
                bytes: bytes.into(),
                content_type: content_type.map(str::to_string),
                content_disposition: content_disposition.map(str::to_string),
            },
        );
    }

    /// Number of objects in a container.
    #[must_use]
    pub fn count(&self, container: Container) -> usize {
        self.objects.iter().filter(|e| e.key().0 == container).count()
    }

    fn check_connected(&self) -> Result<(), StorageError> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StorageError::Transport("object store disconnected".into()))
        }
    }

    fn keys_under(&self, container: Container, prefix: &str) -> Vec<String> {
        self.objects
            .iter()
            .filter(|e| e.key().0 == container && e.key().1.starts_with(prefix))
            .map(|e| e.key().1.clone())
            .collect()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn upload(
        &self,
        container: Container,
        path: &str,
        file_name: &str,
        content_type: &str,
        bytes: Bytes,
    ) -> Result<(), StorageError> {
        self.check_connected()?;
        self.insert_raw(
            container,
            path,
            bytes,
            Some(content_type),
            Some(&content_disposition_for(file_name)),
        );
        Ok(())
    }

    async fn download(&self, container: Container, path: &str) -> Result<Download, StorageError> {
        let object = self
            .objects
            .get(&(container, path.to_string()))
            .map(|e| e.value().clone())
            .ok_or_else(|| StorageError::NotFound {
                container,
                path: path.to_string(),
            })?;

        Ok(Download {
            content_type: object
                .content_type
                .unwrap_or_else(|| "application/octet-stream".into()),
            content_length: object.bytes.len() as u64,
            bytes: object.bytes,
        })
    }

    async fn delete(&self, container: Container, path: &str) -> Result<bool, StorageError> {
        self.check_connected()?;
        Ok(self.objects.remove(&(container, path.to_string())).is_some())
    }

    async fn delete_all_by_prefix(
        &self,
        container: Container,
        prefix: &str,
    ) -> Result<u64, StorageError> {
        self.check_connected()?;
        let prefix = directory_prefix(prefix);
        let keys = self.keys_under(container, &prefix);
        ensure_flat(container, &prefix, keys.iter().map(String::as_str))?;

        let mut removed = 0;
        for key in keys {
            if self.objects.remove(&(container, key)).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn exists(&self, container: Container, path: &str) -> Result<bool, StorageError> {
        Ok(self.objects.contains_key(&(container, path.to_string())))
    }

    async fn list(&self, container: Container) -> Result<Vec<String>, StorageError> {
        let mut keys = self.keys_under(container, "");
        keys.sort_unstable();
        Ok(keys)
    }

    async fn properties(
        &self,
        container: Container,
        path: &str,
    ) -> Result<ObjectProperties, StorageError> {
        self.objects
            .get(&(container, path.to_string()))
            .map(|e| ObjectProperties {
                content_type: e.content_type.clone(),
                content_disposition: e.content_disposition.clone(),
                content_length: e.bytes.len() as u64,
            })
            .ok_or_else(|| StorageError::NotFound {
                container,
                path: path.to_string(),
            })
    }

    async fn set_headers(
        &self,
        container: Container,
        path: &str,
        content_type: &str,
        content_disposition: &str,
    ) -> Result<(), StorageError> {
        self.check_connected()?;
        let mut object = self
            .objects
            .get_mut(&(container, path.to_string()))
            .ok_or_else(|| StorageError::NotFound {
                container,
                path: path.to_string(),
            })?;
        object.content_type = Some(content_type.to_string());
        object.content_disposition = Some(content_disposition.to_string());
        Ok(())
    }
}
