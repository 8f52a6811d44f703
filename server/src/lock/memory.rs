//! Process-local locks backed by a [`DashMap`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::time::Instant;
use uuid::Uuid;

use super::{DistributedLock, LockError, LockGuard};

#[derive(Debug, Clone)]
struct LockEntry {
    owner: Uuid,
    expires_at: Instant,
}

impl LockEntry {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// In-memory [`DistributedLock`].
///
/// Only coordinates tasks within one process. Expired entries are evicted
/// lazily on the next acquire attempt.
#[derive(Debug, Clone, Default)]
pub struct MemoryDistributedLock {
    locks: Arc<DashMap<String, LockEntry>>,
}

impl MemoryDistributedLock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DistributedLock for MemoryDistributedLock {
    async fn try_acquire(
        &self,
        name: &str,
        ttl: Duration,
    ) -> Result<Option<Box<dyn LockGuard>>, LockError> {
        let key = name.to_owned();
        self.locks.remove_if(&key, |_, entry| entry.is_expired());

        match self.locks.entry(key.clone()) {
            Entry::Occupied(_) => Ok(None),
            Entry::Vacant(vacant) => {
                let owner = Uuid::new_v4();
                vacant.insert(LockEntry {
                    owner,
                    expires_at: Instant::now() + ttl,
                });
                Ok(Some(Box::new(MemoryLockGuard {
                    locks: Arc::clone(&self.locks),
                    name: key,
                    owner,
                })))
            }
        }
    }
}

#[derive(Debug)]
struct MemoryLockGuard {
    locks: Arc<DashMap<String, LockEntry>>,
    name: String,
    owner: Uuid,
}

#[async_trait]
impl LockGuard for MemoryLockGuard {
    fn name(&self) -> &str {
        &self.name
    }

    async fn release(self: Box<Self>) -> Result<(), LockError> {
        self.locks
            .remove_if(&self.name, |_, entry| entry.owner == self.owner);
        Ok(())
    }
}
