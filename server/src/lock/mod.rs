//! Distributed Locking
//!
//! Named, TTL-bounded, non-blocking locks that coordinate background work
//! across every node of a deployment. A guard that is never released (the
//! process crashed) expires after its TTL.

mod memory;
mod postgres;
mod redis;

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use thiserror::Error;
use tracing::{debug, warn};

pub use memory::MemoryDistributedLock;
pub use postgres::PostgresDistributedLock;
pub use redis::RedisDistributedLock;

/// Lock backend errors.
#[derive(Debug, Error)]
pub enum LockError {
    /// The backing store failed.
    #[error("Lock backend failure: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for LockError {
    fn from(e: sqlx::Error) -> Self {
        Self::Backend(e.to_string())
    }
}

impl From<fred::error::Error> for LockError {
    fn from(e: fred::error::Error) -> Self {
        Self::Backend(e.to_string())
    }
}

/// A held lock.
#[async_trait]
pub trait LockGuard: Send + Sync {
    /// Name of the held lock.
    fn name(&self) -> &str;

    /// Release the lock. Releasing a lock that already expired is not an error.
    async fn release(self: Box<Self>) -> Result<(), LockError>;
}

/// Acquires named locks.
#[async_trait]
pub trait DistributedLock: Send + Sync {
    /// Try to take `name` for at most `ttl` without waiting.
    ///
    /// Returns `None` if another owner holds an unexpired lock.
    async fn try_acquire(
        &self,
        name: &str,
        ttl: Duration,
    ) -> Result<Option<Box<dyn LockGuard>>, LockError>;
}

/// Run `task` while holding `name`, or skip it if the lock is taken.
///
/// Returns `Ok(None)` when the lock was unavailable. The lock is released
/// once `task` completes, including when it panics; the panic is then
/// resumed.
pub async fn run_if_unlocked<F>(
    lock: &dyn DistributedLock,
    name: &str,
    ttl: Duration,
    task: F,
) -> Result<Option<F::Output>, LockError>
where
    F: Future + Send,
    F::Output: Send,
{
    let Some(guard) = lock.try_acquire(name, ttl).await? else {
        debug!(lock = name, "Lock held elsewhere, skipping");
        return Ok(None);
    };

    let outcome = AssertUnwindSafe(task).catch_unwind().await;

    if let Err(e) = guard.release().await {
        warn!(lock = name, error = %e, "Failed to release lock, it will expire after its TTL");
    }

    match outcome {
        Ok(output) => Ok(Some(output)),
        Err(panic) => std::panic::resume_unwind(panic),
    }
}
