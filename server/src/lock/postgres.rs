//! `PostgreSQL` row locks in the `distributed_lock` table.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::{DistributedLock, LockError, LockGuard};
use crate::db::db_error;

/// [`DistributedLock`] storing one row per held lock.
///
/// An expired row is taken over in the same statement that inserts a new
/// one, so acquisition is a single round trip. Expiry uses the database
/// clock.
#[derive(Debug, Clone)]
pub struct PostgresDistributedLock {
    pool: PgPool,
}

impl PostgresDistributedLock {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DistributedLock for PostgresDistributedLock {
    async fn try_acquire(
        &self,
        name: &str,
        ttl: Duration,
    ) -> Result<Option<Box<dyn LockGuard>>, LockError> {
        let owner = Uuid::new_v4();

        let result = sqlx::query(
            r"
            INSERT INTO distributed_lock (name, owner, expires_at)
            VALUES ($1, $2, now() + make_interval(secs => $3))
            ON CONFLICT (name) DO UPDATE
                SET owner = EXCLUDED.owner, expires_at = EXCLUDED.expires_at
                WHERE distributed_lock.expires_at <= now()
            ",
        )
        .bind(name)
        .bind(owner)
        .bind(ttl.as_secs_f64())
        .execute(&self.pool)
        .await
        .map_err(db_error!("lock_try_acquire", lock = name))?;

        if result.rows_affected() > 0 {
            Ok(Some(Box::new(PostgresLockGuard {
                pool: self.pool.clone(),
                name: name.to_owned(),
                owner,
            })))
        } else {
            Ok(None)
        }
    }
}

struct PostgresLockGuard {
    pool: PgPool,
    name: String,
    owner: Uuid,
}

#[async_trait]
impl LockGuard for PostgresLockGuard {
    fn name(&self) -> &str {
        &self.name
    }

    async fn release(self: Box<Self>) -> Result<(), LockError> {
        sqlx::query("DELETE FROM distributed_lock WHERE name = $1 AND owner = $2")
            .bind(&self.name)
            .bind(self.owner)
            .execute(&self.pool)
            .await
            .map_err(db_error!("lock_release", lock = %self.name))?;
        Ok(())
    }
}
