//! Fixed-delay scheduling of migration ticks.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tracing::{debug, error, info};

use super::engine::{MigrationEngine, TickOutcome};
use crate::config::MigrationSettings;

/// Start the background migration task of one family.
///
/// Waits `initial_delay`, then runs a tick and sleeps `interval` after each
/// tick completes. A failed or panicking tick is logged and the schedule
/// continues. Abort the returned handle to stop it.
pub fn spawn_migration_task(
    engine: Arc<MigrationEngine>,
    settings: MigrationSettings,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let family = engine.family().name();
        info!(
            family,
            initial_delay_secs = settings.initial_delay.as_secs(),
            interval_secs = settings.interval.as_secs(),
            "Attachment content migration scheduled"
        );

        tokio::time::sleep(settings.initial_delay).await;
        loop {
            match AssertUnwindSafe(engine.tick()).catch_unwind().await {
                Ok(Ok(TickOutcome::Migrated { .. })) => {}
                Ok(Ok(TickOutcome::Idle)) => debug!(family, "Nothing left to migrate"),
                Ok(Ok(TickOutcome::Skipped)) => debug!(family, "Migration running elsewhere"),
                Ok(Err(e)) => error!(family, error = %e, "Attachment migration tick failed"),
                Err(_) => error!(family, "Attachment migration tick panicked"),
            }
            tokio::time::sleep(settings.interval).await;
        }
    })
}
