//! Attachment Content Migration
//!
//! Background move of legacy inline attachment content into the object
//! store, one family at a time under a fleet-wide lock.

mod engine;
mod scheduler;

pub use engine::{MigrationEngine, MigrationError, TickOutcome};
pub use scheduler::spawn_migration_task;
