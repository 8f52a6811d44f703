//! Attachment content migration, end to end over the in-memory backends.
//!
//! Run with: `cargo test --test migration_test`

mod helpers;

use std::sync::Arc;

use helpers::{Backends, FixedScanner, GatedStore, UndeletableStore, LOCK_TTL};
use lupa_common::Container;
use lupa_server::attachment::{
    ApplicationFamily, AttachmentFamily, AttachmentRepository, ProjectFamily, RepositoryError,
};
use lupa_server::lock::DistributedLock;
use lupa_server::migration::{MigrationError, TickOutcome};
use lupa_server::scan::ScanVerdict;
use lupa_server::storage::ObjectStore;

#[tokio::test]
async fn tick_moves_inline_content_to_object_store() {
    let backends = Backends::new();
    let id = backends
        .insert_inline(&ProjectFamily, 42, "plan.pdf", b"%PDF-1.7")
        .await;
    let engine = backends.engine(Arc::new(ProjectFamily));

    let outcome = engine.tick().await.expect("tick failed");
    let TickOutcome::Migrated {
        attachment_id,
        blob_path,
    } = outcome
    else {
        panic!("expected migration, got {outcome:?}");
    };
    assert_eq!(attachment_id, id);
    assert!(blob_path.starts_with("42/"));

    let metadata = backends
        .repository
        .find(&ProjectFamily, id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(metadata.blob_location.as_deref(), Some(blob_path.as_str()));
    assert_eq!(
        backends.repository.read_inline(&ProjectFamily, id).await.unwrap(),
        None
    );

    let download = backends
        .store
        .download(Container::ProjectAttachments, &blob_path)
        .await
        .unwrap();
    assert_eq!(&download.bytes[..], b"%PDF-1.7");
    let props = backends
        .store
        .properties(Container::ProjectAttachments, &blob_path)
        .await
        .unwrap();
    assert_eq!(
        props.content_disposition.as_deref(),
        Some("attachment; filename*=UTF-8''plan.pdf")
    );
}

#[tokio::test]
async fn migrated_content_is_served_from_object_store() {
    let backends = Backends::new();
    let id = backends
        .insert_inline(&ApplicationFamily, 7, "permit.pdf", b"content")
        .await;
    let service = backends.service(
        Arc::new(ApplicationFamily),
        FixedScanner::new(ScanVerdict::Clean),
    );

    // Inline content is readable before migration
    let before = service.get_content(id).await.unwrap();
    assert_eq!(before.bytes, b"content");

    backends
        .engine(Arc::new(ApplicationFamily))
        .tick()
        .await
        .unwrap();

    let after = service.get_content(id).await.unwrap();
    assert_eq!(after.bytes, b"content");
    assert_eq!(after.file_name, "permit.pdf");
    assert_eq!(backends.store.count(Container::ApplicationAttachments), 1);
}

#[tokio::test]
async fn tick_without_inline_content_is_idle() {
    let backends = Backends::new();
    let engine = backends.engine(Arc::new(ProjectFamily));

    assert_eq!(engine.tick().await.unwrap(), TickOutcome::Idle);
    assert_eq!(backends.store.count(Container::ProjectAttachments), 0);
}

#[tokio::test]
async fn families_are_migrated_independently() {
    let backends = Backends::new();
    backends
        .insert_inline(&ApplicationFamily, 1, "a.pdf", b"a")
        .await;

    // The project family has nothing to do even though the other family does
    let project = backends.engine(Arc::new(ProjectFamily));
    assert_eq!(project.tick().await.unwrap(), TickOutcome::Idle);

    let application = backends.engine(Arc::new(ApplicationFamily));
    assert!(matches!(
        application.tick().await.unwrap(),
        TickOutcome::Migrated { .. }
    ));
    assert_eq!(backends.store.count(Container::ApplicationAttachments), 1);
    assert_eq!(backends.store.count(Container::ProjectAttachments), 0);
}

#[tokio::test]
async fn tick_is_skipped_while_lock_is_held_elsewhere() {
    let backends = Backends::new();
    let id = backends
        .insert_inline(&ProjectFamily, 3, "held.pdf", b"x")
        .await;
    let engine = backends.engine(Arc::new(ProjectFamily));

    let guard = backends
        .lock
        .try_acquire(ProjectFamily.migration_lock(), LOCK_TTL)
        .await
        .unwrap()
        .expect("lock should be free");

    assert_eq!(engine.tick().await.unwrap(), TickOutcome::Skipped);
    assert_eq!(backends.store.count(Container::ProjectAttachments), 0);
    assert!(backends
        .repository
        .read_inline(&ProjectFamily, id)
        .await
        .unwrap()
        .is_some());

    guard.release().await.unwrap();
    assert!(matches!(
        engine.tick().await.unwrap(),
        TickOutcome::Migrated { .. }
    ));
}

#[tokio::test]
async fn tick_during_inflight_migration_is_skipped() {
    let backends = Backends::new();
    let id = backends
        .insert_inline(&ProjectFamily, 5, "once.pdf", b"once")
        .await;

    // Two nodes sharing the lock, the repository and the object store.
    // The first one parks inside its upload while holding the lock.
    let gated = GatedStore::new(backends.store.clone());
    let first = Arc::new(backends.engine_with_store(Arc::new(ProjectFamily), gated.clone()));
    let second = backends.engine(Arc::new(ProjectFamily));

    let inflight = tokio::spawn({
        let engine = first.clone();
        async move { engine.tick().await }
    });
    gated.entered.notified().await;

    assert_eq!(second.tick().await.unwrap(), TickOutcome::Skipped);
    assert_eq!(backends.store.count(Container::ProjectAttachments), 0);
    let metadata = backends
        .repository
        .find(&ProjectFamily, id)
        .await
        .unwrap()
        .unwrap();
    assert!(metadata.blob_location.is_none());
    assert!(backends
        .repository
        .read_inline(&ProjectFamily, id)
        .await
        .unwrap()
        .is_some());

    gated.release();
    assert!(matches!(
        inflight.await.unwrap().unwrap(),
        TickOutcome::Migrated { .. }
    ));

    assert_eq!(backends.store.count(Container::ProjectAttachments), 1);
    let metadata = backends
        .repository
        .find(&ProjectFamily, id)
        .await
        .unwrap()
        .unwrap();
    assert!(metadata.blob_location.is_some());

    // Nothing left for the second node
    assert_eq!(second.tick().await.unwrap(), TickOutcome::Idle);
}

#[tokio::test]
async fn failed_swap_is_compensated_and_retried() {
    let backends = Backends::new();
    let id = backends
        .insert_inline(&ProjectFamily, 9, "retry.pdf", b"retry")
        .await;
    let engine = backends.engine(Arc::new(ProjectFamily));

    backends.repository.fail_next_swap();
    let err = engine.tick().await.unwrap_err();
    match err {
        MigrationError::PointerSwap {
            attachment_id,
            compensated,
            ..
        } => {
            assert_eq!(attachment_id, id);
            assert!(compensated);
        }
        other => panic!("expected pointer swap failure, got {other:?}"),
    }

    // Row unchanged, no object left behind
    let metadata = backends
        .repository
        .find(&ProjectFamily, id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(metadata.blob_location, None);
    assert_eq!(
        backends.repository.read_inline(&ProjectFamily, id).await.unwrap(),
        Some(b"retry".to_vec())
    );
    assert_eq!(backends.store.count(Container::ProjectAttachments), 0);

    // Lock was released, so the next tick completes the migration
    assert!(matches!(
        engine.tick().await.unwrap(),
        TickOutcome::Migrated { .. }
    ));
    assert_eq!(backends.store.count(Container::ProjectAttachments), 1);
    assert_eq!(
        backends.repository.read_inline(&ProjectFamily, id).await.unwrap(),
        None
    );
}

#[tokio::test]
async fn orphan_from_failed_compensation_is_removed_with_owner() {
    let backends = Backends::new();
    let id = backends
        .insert_inline(&ProjectFamily, 11, "orphan.pdf", b"orphan")
        .await;
    let undeletable = Arc::new(UndeletableStore {
        inner: backends.store.clone(),
    });
    let engine = backends.engine_with_store(Arc::new(ProjectFamily), undeletable);

    backends.repository.fail_next_swap();
    let err = engine.tick().await.unwrap_err();
    let MigrationError::PointerSwap {
        compensated,
        blob_path: orphan_path,
        source,
        ..
    } = err
    else {
        panic!("expected pointer swap failure");
    };
    assert!(!compensated);
    assert!(matches!(source, RepositoryError::Unavailable(_)));

    // Pointer unset, orphaned object present
    let metadata = backends
        .repository
        .find(&ProjectFamily, id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(metadata.blob_location, None);
    assert!(backends
        .store
        .exists(Container::ProjectAttachments, &orphan_path)
        .await
        .unwrap());

    // A later tick still completes with one live object
    let TickOutcome::Migrated { blob_path, .. } = engine.tick().await.unwrap() else {
        panic!("expected migration");
    };
    assert_ne!(blob_path, orphan_path);
    let metadata = backends
        .repository
        .find(&ProjectFamily, id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(metadata.blob_location.as_deref(), Some(blob_path.as_str()));
    assert_eq!(
        backends.repository.read_inline(&ProjectFamily, id).await.unwrap(),
        None
    );

    // Deleting the owner removes the orphan along with the live object
    let service = backends.service(Arc::new(ProjectFamily), FixedScanner::new(ScanVerdict::Clean));
    assert_eq!(service.delete_all_for_owner(11).await.unwrap(), 1);
    assert_eq!(backends.store.count(Container::ProjectAttachments), 0);
}

#[tokio::test]
async fn storage_failure_leaves_row_inline() {
    let backends = Backends::new();
    let id = backends
        .insert_inline(&ProjectFamily, 13, "down.pdf", b"down")
        .await;
    let engine = backends.engine(Arc::new(ProjectFamily));

    backends.store.set_connected(false);
    let err = engine.tick().await.unwrap_err();
    assert!(matches!(err, MigrationError::Storage { attachment_id, .. } if attachment_id == id));
    assert!(backends
        .repository
        .read_inline(&ProjectFamily, id)
        .await
        .unwrap()
        .is_some());

    backends.store.set_connected(true);
    assert!(matches!(
        engine.tick().await.unwrap(),
        TickOutcome::Migrated { .. }
    ));
}
