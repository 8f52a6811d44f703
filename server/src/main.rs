//! Lupa Attachment Server - Main Entry Point
//!
//! Runs the content migration schedulers and the internal admin listener.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use lupa_server::attachment::{
    ApplicationFamily, AttachmentFamily, AttachmentRepository, AttachmentService,
    PgAttachmentRepository, ProjectFamily,
};
use lupa_server::config::{Config, LockBackend, MigrationSettings};
use lupa_server::lock::{
    DistributedLock, MemoryDistributedLock, PostgresDistributedLock, RedisDistributedLock,
};
use lupa_server::migration::{spawn_migration_task, MigrationEngine};
use lupa_server::repair::MetadataRepairScanner;
use lupa_server::storage::{ObjectStore, S3ObjectStore};
use lupa_server::{api, db};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lupa_server=debug,tower_http=debug".into()),
        )
        .json()
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting Lupa attachment server"
    );

    // Initialize database
    let db_pool = db::create_pool(&config.database_url).await?;
    db::run_migrations(&db_pool).await?;

    // Object storage is required; a failed bucket probe is only reported
    let s3 = S3ObjectStore::new(&config)
        .await
        .context("Failed to initialize S3 client")?;
    match s3.health_check().await {
        Ok(()) => info!("Object storage connected"),
        Err(e) => warn!(error = %e, "Object storage health check failed"),
    }
    let store: Arc<dyn ObjectStore> = Arc::new(s3);

    let lock: Arc<dyn DistributedLock> = match config.lock_backend {
        LockBackend::Postgres => Arc::new(PostgresDistributedLock::new(db_pool.clone())),
        LockBackend::Redis => {
            let redis = db::create_redis_client(&config.redis_url).await?;
            Arc::new(RedisDistributedLock::new(redis))
        }
        LockBackend::Memory => {
            warn!("Using process-local migration lock, do not run more than one node");
            Arc::new(MemoryDistributedLock::new())
        }
    };
    info!(backend = config.lock_backend.as_str(), "Migration lock initialized");

    let repository: Arc<dyn AttachmentRepository> =
        Arc::new(PgAttachmentRepository::new(db_pool.clone()));

    let project: Arc<dyn AttachmentFamily> = Arc::new(ProjectFamily);
    let application: Arc<dyn AttachmentFamily> = Arc::new(ApplicationFamily);

    // Attachment services
    let project_attachments =
        AttachmentService::from_config(project.clone(), repository.clone(), store.clone(), &config)
            .context("Failed to initialize project attachment service")?;
    let application_attachments = AttachmentService::from_config(
        application.clone(),
        repository.clone(),
        store.clone(),
        &config,
    )
    .context("Failed to initialize application attachment service")?;
    info!(
        scan_url = %config.clamav_url,
        max_upload_size = config.max_upload_size,
        max_attachments_per_owner = config.max_attachments_per_owner,
        "Attachment services initialized"
    );

    // Content migration schedulers
    let families: [(Arc<dyn AttachmentFamily>, MigrationSettings); 2] = [
        (project, config.project_migration),
        (application, config.application_migration),
    ];
    let mut schedulers = Vec::new();
    for (family, settings) in families {
        if !settings.enabled {
            info!(family = family.name(), "Attachment content migration disabled");
            continue;
        }
        let engine = MigrationEngine::new(
            family,
            repository.clone(),
            store.clone(),
            lock.clone(),
            config.migration_lock_ttl,
        );
        schedulers.push(spawn_migration_task(Arc::new(engine), settings));
    }

    // Header repair on startup
    let repair = MetadataRepairScanner::new(store.clone());
    if config.attachment_name_fix_enabled {
        let report = repair.fix_all_blobs().await;
        info!(
            fixed = report.total.fixed_count,
            errors = report.total.error_count,
            "Startup blob metadata repair finished"
        );
    }

    // Build router
    let bind_address = config.admin_bind_address.clone();
    let state = api::AppState::new(config, repair, project_attachments, application_attachments);
    let app = api::create_router(state);

    // Start admin listener
    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Failed to bind admin listener on {bind_address}"))?;
    info!(address = %bind_address, "Admin listener ready");

    // Graceful shutdown handler
    let shutdown_signal = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
        info!("Received shutdown signal, cleaning up...");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    for handle in schedulers {
        handle.abort();
    }

    info!("Server shutdown complete");

    Ok(())
}
