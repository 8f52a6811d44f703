//! Internal HTTP API
//!
//! Health and maintenance endpoints served on the admin listener. Not
//! exposed to end users.

use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use crate::{
    admin, attachment::AttachmentService, config::Config, repair::MetadataRepairScanner,
};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration
    pub config: Arc<Config>,
    /// Blob header repair scanner
    pub repair: Arc<MetadataRepairScanner>,
    /// Project attachment operations
    pub project_attachments: Arc<AttachmentService>,
    /// Application attachment operations
    pub application_attachments: Arc<AttachmentService>,
}

impl AppState {
    pub fn new(
        config: Config,
        repair: MetadataRepairScanner,
        project_attachments: AttachmentService,
        application_attachments: AttachmentService,
    ) -> Self {
        Self {
            config: Arc::new(config),
            repair: Arc::new(repair),
            project_attachments: Arc::new(project_attachments),
            application_attachments: Arc::new(application_attachments),
        }
    }
}

/// Create the admin listener router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest("/admin", admin::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check response.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    /// Service status
    status: &'static str,
    /// Attachment families served
    families: [&'static str; 2],
    /// Families whose content migration is enabled
    migrations: Vec<&'static str>,
    /// Configured migration lock backend
    lock_backend: &'static str,
}

/// Health check endpoint.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let config = &state.config;
    let mut migrations = Vec::new();
    if config.project_migration.enabled {
        migrations.push("project");
    }
    if config.application_migration.enabled {
        migrations.push("application");
    }

    Json(HealthResponse {
        status: "ok",
        families: [
            state.project_attachments.family().name(),
            state.application_attachments.family().name(),
        ],
        migrations,
        lock_backend: config.lock_backend.as_str(),
    })
}
