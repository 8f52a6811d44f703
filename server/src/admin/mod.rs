//! Maintenance Endpoints
//!
//! Operator-triggered maintenance served on the internal admin listener:
//! - `POST /blob-metadata/fix`: repair content-disposition headers in every
//!   container

use axum::{extract::State, routing::post, Json, Router};
use tracing::info;

use crate::api::AppState;
use crate::repair::RepairReport;

/// Create the maintenance router, nested under `/admin`.
pub fn router() -> Router<AppState> {
    Router::new().route("/blob-metadata/fix", post(fix_blob_metadata))
}

/// Run the blob header repair over all containers.
///
/// Per-object and per-container failures are reported in the counts.
async fn fix_blob_metadata(State(state): State<AppState>) -> Json<RepairReport> {
    info!("Blob metadata repair requested through admin endpoint");
    Json(state.repair.fix_all_blobs().await)
}
