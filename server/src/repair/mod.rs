//! Blob Header Repair
//!
//! One-shot pass over every container that rewrites content-disposition
//! headers written by older releases into the canonical RFC 5987 form.
//! Content is never re-uploaded, and a header is only rewritten when the
//! original filename can be recovered from it. Running the pass again over
//! unchanged containers fixes nothing.

use std::sync::Arc;

use lupa_common::disposition::{content_disposition_for, extract_original_filename, needs_fixing};
use lupa_common::{BlobFixResult, Container};
use serde::Serialize;
use tracing::{error, info, instrument, warn};

use crate::storage::{ObjectStore, StorageError};

/// Result for one container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerFixResult {
    pub container: Container,
    #[serde(flatten)]
    pub result: BlobFixResult,
}

/// Results of a full repair run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairReport {
    pub containers: Vec<ContainerFixResult>,
    pub total: BlobFixResult,
}

enum BlobOutcome {
    Compliant,
    Fixed,
    MissingHeader,
}

/// Repairs content-disposition headers in the object store.
pub struct MetadataRepairScanner {
    store: Arc<dyn ObjectStore>,
}

impl MetadataRepairScanner {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Repair every container.
    ///
    /// A container that cannot be listed is logged and counted as one error;
    /// the remaining containers are still processed.
    pub async fn fix_all_blobs(&self) -> RepairReport {
        info!("Starting blob metadata repair for all containers");

        let mut containers = Vec::with_capacity(Container::ALL.len());
        for container in Container::ALL {
            let result = match self.fix_blobs_in_container(container).await {
                Ok(result) => result,
                Err(e) => {
                    error!(%container, error = %e, "Could not list container for repair");
                    BlobFixResult {
                        error_count: 1,
                        ..BlobFixResult::default()
                    }
                }
            };
            containers.push(ContainerFixResult { container, result });
        }

        let total = containers.iter().map(|c| c.result).sum::<BlobFixResult>();
        info!(
            scanned = total.scanned_count,
            fixed = total.fixed_count,
            warnings = total.warning_count,
            errors = total.error_count,
            "Blob metadata repair completed"
        );
        if total.error_count > 0 {
            error!(
                errors = total.error_count,
                "Blob metadata repair completed with errors, check logs for details"
            );
        }

        RepairReport { containers, total }
    }

    /// Repair every object in one container.
    ///
    /// Fails only if the container cannot be listed; per-object failures
    /// are counted in the result.
    #[instrument(skip(self))]
    pub async fn fix_blobs_in_container(
        &self,
        container: Container,
    ) -> Result<BlobFixResult, StorageError> {
        let paths = self.store.list(container).await?;
        let mut result = BlobFixResult::default();

        for path in &paths {
            result.scanned_count += 1;
            match self.fix_blob(container, path).await {
                Ok(BlobOutcome::Compliant) => {}
                Ok(BlobOutcome::Fixed) => result.fixed_count += 1,
                Ok(BlobOutcome::MissingHeader) => result.warning_count += 1,
                Err(e) => {
                    error!(%container, path = %path, error = %e, "Failed to repair blob headers");
                    result.error_count += 1;
                }
            }
        }

        info!(
            %container,
            scanned = result.scanned_count,
            fixed = result.fixed_count,
            warnings = result.warning_count,
            errors = result.error_count,
            "Container repair completed"
        );
        Ok(result)
    }

    async fn fix_blob(&self, container: Container, path: &str) -> Result<BlobOutcome, RepairError> {
        let properties = self.store.properties(container, path).await?;

        let Some(current) = properties.content_disposition else {
            warn!(%container, path, "Blob has no Content-Disposition header");
            return Ok(BlobOutcome::MissingHeader);
        };
        if !needs_fixing(&current) {
            return Ok(BlobOutcome::Compliant);
        }

        let file_name = extract_original_filename(&current)
            .ok_or_else(|| RepairError::Unextractable(current.clone()))?;
        let content_type = properties.content_type.unwrap_or_else(|| {
            mime_guess::from_path(&file_name)
                .first_or_octet_stream()
                .essence_str()
                .to_string()
        });
        let fixed = content_disposition_for(&file_name);

        self.store
            .set_headers(container, path, &content_type, &fixed)
            .await?;

        info!(%container, path, from = %current, to = %fixed, "Fixed blob headers");
        Ok(BlobOutcome::Fixed)
    }
}

#[derive(Debug, thiserror::Error)]
enum RepairError {
    #[error("Could not extract filename from {0:?}")]
    Unextractable(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}
