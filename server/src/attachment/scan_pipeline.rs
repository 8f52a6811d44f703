//! Upload scan gate.

use tracing::warn;

use super::error::AttachmentError;
use crate::scan::{FileScanInput, FileScanner, ScanVerdict};

/// Scan `files` and fail unless every one of them is reported clean.
///
/// A file missing from the response, or reported without an infection flag,
/// blocks the upload the same way an infected file does.
pub async fn ensure_clean(
    scanner: &dyn FileScanner,
    files: &[FileScanInput],
) -> Result<(), AttachmentError> {
    let results = scanner.scan(files).await?;

    if let Some(infected) = results.iter().find(|r| r.verdict == ScanVerdict::Infected) {
        return Err(AttachmentError::Infected {
            file_name: infected.name.clone(),
            viruses: infected.viruses.clone(),
        });
    }

    if let Some(unknown) = results.iter().find(|r| r.verdict == ScanVerdict::Unknown) {
        warn!(file_name = %unknown.name, "Scan returned no verdict, rejecting upload");
        return Err(AttachmentError::ScanInconclusive {
            file_name: unknown.name.clone(),
        });
    }

    if let Some(missing) = files
        .iter()
        .find(|file| !results.iter().any(|r| r.name == file.name))
    {
        warn!(file_name = %missing.name, "Scan response did not include file, rejecting upload");
        return Err(AttachmentError::ScanInconclusive {
            file_name: missing.name.clone(),
        });
    }

    Ok(())
}
