//! Virus Scanning
//!
//! Uploaded files are scanned by an external service before anything is
//! stored. A file is only treated as clean when the service explicitly says
//! so.

mod client;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use thiserror::Error;

pub use client::ScanClient;

/// Scan service failures. None of these say anything about the files.
#[derive(Debug, Error)]
pub enum ScanError {
    /// Connection failure or timeout.
    #[error("Scan request failed: {0}")]
    Transport(String),

    /// Non-success HTTP status.
    #[error("Scan service returned status {0}")]
    Status(u16),

    /// The service answered but reported `success: false`.
    #[error("Scan service reported failure")]
    Rejected,

    /// The response body could not be decoded.
    #[error("Invalid scan response: {0}")]
    Decode(String),
}

/// A file submitted for scanning.
#[derive(Debug, Clone)]
pub struct FileScanInput {
    pub name: String,
    pub bytes: Bytes,
}

/// Outcome for a single file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScanVerdict {
    Clean,
    Infected,
    /// The service gave no infection flag for the file.
    Unknown,
}

impl ScanVerdict {
    /// Interpret the service's nullable `is_infected` flag.
    #[must_use]
    pub const fn from_flag(is_infected: Option<bool>) -> Self {
        match is_infected {
            Some(false) => Self::Clean,
            Some(true) => Self::Infected,
            None => Self::Unknown,
        }
    }
}

/// Per-file scan result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileScanResult {
    pub name: String,
    pub verdict: ScanVerdict,
    pub viruses: Vec<String>,
}

/// Scans a batch of files.
#[async_trait]
pub trait FileScanner: Send + Sync {
    async fn scan(&self, files: &[FileScanInput]) -> Result<Vec<FileScanResult>, ScanError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_flag_is_unknown() {
        assert_eq!(ScanVerdict::from_flag(Some(false)), ScanVerdict::Clean);
        assert_eq!(ScanVerdict::from_flag(Some(true)), ScanVerdict::Infected);
        assert_eq!(ScanVerdict::from_flag(None), ScanVerdict::Unknown);
    }
}
