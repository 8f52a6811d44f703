//! HTTP client for the ClamAV REST scan service.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::{info, warn};

use super::{FileScanInput, FileScanResult, FileScanner, ScanError, ScanVerdict};

const SCAN_PATH: &str = "/api/v1/scan";
const FORM_KEY: &str = "FILES";

#[derive(Debug, Deserialize)]
struct ScanResponse {
    success: bool,
    data: Option<ScanData>,
}

#[derive(Debug, Deserialize)]
struct ScanData {
    result: Vec<ScanResultDto>,
}

#[derive(Debug, Deserialize)]
struct ScanResultDto {
    name: String,
    is_infected: Option<bool>,
    #[serde(default)]
    viruses: Vec<String>,
}

/// [`FileScanner`] posting multipart batches to `{base_url}/api/v1/scan`.
#[derive(Debug, Clone)]
pub struct ScanClient {
    http: reqwest::Client,
    url: String,
}

impl ScanClient {
    /// Create a client whose requests are bounded by `timeout`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ScanError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ScanError::Transport(e.to_string()))?;
        let url = format!("{}{SCAN_PATH}", base_url.trim_end_matches('/'));

        info!(url = %url, timeout_secs = timeout.as_secs(), "Initialized file scan client");
        Ok(Self { http, url })
    }
}

#[async_trait]
impl FileScanner for ScanClient {
    async fn scan(&self, files: &[FileScanInput]) -> Result<Vec<FileScanResult>, ScanError> {
        info!(count = files.len(), "Scanning files");

        let form = files.iter().fold(Form::new(), |form, file| {
            form.part(
                FORM_KEY,
                Part::bytes(file.bytes.to_vec()).file_name(file.name.clone()),
            )
        });

        let response = self
            .http
            .post(&self.url)
            .header(ACCEPT, "application/json")
            .multipart(form)
            .send()
            .await
            .map_err(|e| ScanError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "Scan service returned an error status");
            return Err(ScanError::Status(status.as_u16()));
        }

        let body: ScanResponse = response
            .json()
            .await
            .map_err(|e| ScanError::Decode(e.to_string()))?;
        if !body.success {
            warn!("Scan service reported failure");
            return Err(ScanError::Rejected);
        }
        let data = body
            .data
            .ok_or_else(|| ScanError::Decode("missing data".into()))?;

        let results: Vec<FileScanResult> = data
            .result
            .into_iter()
            .map(|r| FileScanResult {
                verdict: ScanVerdict::from_flag(r.is_infected),
                name: r.name,
                viruses: r.viruses,
            })
            .collect();

        for result in results.iter().filter(|r| r.verdict != ScanVerdict::Clean) {
            warn!(
                file_name = %result.name,
                verdict = ?result.verdict,
                viruses = ?result.viruses,
                "File not reported clean"
            );
        }
        Ok(results)
    }
}
