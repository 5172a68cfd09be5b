//! Backend client - the HTTP contract the orchestrator consumes

use crate::config::ClientConfig;
use crate::error::ScanError;
use crate::model::{ScanId, ScanJob, TestDefinition};
use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;

const CREATE_FAILED: &str = "Failed to start scan";
const STATUS_FAILED: &str = "Failed to fetch scan status";
const REPORT_FAILED: &str = "Failed to download report";
const CATALOG_FAILED: &str = "Failed to load test catalog";

/// Remote side of a scan. Implementations must be cheap to share across tasks.
#[async_trait]
pub trait ScanBackend: Send + Sync + 'static {
    /// Creates a job for `url` and returns its initial snapshot.
    async fn create_scan(&self, url: &str) -> Result<ScanJob, ScanError>;

    /// Full current snapshot of job `id`.
    async fn get_scan(&self, id: ScanId) -> Result<ScanJob, ScanError>;

    async fn get_report(&self, id: ScanId) -> Result<Vec<u8>, ScanError>;

    async fn list_tests(&self) -> Result<Vec<TestDefinition>, ScanError>;
}

pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self, ScanError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("scanwatch/", env!("CARGO_PKG_VERSION")))
            .timeout(request_timeout)
            .build()
            .map_err(|e| ScanError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self, ScanError> {
        Self::new(&config.api_url, config.request_timeout)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl ScanBackend for HttpBackend {
    async fn create_scan(&self, url: &str) -> Result<ScanJob, ScanError> {
        let response = self
            .client
            .post(self.url("/scans"))
            .json(&serde_json::json!({ "url": url }))
            .send()
            .await;
        let job: ScanJob = read_json(response, CREATE_FAILED).await?;
        tracing::debug!(scan_id = job.id, "scan created");
        Ok(job.normalized())
    }

    async fn get_scan(&self, id: ScanId) -> Result<ScanJob, ScanError> {
        let response = self
            .client
            .get(self.url(&format!("/scans/{}", id)))
            .send()
            .await;
        let job: ScanJob = read_json(response, STATUS_FAILED).await?;
        Ok(job.normalized())
    }

    async fn get_report(&self, id: ScanId) -> Result<Vec<u8>, ScanError> {
        let response = self
            .client
            .get(self.url(&format!("/scans/{}/report", id)))
            .send()
            .await;
        let response = ensure_success(response, REPORT_FAILED).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| transport_error(REPORT_FAILED, &e))?;
        Ok(bytes.to_vec())
    }

    async fn list_tests(&self) -> Result<Vec<TestDefinition>, ScanError> {
        let response = self.client.get(self.url("/tests")).send().await;
        let mut tests: Vec<TestDefinition> = read_json(response, CATALOG_FAILED).await?;
        tests.sort_by_key(|t| t.id);
        Ok(tests)
    }
}

async fn read_json<T: DeserializeOwned>(
    response: Result<Response, reqwest::Error>,
    generic: &str,
) -> Result<T, ScanError> {
    let response = ensure_success(response, generic).await?;
    response
        .json::<T>()
        .await
        .map_err(|e| ScanError::Network(format!("{}: unexpected response body ({})", generic, e)))
}

async fn ensure_success(
    response: Result<Response, reqwest::Error>,
    generic: &str,
) -> Result<Response, ScanError> {
    let response = response.map_err(|e| transport_error(generic, &e))?;
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(ScanError::Network(error_message(status, &body, generic)))
}

fn transport_error(generic: &str, err: &reqwest::Error) -> ScanError {
    if err.is_timeout() {
        return ScanError::Network(format!("{}: request timed out", generic));
    }
    ScanError::Network(format!("{}: {}", generic, err))
}

/// Best user-facing message for a failed response: the backend's `detail`
/// when it sent one, otherwise the generic message with the status code.
pub fn error_message(status: StatusCode, body: &str, generic: &str) -> String {
    extract_detail(body).unwrap_or_else(|| format!("{} (HTTP {})", generic, status.as_u16()))
}

fn extract_detail(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    match value.get("detail")? {
        Value::String(detail) if !detail.trim().is_empty() => Some(detail.clone()),
        Value::Array(items) => {
            let messages: Vec<&str> = items
                .iter()
                .filter_map(|item| item.get("msg").and_then(|m| m.as_str()))
                .collect();
            (!messages.is_empty()).then(|| messages.join("; "))
        }
        _ => None,
    }
}
