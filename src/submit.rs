//! Submission - validate a target URL and create its scan

use crate::api::ScanBackend;
use crate::error::ScanError;
use crate::model::ScanJob;
use crate::store::SharedStore;
use crate::terminal::is_terminal;
use std::sync::Arc;

/// Coarse scheme check. Returns the trimmed URL that will be submitted.
pub fn validate_target_url(url: &str) -> Result<&str, ScanError> {
    let url = url.trim();
    if url.is_empty() {
        return Err(ScanError::Validation("Please enter a URL to scan".into()));
    }
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(ScanError::Validation(format!(
            "URL must start with http:// or https:// (got {:?})",
            url
        )));
    }
    Ok(url)
}

pub struct SubmissionController<B> {
    backend: Arc<B>,
    store: SharedStore,
}

impl<B: ScanBackend> SubmissionController<B> {
    pub fn new(backend: Arc<B>, store: SharedStore) -> Self {
        Self { backend, store }
    }

    /// Submits `url` as a new scan.
    ///
    /// Invalid input is rejected before the store is touched. Otherwise the
    /// store is reset before the request goes out; on success it holds the
    /// initial snapshot with `polling` set (unless the job is already
    /// terminal), on failure it holds the error message.
    pub async fn submit(&self, url: &str) -> Result<ScanJob, ScanError> {
        let url = validate_target_url(url)?;

        self.store.update(|store| {
            store.reset();
            store.set_loading(true);
        });
        tracing::info!("Submitting scan for {}", url);

        match self.backend.create_scan(url).await {
            Ok(job) => {
                let terminal = is_terminal(job.overall_status);
                tracing::info!(
                    scan_id = job.id,
                    status = %job.overall_status,
                    checks = job.results.len(),
                    "Scan accepted"
                );
                self.store.update(|store| {
                    store.set_job(job.clone());
                    if terminal {
                        store.set_loading(false);
                    } else {
                        store.set_polling(true);
                    }
                });
                Ok(job)
            }
            Err(err) => {
                tracing::warn!("Scan submission failed: {}", err);
                self.store.update(|store| store.set_error(err.to_string()));
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TestStatus;
    use crate::testing::{job, ScriptedBackend};
    use std::time::Duration;

    #[test]
    fn test_validation() {
        assert_eq!(validate_target_url("https://example.com"), Ok("https://example.com"));
        assert_eq!(validate_target_url("  http://a.b  "), Ok("http://a.b"));
        assert!(validate_target_url("").unwrap_err().is_validation());
        assert!(validate_target_url("   ").unwrap_err().is_validation());
        assert!(validate_target_url("not-a-url").unwrap_err().is_validation());
        assert!(validate_target_url("ftp://example.com").unwrap_err().is_validation());
    }

    #[tokio::test]
    async fn test_invalid_url_makes_no_request() {
        let backend = Arc::new(ScriptedBackend::new());
        let store = SharedStore::new();
        let controller = SubmissionController::new(backend.clone(), store.clone());

        let err = controller.submit("not-a-url").await.unwrap_err();

        assert!(err.is_validation());
        assert_eq!(backend.create_calls(), 0);
        assert!(!store.snapshot().loading);
    }

    #[tokio::test]
    async fn test_success_arms_polling() {
        let initial = job(3, TestStatus::Pending, &[TestStatus::Pending; 3]);
        let backend = Arc::new(ScriptedBackend::new().on_create(Ok(initial.clone())));
        let store = SharedStore::new();
        let controller = SubmissionController::new(backend.clone(), store.clone());

        let created = controller.submit(" https://example.com ").await.unwrap();

        assert_eq!(created, initial);
        assert_eq!(backend.created_urls(), vec!["https://example.com".to_string()]);
        let snap = store.snapshot();
        assert_eq!(snap.job.as_deref(), Some(&initial));
        assert!(snap.loading);
        assert!(snap.polling);
        assert!(snap.error.is_none());
    }

    #[tokio::test]
    async fn test_already_terminal_job_does_not_poll() {
        let done = job(3, TestStatus::Error, &[TestStatus::Error]);
        let backend = Arc::new(ScriptedBackend::new().on_create(Ok(done)));
        let store = SharedStore::new();
        let controller = SubmissionController::new(backend, store.clone());

        controller.submit("https://example.com").await.unwrap();

        assert!(store.snapshot().is_idle());
    }

    #[tokio::test]
    async fn test_failure_records_message() {
        let backend = Arc::new(
            ScriptedBackend::new().on_create(Err(ScanError::Network("Failed to start scan (HTTP 500)".into()))),
        );
        let store = SharedStore::new();
        let controller = SubmissionController::new(backend, store.clone());

        let err = controller.submit("https://example.com").await.unwrap_err();

        assert!(err.is_network());
        let snap = store.snapshot();
        assert_eq!(snap.error.as_deref(), Some("Failed to start scan (HTTP 500)"));
        assert!(snap.is_idle());
        assert!(snap.job.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_is_clean_while_request_in_flight() {
        let backend = Arc::new(ScriptedBackend::new().on_create_after(
            Duration::from_secs(1),
            Ok(job(2, TestStatus::Pending, &[TestStatus::Pending])),
        ));
        let store = SharedStore::new();
        store.update(|s| {
            s.set_job(job(1, TestStatus::InProgress, &[TestStatus::InProgress]));
            s.set_error("old failure");
        });
        let controller = SubmissionController::new(backend, store.clone());

        let pending = tokio::spawn(async move { controller.submit("https://example.com").await });
        tokio::time::sleep(Duration::from_millis(500)).await;

        let mid = store.snapshot();
        assert!(mid.job.is_none());
        assert!(mid.error.is_none());
        assert!(mid.loading);
        assert!(!mid.polling);

        pending.await.unwrap().unwrap();
        assert_eq!(store.snapshot().job.unwrap().id, 2);
    }
}
