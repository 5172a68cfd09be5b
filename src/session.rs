//! Scan session - wires submission, polling and the store together

use crate::api::ScanBackend;
use crate::config::PollConfig;
use crate::error::ScanError;
use crate::model::{ScanJob, TestDefinition, TestStatus};
use crate::poller::PollingScheduler;
use crate::store::{SharedStore, StoreSnapshot};
use crate::submit::{validate_target_url, SubmissionController};
use std::sync::Arc;
use tokio::sync::watch;

/// Owns one interactive flow: the scan being tracked and its poll timer.
/// Dropping the session stops polling.
pub struct ScanSession<B> {
    backend: Arc<B>,
    store: SharedStore,
    controller: SubmissionController<B>,
    scheduler: PollingScheduler<B>,
}

impl<B: ScanBackend> ScanSession<B> {
    pub fn new(backend: Arc<B>, poll: PollConfig) -> Self {
        let store = SharedStore::new();
        Self {
            controller: SubmissionController::new(Arc::clone(&backend), store.clone()),
            scheduler: PollingScheduler::new(Arc::clone(&backend), store.clone(), poll),
            backend,
            store,
        }
    }

    /// Submits `url`, discarding whatever flow was active, and starts
    /// polling the new scan unless it is already finished.
    ///
    /// A malformed URL never reaches the backend. It still ends the active
    /// flow, leaving the last snapshot in place.
    pub async fn submit(&mut self, url: &str) -> Result<ScanJob, ScanError> {
        self.scheduler.stop();
        let url = match validate_target_url(url) {
            Ok(url) => url,
            Err(err) => {
                self.store.update(|store| store.set_loading(false));
                return Err(err);
            }
        };

        let job = self.controller.submit(url).await?;
        if self.store.read(|store| store.is_polling()) {
            self.scheduler.start(job.id);
        }
        Ok(job)
    }

    /// User cancellation: stops polling and keeps the last snapshot.
    pub fn cancel(&mut self) {
        self.scheduler.stop();
        self.store.update(|store| store.set_loading(false));
    }

    /// Downloads the report of the tracked scan. Only a completed scan has one.
    pub async fn download_report(&self) -> Result<Vec<u8>, ScanError> {
        let (id, status) = self
            .store
            .read(|store| store.current_job().map(|job| (job.id, job.overall_status)))
            .ok_or(ScanError::NoScan)?;
        if status != TestStatus::Completed {
            return Err(ScanError::ReportUnavailable { id, status });
        }

        tracing::info!(scan_id = id, "Downloading report");
        self.backend.get_report(id).await
    }

    pub async fn list_tests(&self) -> Result<Vec<TestDefinition>, ScanError> {
        self.backend.list_tests().await
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        self.store.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<StoreSnapshot> {
        self.store.subscribe()
    }

    #[cfg(test)]
    pub fn is_polling(&self) -> bool {
        self.scheduler.is_active()
    }

    /// Teardown hook; equivalent to dropping the session.
    pub fn shutdown(mut self) {
        self.scheduler.stop();
    }
}
