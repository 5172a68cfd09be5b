//! Scan state store - current job snapshot, last error and lifecycle flags

use crate::model::ScanJob;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

/// Holds the scan currently of interest. Jobs are replaced whole, never patched.
#[derive(Debug, Default)]
pub struct ScanStateStore {
    current_job: Option<Arc<ScanJob>>,
    last_error: Option<String>,
    loading: bool,
    polling: bool,
}

impl ScanStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Back to idle: no job, no error, no active flow.
    pub fn reset(&mut self) {
        self.current_job = None;
        self.last_error = None;
        self.loading = false;
        self.polling = false;
    }

    pub fn set_job(&mut self, job: ScanJob) {
        self.current_job = Some(Arc::new(job));
    }

    /// Records `message` and ends the active flow.
    pub fn set_error(&mut self, message: impl Into<String>) {
        self.last_error = Some(message.into());
        self.loading = false;
        self.polling = false;
    }

    pub fn set_loading(&mut self, loading: bool) {
        self.loading = loading;
    }

    pub fn set_polling(&mut self, polling: bool) {
        self.polling = polling;
    }

    pub fn current_job(&self) -> Option<&ScanJob> {
        self.current_job.as_deref()
    }

    #[cfg(test)]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    #[cfg(test)]
    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn is_polling(&self) -> bool {
        self.polling
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            job: self.current_job.clone(),
            error: self.last_error.clone(),
            loading: self.loading,
            polling: self.polling,
        }
    }
}

/// Immutable copy of the store handed to observers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreSnapshot {
    pub job: Option<Arc<ScanJob>>,
    pub error: Option<String>,
    pub loading: bool,
    pub polling: bool,
}

impl StoreSnapshot {
    /// Neither submitting nor polling.
    pub fn is_idle(&self) -> bool {
        !self.loading && !self.polling
    }
}

/// Handle to the store shared by the submission controller and the poller.
///
/// The lock is only taken for short synchronous sections and never across an
/// await. Every mutation publishes a fresh snapshot to subscribers.
#[derive(Debug, Clone)]
pub struct SharedStore {
    inner: Arc<Mutex<ScanStateStore>>,
    updates: Arc<watch::Sender<StoreSnapshot>>,
}

impl SharedStore {
    pub fn new() -> Self {
        let (updates, _) = watch::channel(StoreSnapshot::default());
        Self {
            inner: Arc::new(Mutex::new(ScanStateStore::new())),
            updates: Arc::new(updates),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ScanStateStore> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Applies `f` under the lock, then notifies subscribers.
    pub fn update<R>(&self, f: impl FnOnce(&mut ScanStateStore) -> R) -> R {
        let mut store = self.lock();
        let out = f(&mut store);
        self.updates.send_replace(store.snapshot());
        out
    }

    pub fn read<R>(&self, f: impl FnOnce(&ScanStateStore) -> R) -> R {
        f(&self.lock())
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        self.lock().snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<StoreSnapshot> {
        self.updates.subscribe()
    }
}

impl Default for SharedStore {
    fn default() -> Self {
        Self::new()
    }
}
