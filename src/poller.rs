//! Polling scheduler - one recurring status fetch for the tracked scan
//!
//! At most one timer is live at a time. Every timer carries the scan id and
//! the generation it was armed for; a response is applied only if that
//! generation is still current when it arrives. `start` and `stop` both move
//! the generation forward, so anything still in flight from an older timer
//! is dropped on arrival. Generations only change while the store lock is
//! held, which makes the check and the write a single step.

use crate::api::ScanBackend;
use crate::config::PollConfig;
use crate::error::ScanError;
use crate::model::{ScanId, ScanJob};
use crate::store::SharedStore;
use crate::terminal::is_terminal;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// A scheduled recurring timer bound to one scan. Dropping it cancels the timer.
#[derive(Debug)]
pub struct PollingHandle {
    job_id: ScanId,
    cancel: CancellationToken,
    timer: JoinHandle<()>,
}

impl PollingHandle {
    #[cfg(test)]
    pub fn job_id(&self) -> ScanId {
        self.job_id
    }

    fn is_live(&self) -> bool {
        !self.cancel.is_cancelled() && !self.timer.is_finished()
    }
}

impl Drop for PollingHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.timer.abort();
    }
}

pub struct PollingScheduler<B> {
    backend: Arc<B>,
    store: SharedStore,
    config: PollConfig,
    generation: Arc<AtomicU64>,
    handle: Option<PollingHandle>,
    // Outstanding-fetch flag of the last scan polled; survives restarts for that scan.
    gate: Option<(ScanId, Arc<AtomicBool>)>,
}

impl<B> PollingScheduler<B> {
    /// Cancels the timer, if any, and marks the store as not polling.
    /// Safe to call in any state, any number of times.
    pub fn stop(&mut self) {
        let generation = &self.generation;
        self.store.update(|store| {
            generation.fetch_add(1, Ordering::AcqRel);
            store.set_polling(false);
        });

        if let Some(handle) = self.handle.take() {
            if handle.is_live() {
                tracing::info!(scan_id = handle.job_id, "Polling stopped");
            }
        }
    }

    /// Whether a timer is currently scheduled.
    #[cfg(test)]
    pub fn is_active(&self) -> bool {
        self.handle.as_ref().is_some_and(PollingHandle::is_live)
    }

    #[cfg(test)]
    pub fn active_job(&self) -> Option<ScanId> {
        self.handle
            .as_ref()
            .filter(|handle| handle.is_live())
            .map(PollingHandle::job_id)
    }
}

impl<B: ScanBackend> PollingScheduler<B> {
    pub fn new(backend: Arc<B>, store: SharedStore, config: PollConfig) -> Self {
        Self {
            backend,
            store,
            config,
            generation: Arc::new(AtomicU64::new(0)),
            handle: None,
            gate: None,
        }
    }

    /// Arms a recurring status fetch for `job_id`, replacing any live timer.
    /// The first fetch happens one interval after arming.
    pub fn start(&mut self, job_id: ScanId) {
        self.stop();

        let counter = &self.generation;
        let generation = self.store.update(|store| {
            store.set_polling(true);
            counter.fetch_add(1, Ordering::AcqRel) + 1
        });

        let in_flight = match &self.gate {
            Some((id, gate)) if *id == job_id => Arc::clone(gate),
            _ => Arc::new(AtomicBool::new(false)),
        };
        self.gate = Some((job_id, Arc::clone(&in_flight)));

        let cancel = CancellationToken::new();
        let tick = Arc::new(Tick {
            job_id,
            generation,
            backend: Arc::clone(&self.backend),
            store: self.store.clone(),
            current: Arc::clone(&self.generation),
            cancel: cancel.clone(),
            in_flight,
            fetch_timeout: self.config.fetch_timeout,
        });
        let timer = tokio::spawn(run_timer(tick, self.config.interval));

        tracing::info!(
            scan_id = job_id,
            generation,
            interval_ms = self.config.interval.as_millis() as u64,
            "Polling started"
        );
        self.handle = Some(PollingHandle {
            job_id,
            cancel,
            timer,
        });
    }
}

impl<B> Drop for PollingScheduler<B> {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Everything one timer needs, passed explicitly rather than captured.
struct Tick<B> {
    job_id: ScanId,
    generation: u64,
    backend: Arc<B>,
    store: SharedStore,
    current: Arc<AtomicU64>,
    cancel: CancellationToken,
    in_flight: Arc<AtomicBool>,
    fetch_timeout: Duration,
}

async fn run_timer<B: ScanBackend>(tick: Arc<Tick<B>>, interval: Duration) {
    let mut ticker = time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = tick.cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        // One outstanding fetch per scan.
        if tick.in_flight.swap(true, Ordering::AcqRel) {
            tracing::debug!(scan_id = tick.job_id, "Status fetch still outstanding, skipping tick");
            continue;
        }

        let fetch = Arc::clone(&tick);
        tokio::spawn(async move {
            fetch.poll_once().await;
            fetch.in_flight.store(false, Ordering::Release);
        });
    }

    tracing::debug!(scan_id = tick.job_id, generation = tick.generation, "Polling timer finished");
}

impl<B: ScanBackend> Tick<B> {
    async fn poll_once(&self) {
        tracing::debug!(scan_id = self.job_id, "Fetching scan status");
        let result = match time::timeout(self.fetch_timeout, self.backend.get_scan(self.job_id)).await {
            Ok(result) => result,
            Err(_) => Err(ScanError::Network(format!(
                "Timed out fetching status of scan {}",
                self.job_id
            ))),
        };
        self.apply(result);
    }

    fn apply(&self, result: Result<ScanJob, ScanError>) {
        self.store.update(|store| {
            if self.current.load(Ordering::Acquire) != self.generation || !store.is_polling() {
                tracing::debug!(
                    scan_id = self.job_id,
                    generation = self.generation,
                    "Discarding stale status response"
                );
                return;
            }

            match result {
                Ok(job) => {
                    let status = job.overall_status;
                    tracing::debug!(
                        scan_id = self.job_id,
                        status = %status,
                        completed = job.count_completed(),
                        total = job.results.len(),
                        "Scan status updated"
                    );
                    store.set_job(job);
                    if is_terminal(status) {
                        self.halt();
                        store.set_polling(false);
                        store.set_loading(false);
                        tracing::info!(scan_id = self.job_id, status = %status, "Scan finished, polling stopped");
                    }
                }
                Err(err) => {
                    tracing::warn!(scan_id = self.job_id, "Status poll failed, polling stopped: {}", err);
                    store.set_error(err.to_string());
                    self.halt();
                }
            }
        });
    }

    // Caller holds the store lock.
    fn halt(&self) {
        self.current.fetch_add(1, Ordering::AcqRel);
        self.cancel.cancel();
    }
}
