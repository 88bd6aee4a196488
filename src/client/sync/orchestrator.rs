//! # Sync Orchestrator
//!
//! Drains the durable queue through the dispatcher, one pass at a time.
//!
//! A pass selects every `pending` record together with every `failed` record
//! still below the retry cap, oldest first, and walks them strictly in order:
//! `syncing` while the transmit is in flight, then `synced` (deleted after a
//! short grace delay) or `failed` with the retry counter bumped. Records at
//! the cap are never touched again; they stay visible through
//! [`SyncState::stuck_operations`] until the queue is cleared.
//!
//! A row never stays `syncing` past its pass. A panicking handler counts as
//! a failed transmit, and if the outcome cannot be written the row goes back
//! to `pending`.
//!
//! Passes are single-flight. A trigger that arrives while one is running
//! returns [`SyncOutcome::AlreadyRunning`] immediately.

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use tokio::sync::{watch, RwLock};

use crate::client::config::Config;
use crate::client::local_db::{LocalDatabase, MutationPatch, RecoveryReport, StoreError};
use crate::client::sync::dispatcher::{Dispatcher, TransmitError};
use crate::client::sync::metrics::SyncMetrics;
use crate::client::sync::network_monitor::NetworkMonitor;
use crate::client::sync::sync_state::SyncState;
use crate::shared::{MutationId, QueuedMutation, SyncStatus};

/// What woke the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTrigger {
    /// Offline-to-online edge
    Connectivity,
    /// Periodic interval
    Timer,
    /// Explicit `sync_now`
    Manual,
    /// First pass after the engine starts
    Startup,
}

impl fmt::Display for SyncTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncTrigger::Connectivity => "connectivity",
            SyncTrigger::Timer => "timer",
            SyncTrigger::Manual => "manual",
            SyncTrigger::Startup => "startup",
        };
        f.write_str(name)
    }
}

/// Summary of a pass that ran.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncReport {
    pub trigger: SyncTrigger,
    /// Records handed to the dispatcher
    pub attempted: usize,
    pub synced: usize,
    pub failed: usize,
    /// Records left alone because they were already at the retry cap
    pub skipped: usize,
    /// Stored rows that could not be decoded and were parked at the cap
    pub quarantined: usize,
    /// Failures caused by a type with no registered handler
    pub unknown_type: usize,
    /// Connectivity dropped before every candidate was visited
    pub interrupted: bool,
    pub duration: Duration,
    pub finished_at: DateTime<Utc>,
}

impl SyncReport {
    fn new(trigger: SyncTrigger) -> Self {
        Self {
            trigger,
            attempted: 0,
            synced: 0,
            failed: 0,
            skipped: 0,
            quarantined: 0,
            unknown_type: 0,
            interrupted: false,
            duration: Duration::ZERO,
            finished_at: Utc::now(),
        }
    }
}

/// Result of asking for a pass.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    /// Device offline; nothing was touched
    Offline,
    /// Another pass holds the single-flight flag
    AlreadyRunning,
    Completed(SyncReport),
}

impl SyncOutcome {
    pub fn report(&self) -> Option<&SyncReport> {
        match self {
            SyncOutcome::Completed(report) => Some(report),
            _ => None,
        }
    }
}

/// Holds the single-flight flag for the lifetime of a pass.
struct PassGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> PassGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

pub struct SyncOrchestrator {
    store: Arc<LocalDatabase>,
    dispatcher: Dispatcher,
    monitor: Arc<NetworkMonitor>,
    max_retries: u32,
    transmit_timeout: Duration,
    grace_delay: Duration,
    in_flight: AtomicBool,
    metrics: RwLock<SyncMetrics>,
    state: watch::Sender<SyncState>,
}

impl fmt::Debug for SyncOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncOrchestrator")
            .field("dispatcher", &self.dispatcher)
            .field("max_retries", &self.max_retries)
            .field("transmit_timeout", &self.transmit_timeout)
            .field("grace_delay", &self.grace_delay)
            .field("in_flight", &self.is_syncing())
            .finish()
    }
}

impl SyncOrchestrator {
    pub fn new(
        store: Arc<LocalDatabase>,
        dispatcher: Dispatcher,
        monitor: Arc<NetworkMonitor>,
        config: &Config,
    ) -> Self {
        let (state, _) = watch::channel(SyncState::new(monitor.get_status()));
        Self {
            store,
            dispatcher,
            monitor,
            max_retries: config.max_retries(),
            transmit_timeout: config.transmit_timeout(),
            grace_delay: config.grace_delay(),
            in_flight: AtomicBool::new(false),
            metrics: RwLock::new(SyncMetrics::new()),
            state,
        }
    }

    pub fn is_syncing(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub async fn metrics(&self) -> SyncMetrics {
        self.metrics.read().await.clone()
    }

    pub fn state(&self) -> SyncState {
        self.state.borrow().clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SyncState> {
        self.state.subscribe()
    }

    /// Run one pass over the queue.
    ///
    /// Transmit failures are recorded on the rows and never surface here;
    /// only a store failure ends the pass with an error.
    pub async fn run_pass(&self, trigger: SyncTrigger) -> Result<SyncOutcome, StoreError> {
        if !self.monitor.is_online() {
            tracing::debug!("Skipping {} sync: offline", trigger);
            self.metrics.write().await.record_offline_skip();
            return Ok(SyncOutcome::Offline);
        }

        let Some(_guard) = PassGuard::acquire(&self.in_flight) else {
            tracing::debug!("Skipping {} sync: a pass is already running", trigger);
            self.metrics.write().await.record_overlap_skip();
            return Ok(SyncOutcome::AlreadyRunning);
        };

        self.state.send_modify(|state| state.is_syncing = true);
        let started = Instant::now();

        match self.drain(trigger).await {
            Ok(mut report) => {
                report.duration = started.elapsed();
                report.finished_at = Utc::now();

                tracing::info!(
                    "Sync pass ({}) finished in {:?}: {} synced, {} failed, {} skipped",
                    trigger,
                    report.duration,
                    report.synced,
                    report.failed,
                    report.skipped
                );

                self.metrics.write().await.record_pass(&report);
                self.state.send_modify(|state| {
                    state.last_sync = Some(report.finished_at);
                    state.last_report = Some(report.clone());
                    state.last_error = None;
                });
                drop(_guard);
                self.refresh_state().await;

                Ok(SyncOutcome::Completed(report))
            }
            Err(e) => {
                tracing::error!("Sync pass ({}) aborted: {}", trigger, e);

                self.metrics.write().await.record_pass_failure();
                self.state
                    .send_modify(|state| state.last_error = Some(e.to_string()));
                drop(_guard);
                self.refresh_state().await;

                Err(e)
            }
        }
    }

    async fn drain(&self, trigger: SyncTrigger) -> Result<SyncReport, StoreError> {
        let batch = self.store.list_retry_eligible(self.max_retries).await?;
        let candidates = batch.mutations;
        let mut report = SyncReport::new(trigger);
        report.quarantined = batch.quarantined.len();
        report.skipped = self.store.count_stuck(self.max_retries).await?;

        tracing::debug!(
            "Sync pass ({}) found {} candidates, {} at the retry cap",
            trigger,
            candidates.len(),
            report.skipped
        );

        for (index, mutation) in candidates.iter().enumerate() {
            if !self.monitor.is_online() {
                tracing::info!(
                    "Connectivity lost mid-pass; {} mutations left for the next pass",
                    candidates.len() - index
                );
                report.interrupted = true;
                break;
            }

            report.attempted += 1;
            self.sync_one(mutation, &mut report).await?;
        }

        Ok(report)
    }

    async fn sync_one(
        &self,
        mutation: &QueuedMutation,
        report: &mut SyncReport,
    ) -> Result<(), StoreError> {
        let syncing =
            MutationPatch::status(SyncStatus::Syncing).with_last_attempt_at(Utc::now());
        if !self.mark(&mutation.id, syncing).await? {
            return Ok(());
        }

        let transmit = AssertUnwindSafe(self.dispatcher.transmit(mutation)).catch_unwind();
        let result = match tokio::time::timeout(self.transmit_timeout, transmit).await {
            Ok(Ok(result)) => result,
            Ok(Err(panic)) => Err(TransmitError::Panicked(panic_message(&*panic))),
            Err(_) => Err(TransmitError::Timeout(self.transmit_timeout)),
        };

        if let Err(e) = self.settle(mutation, result, report).await {
            self.release(&mutation.id).await;
            return Err(e);
        }
        Ok(())
    }

    /// Record the transmit outcome on the row.
    async fn settle(
        &self,
        mutation: &QueuedMutation,
        result: Result<(), TransmitError>,
        report: &mut SyncReport,
    ) -> Result<(), StoreError> {
        match result {
            Ok(()) => {
                tracing::debug!("Synced {} ({})", mutation.id, mutation.mutation_type);
                if self
                    .mark(&mutation.id, MutationPatch::status(SyncStatus::Synced))
                    .await?
                {
                    self.schedule_deletion(mutation.id.clone());
                }
                report.synced += 1;
            }
            Err(err) => {
                let retry_count = mutation.retry_count + 1;
                if let TransmitError::UnknownMutationType(_) = err {
                    report.unknown_type += 1;
                } else {
                    tracing::warn!(
                        "Transmit of {} failed (attempt {}/{}): {}",
                        mutation.id,
                        retry_count,
                        self.max_retries,
                        err
                    );
                }

                let failed = MutationPatch::status(SyncStatus::Failed)
                    .with_retry_count(retry_count)
                    .with_last_error(err.to_string());
                self.mark(&mutation.id, failed).await?;
                report.failed += 1;

                if retry_count >= self.max_retries {
                    tracing::warn!(
                        "Mutation {} reached the retry cap and will not be retried",
                        mutation.id
                    );
                }
            }
        }

        Ok(())
    }

    /// Put a row whose outcome could not be recorded back to `pending`.
    async fn release(&self, id: &MutationId) {
        match self.mark(id, MutationPatch::status(SyncStatus::Pending)).await {
            Ok(_) => tracing::warn!("Released {} back to pending after a store error", id),
            Err(e) => tracing::error!("Mutation {} left in syncing: {}", id, e),
        }
    }

    /// Apply `patch`, treating a record cleared mid-pass as gone rather than
    /// as a fault. Returns whether the record still existed.
    async fn mark(&self, id: &MutationId, patch: MutationPatch) -> Result<bool, StoreError> {
        match self.store.update(id, patch).await {
            Ok(()) => Ok(true),
            Err(StoreError::NotFound { .. }) => {
                tracing::debug!("Mutation {} was removed during the pass", id);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    fn schedule_deletion(&self, id: MutationId) {
        let store = Arc::clone(&self.store);
        let delay = self.grace_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = store.delete(&id).await {
                tracing::warn!("Failed to delete synced mutation {}: {}", id, e);
            }
        });
    }

    /// Repair rows a previous process left mid-pass.
    ///
    /// Holds the single-flight flag while it runs. Returns `None` without
    /// touching the store if a pass is already running.
    pub async fn recover_interrupted(&self) -> Result<Option<RecoveryReport>, StoreError> {
        let Some(_guard) = PassGuard::acquire(&self.in_flight) else {
            return Ok(None);
        };
        self.store.recover_interrupted().await.map(Some)
    }

    /// Recompute queue counters and publish a fresh [`SyncState`].
    pub async fn refresh_state(&self) {
        let stats = self.store.stats(self.max_retries).await;
        let network_status = self.monitor.get_status();
        let is_syncing = self.is_syncing();

        self.state.send_modify(|state| {
            state.is_syncing = is_syncing;
            state.network_status = network_status;
            match &stats {
                Ok(stats) => {
                    state.pending_operations = stats.unsynced();
                    state.stuck_operations = stats.stuck;
                }
                Err(e) => state.last_error = Some(e.to_string()),
            }
        });

        if let Err(e) = stats {
            tracing::warn!("Could not refresh sync state: {}", e);
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
