//! # Sync Scheduler
//!
//! Wakes the orchestrator on the periodic timer and on every
//! offline-to-online edge.
//!
//! Each trigger spawns its pass onto a separate task, so a slow pass never
//! delays the next tick; overlapping triggers are resolved by the
//! orchestrator's single-flight flag.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::client::sync::network_monitor::NetworkMonitor;
use crate::client::sync::orchestrator::{SyncOrchestrator, SyncOutcome, SyncTrigger};

/// `tokio::time::interval` rejects a zero period.
const MIN_INTERVAL: Duration = Duration::from_millis(10);

struct Running {
    shutdown: watch::Sender<bool>,
    timer: JoinHandle<()>,
    connectivity: JoinHandle<()>,
}

pub struct SyncScheduler {
    orchestrator: Arc<SyncOrchestrator>,
    monitor: Arc<NetworkMonitor>,
    interval: Duration,
    running: Mutex<Option<Running>>,
}

impl SyncScheduler {
    pub fn new(
        orchestrator: Arc<SyncOrchestrator>,
        monitor: Arc<NetworkMonitor>,
        interval: Duration,
    ) -> Self {
        Self {
            orchestrator,
            monitor,
            interval,
            running: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub async fn is_active(&self) -> bool {
        self.running.lock().await.is_some()
    }

    /// Start the timer and connectivity triggers.
    ///
    /// Returns `false` if they were already running.
    pub async fn start(&self) -> bool {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return false;
        }

        let (shutdown, mut shutdown_rx) = watch::channel(false);

        let orchestrator = Arc::clone(&self.orchestrator);
        let period = self.interval.max(MIN_INTERVAL);
        let timer = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick completes immediately; startup has its own pass.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => spawn_pass(&orchestrator, SyncTrigger::Timer),
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
        });

        let orchestrator = Arc::clone(&self.orchestrator);
        let connectivity = self.monitor.on_online(move || {
            spawn_pass(&orchestrator, SyncTrigger::Connectivity);
            async {}
        });

        tracing::info!("Sync scheduler started (interval {:?})", self.interval);
        *running = Some(Running {
            shutdown,
            timer,
            connectivity,
        });
        true
    }

    /// Stop both triggers. Passes already spawned run to completion.
    pub async fn stop(&self) {
        let Some(running) = self.running.lock().await.take() else {
            return;
        };

        let _ = running.shutdown.send(true);
        running.connectivity.abort();
        let _ = running.timer.await;
        let _ = running.connectivity.await;

        tracing::info!("Sync scheduler stopped");
    }
}

/// Run a pass on its own task, logging instead of returning its result.
pub(crate) fn spawn_pass(orchestrator: &Arc<SyncOrchestrator>, trigger: SyncTrigger) {
    let orchestrator = Arc::clone(orchestrator);
    tokio::spawn(async move {
        match orchestrator.run_pass(trigger).await {
            Ok(SyncOutcome::Completed(_)) => {}
            Ok(outcome) => tracing::debug!("{} trigger ignored: {:?}", trigger, outcome),
            Err(e) => tracing::error!("{} sync pass failed: {}", trigger, e),
        }
    });
}
