//! # Sync Engine
//!
//! The one surface feature code talks to: enqueue a write, ask how many are
//! still local, force a pass, or wipe the queue. Everything else (store,
//! monitor, dispatcher, triggers) is owned here and wired at construction.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use propsync::client::config::Config;
//! use propsync::client::engine::SyncEngine;
//! use propsync::shared::MutationType;
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = SyncEngine::open(Config::load()?);
//! engine.start().await?;
//!
//! engine
//!     .enqueue(MutationType::MaintenanceRequest, json!({"unit": "4B", "issue": "no heat"}))
//!     .await?;
//! println!("{} writes waiting", engine.pending_count().await?);
//!
//! engine.shutdown().await;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::watch;

use crate::client::config::Config;
use crate::client::local_db::{LocalDatabase, QueueStats, RecoveryReport, StoreError};
use crate::client::sync::scheduler::spawn_pass;
use crate::client::sync::{
    Dispatcher, NetworkMonitor, NetworkStatus, SyncMetrics, SyncOrchestrator, SyncOutcome,
    SyncScheduler, SyncState, SyncTrigger,
};
use crate::shared::{ConfigError, MutationId, MutationType, QueuedMutation, SyncStatus};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type Result<T> = std::result::Result<T, EngineError>;

pub struct SyncEngine {
    config: Config,
    store: Arc<LocalDatabase>,
    monitor: Arc<NetworkMonitor>,
    orchestrator: Arc<SyncOrchestrator>,
    scheduler: SyncScheduler,
}

impl SyncEngine {
    /// Engine over the configured database file, posting to the configured
    /// server, assuming the device starts online.
    pub fn open(config: Config) -> Self {
        Self::builder(config).build()
    }

    pub fn builder(config: Config) -> SyncEngineBuilder {
        SyncEngineBuilder::new(config)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Persist a write for later replay.
    pub async fn enqueue(
        &self,
        mutation_type: MutationType,
        payload: serde_json::Value,
    ) -> Result<MutationId> {
        let mutation = QueuedMutation::new(mutation_type, payload);
        self.store.put(&mutation).await?;

        tracing::info!("Queued {} as {}", mutation_type, mutation.id);
        self.orchestrator.refresh_state().await;
        Ok(mutation.id)
    }

    /// Writes not yet committed remotely, stuck ones included.
    pub async fn pending_count(&self) -> Result<usize> {
        Ok(self.store.count_unsynced().await?)
    }

    /// Failed writes that reached the retry cap and need a human.
    pub async fn stuck_count(&self) -> Result<usize> {
        Ok(self.store.count_stuck(self.config.max_retries()).await?)
    }

    pub async fn queue_stats(&self) -> Result<QueueStats> {
        Ok(self.store.stats(self.config.max_retries()).await?)
    }

    pub async fn get(&self, id: &MutationId) -> Result<Option<QueuedMutation>> {
        Ok(self.store.get(id).await?)
    }

    /// Queued records, oldest first, optionally restricted to one status.
    pub async fn list(&self, status: Option<SyncStatus>) -> Result<Vec<QueuedMutation>> {
        let records = match status {
            Some(status) => self.store.list_by_status(status).await?,
            None => self.store.list_all().await?,
        };
        Ok(records)
    }

    pub async fn sync_now(&self) -> Result<SyncOutcome> {
        Ok(self.orchestrator.run_pass(SyncTrigger::Manual).await?)
    }

    pub fn is_syncing(&self) -> bool {
        self.orchestrator.is_syncing()
    }

    /// Drop every queued write, whatever its status. Returns how many.
    pub async fn clear_all(&self) -> Result<usize> {
        let removed = self.store.clear().await?;
        tracing::warn!("Cleared {} queued mutations", removed);

        self.orchestrator.refresh_state().await;
        Ok(removed as usize)
    }

    pub fn is_online(&self) -> bool {
        self.monitor.is_online()
    }

    pub fn network_status(&self) -> NetworkStatus {
        self.monitor.get_status()
    }

    /// Host connectivity signal. An offline-to-online edge wakes the
    /// scheduler when it is running.
    pub async fn set_online(&self, online: bool) {
        if self.monitor.set_online(online) {
            self.orchestrator.refresh_state().await;
        }
    }

    pub fn state(&self) -> SyncState {
        self.orchestrator.state()
    }

    pub fn watch_state(&self) -> watch::Receiver<SyncState> {
        self.orchestrator.subscribe_state()
    }

    pub async fn metrics(&self) -> SyncMetrics {
        self.orchestrator.metrics().await
    }

    /// Repair records left behind by a previous process: interrupted
    /// transmits go back to `pending`, synced leftovers are deleted.
    ///
    /// Does nothing while a sync pass is running in this process.
    pub async fn recover(&self) -> Result<RecoveryReport> {
        let Some(recovery) = self.orchestrator.recover_interrupted().await? else {
            tracing::debug!("Skipping queue recovery: a sync pass is running");
            return Ok(RecoveryReport::default());
        };
        if recovery != RecoveryReport::default() {
            tracing::info!(
                "Recovered queue: {} interrupted mutations reset, {} synced leftovers removed",
                recovery.reset_to_pending,
                recovery.purged_synced
            );
        }
        self.orchestrator.refresh_state().await;
        Ok(recovery)
    }

    /// [`recover`](Self::recover), then start the background triggers (when
    /// auto sync is on) with a startup pass.
    pub async fn start(&self) -> Result<RecoveryReport> {
        let recovery = self.recover().await?;

        if self.config.auto_sync() {
            self.scheduler.start().await;
            spawn_pass(&self.orchestrator, SyncTrigger::Startup);
        }

        Ok(recovery)
    }

    /// Stop the background triggers and close the store.
    pub async fn shutdown(&self) {
        self.scheduler.stop().await;
        self.store.close().await;
        tracing::info!("Sync engine shut down");
    }
}

/// Wires a [`SyncEngine`] from injected parts; anything left unset falls
/// back to what [`SyncEngine::open`] would use.
pub struct SyncEngineBuilder {
    config: Config,
    store: Option<LocalDatabase>,
    dispatcher: Option<Dispatcher>,
    network_status: NetworkStatus,
}

impl SyncEngineBuilder {
    fn new(config: Config) -> Self {
        Self {
            config,
            store: None,
            dispatcher: None,
            network_status: NetworkStatus::Online,
        }
    }

    pub fn store(mut self, store: LocalDatabase) -> Self {
        self.store = Some(store);
        self
    }

    pub fn dispatcher(mut self, dispatcher: Dispatcher) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    pub fn network_status(mut self, status: NetworkStatus) -> Self {
        self.network_status = status;
        self
    }

    pub fn build(self) -> SyncEngine {
        let config = self.config;
        let store = Arc::new(
            self.store
                .unwrap_or_else(|| LocalDatabase::open(config.database_path())),
        );
        let dispatcher = self
            .dispatcher
            .unwrap_or_else(|| Dispatcher::http(&config));
        let monitor = Arc::new(NetworkMonitor::new(self.network_status));

        let orchestrator = Arc::new(SyncOrchestrator::new(
            Arc::clone(&store),
            dispatcher,
            Arc::clone(&monitor),
            &config,
        ));
        let scheduler = SyncScheduler::new(
            Arc::clone(&orchestrator),
            Arc::clone(&monitor),
            config.sync_interval(),
        );

        SyncEngine {
            config,
            store,
            monitor,
            orchestrator,
            scheduler,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn offline_engine() -> SyncEngine {
        SyncEngine::builder(Config::new())
            .store(LocalDatabase::in_memory())
            .dispatcher(Dispatcher::new())
            .network_status(NetworkStatus::Offline)
            .build()
    }

    #[tokio::test]
    async fn test_enqueue_updates_state() {
        let engine = offline_engine();
        let mut rx = engine.watch_state();

        let id = engine
            .enqueue(MutationType::ChatMessage, json!({"text": "hello"}))
            .await
            .unwrap();

        assert_eq!(engine.pending_count().await.unwrap(), 1);
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().pending_operations, 1);
        assert_eq!(
            engine.get(&id).await.unwrap().unwrap().sync_status,
            SyncStatus::Pending
        );
    }

    #[tokio::test]
    async fn test_set_online_updates_state() {
        let engine = offline_engine();
        assert_eq!(engine.state().network_status, NetworkStatus::Offline);

        engine.set_online(true).await;

        assert!(engine.is_online());
        assert_eq!(engine.state().network_status, NetworkStatus::Online);
    }

    #[tokio::test]
    async fn test_start_recovers_interrupted_records() {
        let engine = offline_engine();
        let id = engine
            .enqueue(MutationType::PaymentProof, json!({"amount": 10}))
            .await
            .unwrap();
        engine
            .store
            .update(
                &id,
                crate::client::local_db::MutationPatch::status(SyncStatus::Syncing),
            )
            .await
            .unwrap();

        let recovery = engine.start().await.unwrap();

        assert_eq!(recovery.reset_to_pending, 1);
        assert_eq!(
            engine.get(&id).await.unwrap().unwrap().sync_status,
            SyncStatus::Pending
        );
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_recover_leaves_in_flight_record_alone() {
        let dispatcher = Dispatcher::new().with_handler(
            MutationType::ChatMessage,
            crate::client::sync::FnHandler::new(|_| async {
                tokio::time::sleep(std::time::Duration::from_millis(200)).await;
                Ok(())
            }),
        );
        let engine = SyncEngine::builder(Config::new())
            .store(LocalDatabase::in_memory())
            .dispatcher(dispatcher)
            .network_status(NetworkStatus::Online)
            .build();
        let id = engine
            .enqueue(MutationType::ChatMessage, json!({"text": "slow"}))
            .await
            .unwrap();

        let (pass, (status, recovery)) = tokio::join!(engine.sync_now(), async {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            let status = engine.get(&id).await.unwrap().unwrap().sync_status;
            (status, engine.recover().await.unwrap())
        });

        assert_eq!(status, SyncStatus::Syncing);
        assert_eq!(recovery, RecoveryReport::default());
        assert_eq!(pass.unwrap().report().unwrap().synced, 1);
    }

    #[tokio::test]
    async fn test_operations_fail_after_shutdown() {
        let engine = offline_engine();
        engine.shutdown().await;

        assert_matches!(
            engine.enqueue(MutationType::ChatMessage, json!({})).await,
            Err(EngineError::Store(StoreError::StorageFault(_)))
        );
    }
}
