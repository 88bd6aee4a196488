//! # Synchronization
//!
//! Replays the durable mutation queue against the server.
//!
//! ## Components
//!
//! - **Network Monitor**: host connectivity signal as a watchable status
//! - **Dispatcher**: routes each mutation type to its remote endpoint
//! - **Orchestrator**: single-flight passes over the queue with bounded retries
//! - **Scheduler**: timer and online-edge triggers
//! - **Metrics / State**: counters and the snapshot UI indicators render
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use propsync::client::config::Config;
//! use propsync::client::local_db::LocalDatabase;
//! use propsync::client::sync::{Dispatcher, NetworkMonitor, SyncOrchestrator, SyncTrigger};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load()?;
//! let orchestrator = SyncOrchestrator::new(
//!     Arc::new(LocalDatabase::open(config.database_path())),
//!     Dispatcher::http(&config),
//!     Arc::new(NetworkMonitor::default()),
//!     &config,
//! );
//! let outcome = orchestrator.run_pass(SyncTrigger::Manual).await?;
//! # Ok(())
//! # }
//! ```

pub mod dispatcher;
pub mod metrics;
pub mod network_monitor;
pub mod orchestrator;
pub mod scheduler;
pub mod sync_state;

pub use dispatcher::{
    Dispatcher, FnHandler, HttpHandler, MutationHandler, TransmitError, TransmitFuture,
    TransmitResult, MUTATION_ID_HEADER,
};
pub use metrics::SyncMetrics;
pub use network_monitor::{NetworkMonitor, NetworkStatus};
pub use orchestrator::{SyncOrchestrator, SyncOutcome, SyncReport, SyncTrigger};
pub use scheduler::SyncScheduler;
pub use sync_state::SyncState;
