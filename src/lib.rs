//! propsync - Offline-first mutation queue and sync engine
//!
//! Lets a property-management client keep accepting writes while the device
//! is disconnected, and replays them against the server once connectivity
//! returns.
//!
//! # Module Structure
//!
//! - **`shared`** - Types shared by the client and anything that inspects
//!   the queue
//!   - `QueuedMutation`, mutation types, sync statuses
//!   - Application config builder
//!   - Error types
//!
//! - **`client`** - The engine itself
//!   - `local_db`: durable SQLite queue
//!   - `sync`: connectivity monitor, dispatcher, orchestrator, scheduler
//!   - `offline`: fallback writes that queue when the network is unavailable
//!   - `engine`: the `SyncEngine` facade feature code talks to
//!
//! # Usage
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
//! // Host reports connectivity changes
//! engine.set_online(false).await;
//! engine
//!     .enqueue(MutationType::PaymentProof, json!({"lease": "L-118", "amount": 1450}))
//!     .await?;
//!
//! // Coming back online wakes the background pass
//! engine.set_online(true).await;
//! # Ok(())
//! # }
//! ```
//!
//! # Error Handling
//!
//! - `StoreError` for local persistence failures, the only errors the
//!   facade surfaces
//! - `TransmitError` for remote failures, absorbed by the orchestrator and
//!   recorded on the queued row
//! - `ConfigError` for configuration loading

/// Shared types and data structures
pub mod shared;

/// Client-side queue and synchronization
pub mod client;
