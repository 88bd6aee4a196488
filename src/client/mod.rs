//! # Client
//!
//! Offline-first write path for the property-management client.
//!
//! ## Components
//!
//! - **Config**: engine settings from defaults, file and environment
//! - **Local Database**: durable SQLite mutation queue
//! - **Sync**: connectivity, dispatch, passes, triggers
//! - **Offline**: fallback writes
//! - **Engine**: the facade tying it together

pub mod config;
pub mod engine;
pub mod local_db;
pub mod offline;
pub mod sync;

pub use config::Config;
pub use engine::{EngineError, SyncEngine, SyncEngineBuilder};
pub use offline::WriteOutcome;
