//! Shared Module
//!
//! Types that describe a buffered write independently of where it is stored
//! or how it is transmitted. The local store, the dispatcher, and the
//! facade all speak in terms of these types.
//!
//! # Overview
//!
//! - [`mutation`] - the persisted `QueuedMutation` record, its id, its type
//!   and its sync status
//! - [`error`] - errors raised while parsing or validating shared types
//! - [`config`] - base application configuration (server URL)

/// Queued mutation data model
pub mod mutation;

/// Shared error types
pub mod error;

/// Application configuration
pub mod config;

/// Re-export commonly used types for convenience
pub use mutation::{MutationId, MutationType, QueuedMutation, SyncStatus};
pub use error::SharedError;
pub use config::{AppConfig, AppConfigBuilder, ConfigError};
