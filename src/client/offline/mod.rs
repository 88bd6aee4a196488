//! # Offline Writes
//!
//! Lets feature code issue a write without caring whether the device is
//! connected: the write goes out live when it can and lands in the durable
//! queue when it cannot.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use propsync::client::engine::SyncEngine;
//! use propsync::shared::MutationType;
//! use serde_json::json;
//!
//! # async fn example(engine: SyncEngine, client: reqwest::Client) -> Result<(), Box<dyn std::error::Error>> {
//! let payload = json!({"announcement": 12});
//! let body = payload.clone();
//! let outcome = engine
//!     .write_with_fallback(
//!         || async move {
//!             client
//!                 .post("https://example.invalid/api/announcements/read-receipts")
//!                 .json(&body)
//!                 .send()
//!                 .await?
//!                 .error_for_status()
//!         },
//!         MutationType::AnnouncementReadReceipt,
//!         payload,
//!     )
//!     .await?;
//!
//! if outcome.is_offline() {
//!     println!("saved offline, will sync later");
//! }
//! # Ok(())
//! # }
//! ```

pub mod fallback;

pub use fallback::WriteOutcome;
