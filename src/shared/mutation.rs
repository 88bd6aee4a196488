//! Queued Mutation Data Model
//!
//! A `QueuedMutation` is a single buffered write intent, such as "submit this
//! maintenance request". It is the only entity the local store persists.
//!
//! The payload is opaque to the engine: it is carried verbatim from
//! `enqueue` to the remote endpoint chosen by the mutation's type.
//!
//! # Lifecycle
//!
//! ```text
//! pending ──► syncing ──► synced ──(grace delay)──► deleted
//!                │
//!                └──► failed ──(next pass, retry_count < cap)──► syncing
//!                        │
//!                        └──(retry_count == cap)──► stuck until cleared
//! ```

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::shared::error::SharedError;

/// Length of the random suffix appended to generated ids.
const ID_RANDOM_LEN: usize = 9;

/// The closed set of mutation kinds the engine knows how to commit.
///
/// The kebab-case string form is used both in storage and in ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MutationType {
    /// Tenant-submitted maintenance ticket
    MaintenanceRequest,
    /// Uploaded proof of a rent payment
    PaymentProof,
    /// Message in a tenant/manager conversation
    ChatMessage,
    /// Acknowledgement that an announcement was read
    AnnouncementReadReceipt,
}

impl MutationType {
    /// Every mutation type, in declaration order.
    pub const ALL: [MutationType; 4] = [
        MutationType::MaintenanceRequest,
        MutationType::PaymentProof,
        MutationType::ChatMessage,
        MutationType::AnnouncementReadReceipt,
    ];

    /// Storage and wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            MutationType::MaintenanceRequest => "maintenance-request",
            MutationType::PaymentProof => "payment-proof",
            MutationType::ChatMessage => "chat-message",
            MutationType::AnnouncementReadReceipt => "announcement-read-receipt",
        }
    }
}

impl fmt::Display for MutationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MutationType {
    type Err = SharedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MutationType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| SharedError::unknown_mutation_type(s))
    }
}

/// Sync status of a queued mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// Waiting for its first attempt
    Pending,
    /// Currently being transmitted by a sync pass
    Syncing,
    /// Committed remotely, awaiting deletion
    Synced,
    /// Last attempt failed
    Failed,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "pending",
            SyncStatus::Syncing => "syncing",
            SyncStatus::Synced => "synced",
            SyncStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = SharedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SyncStatus::Pending),
            "syncing" => Ok(SyncStatus::Syncing),
            "synced" => Ok(SyncStatus::Synced),
            "failed" => Ok(SyncStatus::Failed),
            other => Err(SharedError::validation(
                "sync_status",
                format!("unknown sync status '{}'", other),
            )),
        }
    }
}

/// Primary key of a queued mutation: `{type}_{unix_millis}_{random}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MutationId(String);

impl MutationId {
    /// Generate a fresh id for a mutation of `mutation_type` created at `at`.
    pub fn generate(mutation_type: MutationType, at: DateTime<Utc>) -> Self {
        let random = Uuid::new_v4().simple().to_string();
        Self(format!(
            "{}_{}_{}",
            mutation_type.as_str(),
            at.timestamp_millis(),
            &random[..ID_RANDOM_LEN]
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MutationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for MutationId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for MutationId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// A buffered write intent persisted by the local store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedMutation {
    /// Unique id, generated at enqueue time
    pub id: MutationId,
    /// Determines which remote call commits this mutation
    pub mutation_type: MutationType,
    /// Opaque body sent verbatim to the remote endpoint
    pub payload: serde_json::Value,
    /// Set at enqueue time and never changed
    pub created_at: DateTime<Utc>,
    /// Current position in the sync state machine
    pub sync_status: SyncStatus,
    /// Number of failed attempts so far
    pub retry_count: u32,
    /// When the last transmit attempt started
    pub last_attempt_at: Option<DateTime<Utc>>,
    /// Error message from the last failed attempt
    pub last_error: Option<String>,
}

impl QueuedMutation {
    /// Create a new `pending` mutation stamped with the current time.
    pub fn new(mutation_type: MutationType, payload: serde_json::Value) -> Self {
        Self::new_at(mutation_type, payload, Utc::now())
    }

    /// Create a new `pending` mutation stamped with `created_at`.
    ///
    /// The timestamp is truncated to milliseconds, the precision it is
    /// stored with.
    pub fn new_at(
        mutation_type: MutationType,
        payload: serde_json::Value,
        created_at: DateTime<Utc>,
    ) -> Self {
        let created_at = created_at.trunc_subsecs(3);
        Self {
            id: MutationId::generate(mutation_type, created_at),
            mutation_type,
            payload,
            created_at,
            sync_status: SyncStatus::Pending,
            retry_count: 0,
            last_attempt_at: None,
            last_error: None,
        }
    }
}
