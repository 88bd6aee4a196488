//! # Fallback Writes
//!
//! Try the network first; if that is not possible, queue the write and
//! report success anyway. Callers only see an error when the local store
//! itself fails.

use std::fmt;
use std::future::Future;

use crate::client::engine::{Result, SyncEngine};
use crate::shared::{MutationId, MutationType};

/// How a fallback write was delivered.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOutcome<T> {
    /// The live call succeeded; nothing was queued.
    Sent(T),
    /// The write was persisted for later replay.
    Queued { id: MutationId },
}

impl<T> WriteOutcome<T> {
    /// Whether the write is waiting in the queue rather than on the server.
    pub fn is_offline(&self) -> bool {
        matches!(self, WriteOutcome::Queued { .. })
    }

    pub fn queued_id(&self) -> Option<&MutationId> {
        match self {
            WriteOutcome::Queued { id } => Some(id),
            WriteOutcome::Sent(_) => None,
        }
    }

    pub fn into_sent(self) -> Option<T> {
        match self {
            WriteOutcome::Sent(value) => Some(value),
            WriteOutcome::Queued { .. } => None,
        }
    }
}

impl SyncEngine {
    /// Run `network_call` when online, queueing `payload` under
    /// `mutation_type` when offline or when the call fails.
    ///
    /// The call's error is logged and swallowed.
    pub async fn write_with_fallback<F, Fut, T, E>(
        &self,
        network_call: F,
        mutation_type: MutationType,
        payload: serde_json::Value,
    ) -> Result<WriteOutcome<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: fmt::Display,
    {
        if !self.is_online() {
            let id = self.enqueue(mutation_type, payload).await?;
            return Ok(WriteOutcome::Queued { id });
        }

        match network_call().await {
            Ok(value) => Ok(WriteOutcome::Sent(value)),
            Err(e) => {
                tracing::warn!("{} failed live, queueing for sync: {}", mutation_type, e);
                let id = self.enqueue(mutation_type, payload).await?;
                Ok(WriteOutcome::Queued { id })
            }
        }
    }
}
