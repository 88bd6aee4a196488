//! # Sync State
//!
//! Snapshot of the engine that UI indicators render: the syncing flag,
//! connectivity, how many writes are still local, and how many are stuck at
//! the retry cap.

use chrono::{DateTime, Utc};

use crate::client::sync::network_monitor::NetworkStatus;
use crate::client::sync::orchestrator::SyncReport;

#[derive(Debug, Clone, PartialEq)]
pub struct SyncState {
    pub is_syncing: bool,
    pub network_status: NetworkStatus,
    /// Records not yet committed remotely, stuck ones included
    pub pending_operations: usize,
    /// Failed records that will not be retried automatically
    pub stuck_operations: usize,
    pub last_sync: Option<DateTime<Utc>>,
    pub last_report: Option<SyncReport>,
    /// Last store error seen by a pass or a refresh
    pub last_error: Option<String>,
}

impl SyncState {
    pub fn new(network_status: NetworkStatus) -> Self {
        Self {
            is_syncing: false,
            network_status,
            pending_operations: 0,
            stuck_operations: 0,
            last_sync: None,
            last_report: None,
            last_error: None,
        }
    }

    /// Whether the UI should show a persistent "could not send" warning.
    pub fn needs_attention(&self) -> bool {
        self.stuck_operations > 0 || self.last_error.is_some()
    }
}

impl Default for SyncState {
    fn default() -> Self {
        Self::new(NetworkStatus::Offline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_needs_attention() {
        let mut state = SyncState::new(NetworkStatus::Online);
        assert!(!state.needs_attention());

        state.stuck_operations = 1;
        assert!(state.needs_attention());

        state.stuck_operations = 0;
        state.last_error = Some("storage fault".to_string());
        assert!(state.needs_attention());
    }
}
