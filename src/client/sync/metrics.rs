//! # Sync Metrics
//!
//! Running counters over sync passes: how many ran, how many were skipped,
//! how many mutations each one committed or failed, and how long they took.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::client::sync::orchestrator::SyncReport;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncMetrics {
    /// Passes that ran to completion
    pub completed_passes: u64,
    /// Passes aborted by a store error
    pub failed_passes: u64,
    /// Triggers ignored because the device was offline
    pub offline_skips: u64,
    /// Triggers ignored because a pass was already running
    pub overlap_skips: u64,
    pub mutations_synced: u64,
    pub transmit_failures: u64,
    pub average_pass_duration: Duration,
    pub last_pass_duration: Option<Duration>,
    pub last_pass_at: Option<DateTime<Utc>>,
}

impl SyncMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_pass(&mut self, report: &SyncReport) {
        self.completed_passes += 1;
        self.mutations_synced += report.synced as u64;
        self.transmit_failures += report.failed as u64;
        self.last_pass_duration = Some(report.duration);
        self.last_pass_at = Some(report.finished_at);

        // Rolling average in nanoseconds; `completed_passes` is at least 1 here
        let passes = u128::from(self.completed_passes);
        let total = self.average_pass_duration.as_nanos() * (passes - 1) + report.duration.as_nanos();
        let average = u64::try_from(total / passes).unwrap_or(u64::MAX);
        self.average_pass_duration = Duration::from_nanos(average);
    }

    pub fn record_pass_failure(&mut self) {
        self.failed_passes += 1;
    }

    pub fn record_offline_skip(&mut self) {
        self.offline_skips += 1;
    }

    pub fn record_overlap_skip(&mut self) {
        self.overlap_skips += 1;
    }

    /// Share of attempted transmits that succeeded.
    pub fn success_rate(&self) -> f64 {
        let attempts = self.mutations_synced + self.transmit_failures;
        if attempts == 0 {
            0.0
        } else {
            self.mutations_synced as f64 / attempts as f64
        }
    }
}
