//! Runtime statistics for the desk.

use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Stats {
    pub uptime: Duration,
    /// User snapshots installed.
    pub snapshot_refreshes: u64,
    /// Broker events handled by the notification bridge.
    pub realtime_signals: u64,
    /// Feed messages applied to wallets.
    pub rate_updates: u64,
    pub status_changes: u64,
    pub polls_started: u64,
    pub polls_skipped: u64,
    pub polls_failed: u64,
    pub api_requests: u64,
}
