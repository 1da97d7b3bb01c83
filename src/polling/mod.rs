//! Polling fallback: keeps data fresh while the realtime channel is down.
//!
//! Two modes, one transition function. Every scheduler is driven from the
//! broker status, so a scheduler never has more than one interval running
//! and none while the broker is connected.

mod fallback;
mod scheduler;

pub use fallback::Fallback;
pub use scheduler::{PollError, PollingScheduler, Refresh};

use crate::realtime::ConnectionStatus;

/// Delivery mode for one data domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollMode {
    /// Realtime events are flowing; no polling.
    Push,
    /// Realtime is unavailable; refresh on a fixed interval.
    Poll,
}

impl PollMode {
    /// The only transition rule: push iff the broker is connected.
    pub fn for_status(status: ConnectionStatus) -> Self {
        if status.is_connected() {
            PollMode::Push
        } else {
            PollMode::Poll
        }
    }
}

#[cfg(test)]
mod tests;
