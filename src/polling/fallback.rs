use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use super::{PollMode, PollingScheduler};
use crate::realtime::ConnectionStatus;

/// Drives a set of schedulers from the broker's connection status.
pub struct Fallback {
    schedulers: Vec<Arc<PollingScheduler>>,
    mode: Mutex<Option<PollMode>>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl Fallback {
    pub fn new(schedulers: Vec<Arc<PollingScheduler>>) -> Self {
        Self {
            schedulers,
            mode: Mutex::new(None),
            driver: Mutex::new(None),
        }
    }

    /// Applies the mode for `status` to every scheduler.
    pub fn on_status(&self, status: ConnectionStatus) -> PollMode {
        let mode = PollMode::for_status(status);
        let previous = self
            .mode
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(mode);
        if previous != Some(mode) {
            info!(status = %status, mode = ?mode, "delivery mode changed");
        }

        for scheduler in &self.schedulers {
            scheduler.apply(mode);
        }
        mode
    }

    pub fn mode(&self) -> Option<PollMode> {
        *self.mode.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Follows a status channel until it closes or [`Fallback::stop`] is called.
    pub fn drive(self: &Arc<Self>, mut status: watch::Receiver<ConnectionStatus>) {
        let this = Arc::clone(self);
        let task = tokio::spawn(async move {
            let current = *status.borrow_and_update();
            this.on_status(current);
            while status.changed().await.is_ok() {
                let current = *status.borrow_and_update();
                this.on_status(current);
            }
        });

        let mut driver = self.driver.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = driver.replace(task) {
            previous.abort();
        }
    }

    /// Number of schedulers with a running interval.
    pub fn active_intervals(&self) -> usize {
        self.schedulers.iter().filter(|s| s.is_active()).count()
    }

    pub fn schedulers(&self) -> &[Arc<PollingScheduler>] {
        &self.schedulers
    }

    pub fn stop(&self) {
        if let Some(driver) = self
            .driver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            driver.abort();
        }
        for scheduler in &self.schedulers {
            scheduler.stop();
        }
    }
}
