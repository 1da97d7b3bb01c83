use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use super::PollMode;

/// Error returned by a background refresh; logged and dropped.
pub type PollError = Box<dyn std::error::Error + Send + Sync>;

/// A refresh that is safe to call redundantly.
#[async_trait]
pub trait Refresh: Send + Sync {
    async fn refresh(&self) -> Result<(), PollError>;
}

#[derive(Default)]
struct Counters {
    in_flight: AtomicBool,
    started: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
}

/// Interval poller for one data domain.
pub struct PollingScheduler {
    name: String,
    interval: Duration,
    target: Arc<dyn Refresh>,
    counters: Arc<Counters>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl PollingScheduler {
    pub fn new(name: impl Into<String>, interval: Duration, target: Arc<dyn Refresh>) -> Self {
        Self {
            name: name.into(),
            interval,
            target,
            counters: Arc::new(Counters::default()),
            task: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    fn task(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.task.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts or stops the interval for the given mode.
    pub fn apply(&self, mode: PollMode) {
        match mode {
            PollMode::Poll => self.start(),
            PollMode::Push => self.stop(),
        }
    }

    /// Whether an interval is currently running.
    pub fn is_active(&self) -> bool {
        self.task()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Refreshes started so far.
    pub fn started(&self) -> u64 {
        self.counters.started.load(Ordering::SeqCst)
    }

    /// Ticks dropped because a refresh was still in flight.
    pub fn skipped(&self) -> u64 {
        self.counters.skipped.load(Ordering::SeqCst)
    }

    /// Refreshes that returned an error.
    pub fn failed(&self) -> u64 {
        self.counters.failed.load(Ordering::SeqCst)
    }

    /// Refreshes immediately, then once per interval.
    fn start(&self) {
        let mut task = self.task();
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            return;
        }

        info!(poller = %self.name, interval = ?self.interval, "polling started");
        let name = self.name.clone();
        let interval = self.interval;
        let target = Arc::clone(&self.target);
        let counters = Arc::clone(&self.counters);

        *task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                // first tick completes immediately
                ticker.tick().await;

                if counters.in_flight.swap(true, Ordering::SeqCst) {
                    counters.skipped.fetch_add(1, Ordering::SeqCst);
                    debug!(poller = %name, "refresh still in flight, tick skipped");
                    continue;
                }
                counters.started.fetch_add(1, Ordering::SeqCst);

                let target = Arc::clone(&target);
                let counters = Arc::clone(&counters);
                let name = name.clone();
                tokio::spawn(async move {
                    if let Err(e) = target.refresh().await {
                        counters.failed.fetch_add(1, Ordering::SeqCst);
                        debug!(poller = %name, error = %e, "background refresh failed");
                    }
                    counters.in_flight.store(false, Ordering::SeqCst);
                });
            }
        }));
    }

    /// Clears the interval. A refresh already in flight runs to completion.
    pub fn stop(&self) {
        if let Some(task) = self.task().take() {
            task.abort();
            info!(poller = %self.name, "polling stopped");
        }
    }
}

impl Drop for PollingScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}
