use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::time::sleep;

use super::*;
use crate::realtime::ConnectionStatus;

const INTERVAL: Duration = Duration::from_secs(15);

#[derive(Default)]
struct Counter {
    calls: AtomicU32,
    delay: Duration,
    fail: bool,
}

impl Counter {
    fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Refresh for Counter {
    async fn refresh(&self) -> Result<(), PollError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }
        if self.fail {
            return Err("backend unavailable".into());
        }
        Ok(())
    }
}

fn scheduler(target: &Arc<Counter>) -> Arc<PollingScheduler> {
    let target: Arc<dyn Refresh> = target.clone();
    Arc::new(PollingScheduler::new("user", INTERVAL, target))
}

#[test]
fn test_mode_transition_function() {
    assert_eq!(PollMode::for_status(ConnectionStatus::Connected), PollMode::Push);
    for status in [
        ConnectionStatus::Idle,
        ConnectionStatus::Connecting,
        ConnectionStatus::Disconnected,
        ConnectionStatus::Failed,
    ] {
        assert_eq!(PollMode::for_status(status), PollMode::Poll);
    }
}

#[tokio::test(start_paused = true)]
async fn test_first_poll_fires_immediately_after_disconnect() {
    let target = Arc::new(Counter::default());
    let fallback = Fallback::new(vec![scheduler(&target)]);

    fallback.on_status(ConnectionStatus::Connected);
    sleep(Duration::from_millis(1)).await;
    assert_eq!(target.calls(), 0);
    assert_eq!(fallback.active_intervals(), 0);

    fallback.on_status(ConnectionStatus::Disconnected);
    sleep(Duration::from_millis(1)).await;
    assert_eq!(target.calls(), 1);
    assert_eq!(fallback.active_intervals(), 1);

    sleep(INTERVAL - Duration::from_millis(10)).await;
    assert_eq!(target.calls(), 1);

    sleep(Duration::from_millis(20)).await;
    assert_eq!(target.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_connected_clears_interval() {
    let target = Arc::new(Counter::default());
    let fallback = Fallback::new(vec![scheduler(&target)]);

    fallback.on_status(ConnectionStatus::Failed);
    sleep(Duration::from_millis(1)).await;
    assert_eq!(target.calls(), 1);

    fallback.on_status(ConnectionStatus::Connected);
    assert_eq!(fallback.active_intervals(), 0);

    sleep(INTERVAL * 3).await;
    assert_eq!(target.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_active_intervals_never_exceed_one_per_scheduler() {
    let user = Arc::new(Counter::default());
    let chat = Arc::new(Counter::default());
    let fallback = Fallback::new(vec![scheduler(&user), scheduler(&chat)]);

    let statuses = [
        ConnectionStatus::Idle,
        ConnectionStatus::Connecting,
        ConnectionStatus::Connected,
        ConnectionStatus::Disconnected,
        ConnectionStatus::Disconnected,
        ConnectionStatus::Connected,
        ConnectionStatus::Failed,
        ConnectionStatus::Connecting,
        ConnectionStatus::Connected,
        ConnectionStatus::Disconnected,
    ];

    for status in statuses {
        fallback.on_status(status);
        sleep(Duration::from_millis(5)).await;

        for s in fallback.schedulers() {
            assert!(!(status.is_connected() && s.is_active()));
        }
        let active = fallback.active_intervals();
        if status.is_connected() {
            assert_eq!(active, 0);
        } else {
            assert_eq!(active, 2);
        }
    }

    // repeated non-connected statuses never restart the interval
    assert_eq!(user.calls(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_overlapping_tick_is_skipped() {
    let target = Arc::new(Counter::slow(INTERVAL * 2 + Duration::from_secs(1)));
    let poller = scheduler(&target);

    poller.apply(PollMode::Poll);
    sleep(INTERVAL * 2 + Duration::from_millis(500)).await;

    // ticks at 15s and 30s land while the first refresh is running
    assert_eq!(target.calls(), 1);
    assert_eq!(poller.started(), 1);
    assert_eq!(poller.skipped(), 2);

    sleep(INTERVAL).await;
    assert_eq!(target.calls(), 2);
    poller.stop();
}

#[tokio::test(start_paused = true)]
async fn test_failures_are_swallowed_and_retried() {
    let target = Arc::new(Counter {
        fail: true,
        ..Counter::default()
    });
    let poller = scheduler(&target);

    poller.apply(PollMode::Poll);
    sleep(INTERVAL * 2 + Duration::from_millis(1)).await;

    assert_eq!(target.calls(), 3);
    assert_eq!(poller.failed(), 3);
    assert!(poller.is_active());
    poller.stop();
    assert!(!poller.is_active());
}

#[tokio::test(start_paused = true)]
async fn test_drive_follows_status_channel() {
    let target = Arc::new(Counter::default());
    let fallback = Arc::new(Fallback::new(vec![scheduler(&target)]));
    let (tx, rx) = watch::channel(ConnectionStatus::Connected);

    fallback.drive(rx);
    sleep(Duration::from_millis(1)).await;
    assert_eq!(fallback.mode(), Some(PollMode::Push));
    assert_eq!(target.calls(), 0);

    tx.send(ConnectionStatus::Disconnected).unwrap();
    sleep(Duration::from_millis(1)).await;
    assert_eq!(fallback.mode(), Some(PollMode::Poll));
    assert_eq!(target.calls(), 1);

    tx.send(ConnectionStatus::Connected).unwrap();
    sleep(Duration::from_millis(1)).await;
    assert_eq!(fallback.active_intervals(), 0);

    fallback.stop();
}
