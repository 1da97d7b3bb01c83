//! Wires every component of the wallet desk together.
//!
//! The desk owns one instance of each service: the REST client, the session
//! snapshot, the channel broker, the polling fallback, the notification
//! bridge and the optional rate feed.

mod config;
mod error;
mod stats;

pub use config::DeskConfig;
pub use error::DeskError;
pub use stats::Stats;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::api::{ApiClient, ApiClientConfig, PortalApi};
use crate::bridge::NotificationBridge;
use crate::config::Config;
use crate::lifecycle::{ConversionFlow, SessionStore, WithdrawalFlow};
use crate::market::{RateFeed, RateFeedConfig, WalletStore};
use crate::notification::{Event, EventFilter, LogNotifier, MultiNotifier, Notifier};
use crate::polling::{Fallback, PollingScheduler};
use crate::quote::{FormatOptions, format_with_currency};
use crate::realtime::{
    Broker, BrokerSettings, ChannelAuthorizer, ListenerGuard, SecretAuthorizer,
};

const DEFAULT_USER_POLL_INTERVAL: Duration = Duration::from_secs(15);
const DEFAULT_UNREAD_POLL_INTERVAL: Duration = Duration::from_secs(60);
const OVERVIEW_INTERVAL: Duration = Duration::from_secs(300);

pub struct Desk {
    cfg: Config,
    version: String,
    api: Arc<ApiClient>,
    notifier: Arc<dyn Notifier>,
    wallets: Arc<WalletStore>,
    session: Arc<SessionStore>,
    broker: Broker,
    bridge: Arc<NotificationBridge>,
    conversion: ConversionFlow,
    withdrawal: WithdrawalFlow,
    fallback: Arc<Fallback>,
    feed: Option<Arc<RateFeed>>,

    started_at: Mutex<Option<Instant>>,
    running: Mutex<bool>,
    shutdown: Notify,
    status_changes: Arc<AtomicU64>,
    listener: Mutex<Option<ListenerGuard>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Desk {
    pub fn new(cfg: DeskConfig) -> Result<Self, DeskError> {
        let app = cfg.app_config;

        let api = Arc::new(ApiClient::new(ApiClientConfig::from_config(
            &app.api,
            &app.broker,
        ))?);

        let filter = EventFilter::from_config(&app.notification);
        let log: Arc<dyn Notifier> = Arc::new(LogNotifier::new(filter));
        let notifier: Arc<dyn Notifier> = Arc::new(MultiNotifier::new(vec![log]));

        let wallets = Arc::new(WalletStore::new());
        let session = Arc::new(SessionStore::new(api.clone(), wallets.clone()));

        let authorizer: Arc<dyn ChannelAuthorizer> = if app.broker.app_secret.is_empty() {
            api.clone()
        } else {
            info!("signing private channels locally");
            Arc::new(SecretAuthorizer::new(
                app.broker.app_key.clone(),
                app.broker.app_secret.clone(),
            ))
        };
        let broker = Broker::new(BrokerSettings::from_config(&app.broker), Some(authorizer));

        let bridge = Arc::new(NotificationBridge::new(
            session.clone(),
            broker.clone(),
            notifier.clone(),
        ));

        let user_interval = non_zero(app.polling.user_interval, DEFAULT_USER_POLL_INTERVAL);
        let unread_interval =
            non_zero(app.polling.chat_unread_interval, DEFAULT_UNREAD_POLL_INTERVAL);
        let fallback = Arc::new(Fallback::new(vec![
            Arc::new(PollingScheduler::new("user", user_interval, session.clone())),
            Arc::new(PollingScheduler::new(
                "chat_unread",
                unread_interval,
                bridge.clone(),
            )),
        ]));

        let feed = app.feed.enabled.then(|| {
            Arc::new(RateFeed::new(
                RateFeedConfig::from_config(&app.feed),
                wallets.clone(),
            ))
        });

        Ok(Self {
            conversion: ConversionFlow::new(session.clone(), notifier.clone()),
            withdrawal: WithdrawalFlow::new(session.clone(), notifier.clone()),
            cfg: app,
            version: cfg.version,
            api,
            notifier,
            wallets,
            session,
            broker,
            bridge,
            fallback,
            feed,
            started_at: Mutex::new(None),
            running: Mutex::new(false),
            shutdown: Notify::new(),
            status_changes: Arc::new(AtomicU64::new(0)),
            listener: Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
        })
    }

    pub fn from_config_path(path: &str) -> Result<Self, DeskError> {
        let config = Config::load(path)?;
        Self::new(DeskConfig::new(config))
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Brings every component up and runs until [`Desk::stop`] is called.
    pub async fn start(&self) -> Result<(), DeskError> {
        {
            let mut running = self.running.lock().await;
            if *running {
                return Err(DeskError::AlreadyRunning);
            }
            *running = true;
        }
        *self.started_at.lock().await = Some(Instant::now());

        info!(
            name = %self.cfg.app.name,
            env = %self.cfg.app.env,
            version = %self.version,
            api = %self.cfg.api.base_url,
            feed = self.feed.is_some(),
            "Starting wallet desk"
        );

        self.session.activate();
        if let Err(e) = self.session.refresh().await {
            warn!(error = %e, "initial user fetch failed, polling will retry");
        }

        let notifier = self.notifier.clone();
        let changes = self.status_changes.clone();
        let guard = self.broker.on_connection_change(move |status| {
            changes.fetch_add(1, Ordering::Relaxed);
            notifier.send_async(Event::connection(status, None));
        });
        *self.listener.lock().await = Some(guard);

        if let Err(e) = self.broker.connect() {
            warn!(error = %e, "realtime unavailable, polling only");
        }
        self.fallback.drive(self.broker.status_watch());
        self.bridge.attach().await;

        if let Some(feed) = &self.feed {
            let feed = feed.clone();
            let task = tokio::spawn(async move {
                if let Err(e) = feed.run().await {
                    error!(error = %e, "rate feed stopped");
                }
            });
            self.tasks.lock().await.push(task);
        }

        self.run_main_loop().await
    }

    /// Tears everything down. Late fetch results are discarded.
    pub async fn stop(&self) -> Result<(), DeskError> {
        {
            let mut running = self.running.lock().await;
            if !*running {
                return Ok(());
            }
            *running = false;
        }
        info!("Stopping desk...");
        self.shutdown.notify_one();

        self.session.deactivate();
        self.fallback.stop();
        self.bridge.detach().await;
        self.broker.disconnect().await;
        if let Some(feed) = &self.feed {
            feed.close().await;
        }
        for task in self.tasks.lock().await.drain(..) {
            task.abort();
        }
        self.listener.lock().await.take();

        if let Err(e) = self.notifier.close().await {
            debug!(error = %e, "failed to close notifier");
        }

        let stats = self.stats().await;
        info!(uptime = ?stats.uptime, refreshes = stats.snapshot_refreshes, "Desk stopped");
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        *self.running.lock().await
    }

    pub async fn uptime(&self) -> Duration {
        self.started_at
            .lock()
            .await
            .map(|s| s.elapsed())
            .unwrap_or(Duration::ZERO)
    }

    pub async fn stats(&self) -> Stats {
        let schedulers = self.fallback.schedulers();
        Stats {
            uptime: self.uptime().await,
            snapshot_refreshes: self.session.refreshes(),
            realtime_signals: self.bridge.signals(),
            rate_updates: self.feed.as_ref().map_or(0, |f| f.updates()),
            status_changes: self.status_changes.load(Ordering::Relaxed),
            polls_started: schedulers.iter().map(|s| s.started()).sum(),
            polls_skipped: schedulers.iter().map(|s| s.skipped()).sum(),
            polls_failed: schedulers.iter().map(|s| s.failed()).sum(),
            api_requests: self.api.request_count(),
        }
    }

    /// Sum of wallet balances at their live (or snapshot) rate, in the user's currency.
    pub fn portfolio_value(&self) -> String {
        let total: Decimal = self
            .wallets
            .wallets()
            .iter()
            .filter_map(|w| w.effective_rate().map(|rate| rate * w.balance()))
            .sum();
        let snapshot = self.session.snapshot();
        format_with_currency(
            total.to_f64().unwrap_or(0.0),
            snapshot.currency.as_ref(),
            &FormatOptions::default(),
        )
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    pub fn api(&self) -> Arc<dyn PortalApi> {
        self.api.clone()
    }

    pub fn wallets(&self) -> &Arc<WalletStore> {
        &self.wallets
    }

    pub fn broker(&self) -> &Broker {
        &self.broker
    }

    pub fn bridge(&self) -> &Arc<NotificationBridge> {
        &self.bridge
    }

    pub fn conversion(&self) -> &ConversionFlow {
        &self.conversion
    }

    pub fn withdrawal(&self) -> &WithdrawalFlow {
        &self.withdrawal
    }

    async fn run_main_loop(&self) -> Result<(), DeskError> {
        let mut status = self.broker.status_watch();
        let mut snapshots = self.session.subscribe();
        let mut rates = self.wallets.subscribe();
        let mut overview = tokio::time::interval(OVERVIEW_INTERVAL);
        overview.tick().await;

        loop {
            tokio::select! {
                _ = self.shutdown.notified() => break,
                Ok(()) = status.changed() => {
                    let current = *status.borrow_and_update();
                    info!(
                        status = %current,
                        reason = ?self.broker.failure_reason(),
                        "realtime status changed"
                    );
                }
                Ok(()) = snapshots.changed() => {
                    snapshots.borrow_and_update();
                    // the user id may only be known after the first successful fetch
                    if self.bridge.channels().is_empty() {
                        self.bridge.attach().await;
                    }
                }
                Ok(()) = rates.changed() => {
                    let version = *rates.borrow_and_update();
                    debug!(version, "wallet rates updated");
                }
                _ = overview.tick() => {
                    let stats = self.stats().await;
                    info!(
                        uptime = ?stats.uptime,
                        refreshes = stats.snapshot_refreshes,
                        signals = stats.realtime_signals,
                        rate_updates = stats.rate_updates,
                        polls = stats.polls_started,
                        poll_failures = stats.polls_failed,
                        portfolio = %self.portfolio_value(),
                        "Desk overview"
                    );
                }
            }
            if !self.is_running().await {
                break;
            }
        }
        Ok(())
    }
}

fn non_zero(value: Duration, default: Duration) -> Duration {
    if value.is_zero() { default } else { value }
}
