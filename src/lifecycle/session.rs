use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::api::{ApiError, PortalApi};
use crate::domain::UserSnapshot;
use crate::market::WalletStore;
use crate::polling::{PollError, Refresh};

/// Holds the latest user snapshot; every flow reads from here.
///
/// Snapshots are replaced wholesale. Refetches are convergent, so redundant
/// calls are harmless; results that land after [`SessionStore::deactivate`]
/// are dropped.
pub struct SessionStore {
    api: Arc<dyn PortalApi>,
    wallets: Arc<WalletStore>,
    snapshot_tx: watch::Sender<Arc<UserSnapshot>>,
    active: AtomicBool,
    epoch: AtomicU64,
    refreshes: AtomicU64,
}

impl SessionStore {
    pub fn new(api: Arc<dyn PortalApi>, wallets: Arc<WalletStore>) -> Self {
        let (snapshot_tx, _) = watch::channel(Arc::new(UserSnapshot::default()));
        Self {
            api,
            wallets,
            snapshot_tx,
            active: AtomicBool::new(true),
            epoch: AtomicU64::new(0),
            refreshes: AtomicU64::new(0),
        }
    }

    /// Fetches `GET /user` and installs the result.
    ///
    /// Returns `Ok(false)` when the result was discarded because the session
    /// ended (or restarted) while the request was in flight.
    pub async fn refresh(&self) -> Result<bool, ApiError> {
        let epoch = self.epoch.load(Ordering::Acquire);
        let user = self.api.get_user().await?;
        if !self.is_active() || self.epoch.load(Ordering::Acquire) != epoch {
            debug!("discarding user snapshot from an ended session");
            return Ok(false);
        }
        self.install(user);
        Ok(true)
    }

    fn install(&self, user: UserSnapshot) {
        self.wallets.replace_snapshot(user.wallets.clone());
        self.refreshes.fetch_add(1, Ordering::Relaxed);
        debug!(
            wallets = user.wallets.len(),
            conversions = user.conversion_requests.len(),
            withdrawals = user.withdrawal_requests.len(),
            "user snapshot replaced"
        );
        self.snapshot_tx.send_replace(Arc::new(user));
    }

    pub fn snapshot(&self) -> Arc<UserSnapshot> {
        self.snapshot_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<UserSnapshot>> {
        self.snapshot_tx.subscribe()
    }

    pub fn wallets(&self) -> &Arc<WalletStore> {
        &self.wallets
    }

    pub fn api(&self) -> &Arc<dyn PortalApi> {
        &self.api
    }

    pub fn user_id(&self) -> Option<String> {
        self.snapshot_tx.borrow().id.clone()
    }

    /// Number of snapshots installed so far.
    pub fn refreshes(&self) -> u64 {
        self.refreshes.load(Ordering::Relaxed)
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Ends the session: clears the snapshot and ignores late results.
    pub fn deactivate(&self) {
        if self.active.swap(false, Ordering::AcqRel) {
            self.epoch.fetch_add(1, Ordering::AcqRel);
            self.snapshot_tx.send_replace(Arc::new(UserSnapshot::default()));
            info!("session deactivated");
        }
    }

    pub fn activate(&self) {
        if !self.active.swap(true, Ordering::AcqRel) {
            self.epoch.fetch_add(1, Ordering::AcqRel);
            info!("session activated");
        }
    }
}

#[async_trait]
impl Refresh for SessionStore {
    async fn refresh(&self) -> Result<(), PollError> {
        SessionStore::refresh(self).await?;
        Ok(())
    }
}
