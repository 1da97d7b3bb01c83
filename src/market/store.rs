//! Shared wallet state: snapshot fields from the session, rate fields from the feed.

use std::sync::RwLock;

use rust_decimal::Decimal;
use tokio::sync::watch;
use tracing::debug;

use super::resolver::SymbolIndex;
use crate::domain::{Asset, Wallet};

struct Inner {
    wallets: Vec<Wallet>,
    index: SymbolIndex,
}

/// Read-mostly wallet list with two writers that never touch the same fields:
/// the snapshot sync (`replace_snapshot`) and the rate feed (`apply_assets`).
pub struct WalletStore {
    inner: RwLock<Inner>,
    version_tx: watch::Sender<u64>,
}

impl WalletStore {
    pub fn new() -> Self {
        let (version_tx, _) = watch::channel(0);
        Self {
            inner: RwLock::new(Inner {
                wallets: Vec::new(),
                index: SymbolIndex::default(),
            }),
            version_tx,
        }
    }

    /// Replaces the wallet list from a backend snapshot and rebuilds the symbol index.
    ///
    /// Feed-owned fields survive for wallets that keep their id.
    pub fn replace_snapshot(&self, wallets: Vec<Wallet>) {
        {
            let mut inner = self.write();
            let mut wallets = wallets;
            for wallet in wallets.iter_mut() {
                if let Some(previous) = inner.wallets.iter().find(|w| w.id == wallet.id) {
                    wallet.keep_realtime_from(previous);
                }
            }
            inner.index = SymbolIndex::build(&wallets);
            inner.wallets = wallets;
            debug!(wallets = inner.wallets.len(), symbols = inner.index.len(), "wallet snapshot replaced");
        }
        self.bump();
    }

    /// Applies feed quotes; returns how many wallets were updated.
    ///
    /// Assets without a numeric price or without a matching wallet are dropped.
    pub fn apply_assets(&self, assets: &[Asset]) -> usize {
        let mut applied = 0;
        {
            let mut inner = self.write();
            for asset in assets {
                let Some(price) = asset.price.and_then(|p| Decimal::try_from(p).ok()) else {
                    continue;
                };
                let Some(position) = inner.index.resolve(asset) else {
                    continue;
                };
                let Some(wallet) = inner.wallets.get_mut(position) else {
                    continue;
                };

                wallet.realtime_rate = Some(price);
                if let Some(change) = asset.change_24h.and_then(|c| Decimal::try_from(c).ok()) {
                    wallet.change_24h = Some(change);
                }
                if let Some(symbol) = &asset.symbol {
                    wallet.feed_symbol = Some(symbol.clone());
                }
                applied += 1;
            }
        }
        if applied > 0 {
            self.bump();
        }
        applied
    }

    /// Copy of the current wallet list.
    pub fn wallets(&self) -> Vec<Wallet> {
        self.read().wallets.clone()
    }

    /// Copy of one wallet looked up by any of its ids.
    pub fn get(&self, id: &str) -> Option<Wallet> {
        self.read().wallets.iter().find(|w| w.has_id(id)).cloned()
    }

    /// Receiver that changes on every write.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.version_tx.subscribe()
    }

    fn bump(&self) {
        self.version_tx.send_modify(|v| *v = v.wrapping_add(1));
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for WalletStore {
    fn default() -> Self {
        Self::new()
    }
}
