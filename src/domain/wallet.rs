//! Wallet read model, cached from the user snapshot.

use rust_decimal::Decimal;
use serde::Deserialize;

use super::lenient;

/// Percentage range charged for a conversion out of this wallet.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RateRange {
    #[serde(default, with = "lenient::decimal")]
    pub min: Option<Decimal>,
    #[serde(default, with = "lenient::decimal")]
    pub max: Option<Decimal>,
}

/// A wallet/asset owned by the backend.
///
/// Only the `realtime_*`/`change_24h`/`feed_symbol` fields are written
/// client-side (by the rate feed); everything else comes from the snapshot.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Wallet {
    #[serde(with = "lenient::id")]
    pub id: String,
    #[serde(default, with = "lenient::opt_id")]
    pub wallet_id: Option<String>,
    #[serde(default, with = "lenient::opt_id")]
    pub asset_id: Option<String>,
    #[serde(default)]
    pub name: String,
    /// Feed-facing symbol; takes precedence over `symbol` for live matching.
    #[serde(default, with = "lenient::text")]
    pub sym: Option<String>,
    #[serde(default, with = "lenient::text")]
    pub symbol: Option<String>,
    /// Backend rate snapshot.
    #[serde(default, with = "lenient::decimal")]
    pub rate: Option<Decimal>,
    #[serde(default, with = "lenient::decimal")]
    pub balance: Option<Decimal>,
    #[serde(default)]
    pub conversion_rate: Option<RateRange>,
    #[serde(default, with = "lenient::text")]
    pub category: Option<String>,
    #[serde(default, with = "lenient::text")]
    pub icon: Option<String>,

    #[serde(skip)]
    pub realtime_rate: Option<Decimal>,
    #[serde(skip)]
    pub change_24h: Option<Decimal>,
    #[serde(skip)]
    pub feed_symbol: Option<String>,
}

impl Wallet {
    /// Creates a wallet with only an id and display name set.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            wallet_id: None,
            asset_id: None,
            name: name.into(),
            sym: None,
            symbol: None,
            rate: None,
            balance: None,
            conversion_rate: None,
            category: None,
            icon: None,
            realtime_rate: None,
            change_24h: None,
            feed_symbol: None,
        }
    }

    /// Live rate when the feed has one, the snapshot rate otherwise.
    pub fn effective_rate(&self) -> Option<Decimal> {
        self.realtime_rate.or(self.rate)
    }

    /// Balance, treating an absent value as zero.
    pub fn balance(&self) -> Decimal {
        self.balance.unwrap_or_default()
    }

    /// Every id this wallet may be referenced by.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.id.as_str())
            .chain(self.wallet_id.as_deref())
            .chain(self.asset_id.as_deref())
    }

    /// Returns true if any of this wallet's ids equals `id`.
    pub fn has_id(&self, id: &str) -> bool {
        self.ids().any(|own| own == id)
    }

    /// Carries the feed-owned fields over from an older copy of the same wallet.
    pub(crate) fn keep_realtime_from(&mut self, previous: &Wallet) {
        self.realtime_rate = previous.realtime_rate;
        self.change_24h = previous.change_24h;
        self.feed_symbol = previous.feed_symbol.clone();
    }
}
