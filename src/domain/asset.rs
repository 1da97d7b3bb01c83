//! Price records delivered by the market feed.

use serde::Deserialize;

use super::lenient;

/// One asset quote from the streaming feed. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Asset {
    #[serde(default, with = "lenient::text")]
    pub symbol: Option<String>,
    #[serde(default, with = "lenient::text")]
    pub name: Option<String>,
    #[serde(default, with = "lenient::float")]
    pub price: Option<f64>,
    /// "EXCHANGE:TICKER" market identifier.
    #[serde(default, alias = "market", alias = "tv_symbol", with = "lenient::text")]
    pub market_id: Option<String>,
    #[serde(
        default,
        alias = "percent_change_24h",
        alias = "change_percent",
        with = "lenient::float"
    )]
    pub change_24h: Option<f64>,
    #[serde(default, with = "lenient::text")]
    pub category: Option<String>,
    #[serde(default, with = "lenient::text")]
    pub last_updated: Option<String>,
}

impl Asset {
    /// Convenience constructor for a symbol/price pair.
    pub fn priced(symbol: impl Into<String>, price: f64) -> Self {
        Self {
            symbol: Some(symbol.into()),
            price: Some(price),
            ..Self::default()
        }
    }

    /// Ticker part of the market id: after the colon, or the whole id.
    pub fn market_ticker(&self) -> Option<&str> {
        let market = self.market_id.as_deref()?;
        Some(market.split_once(':').map(|(_, ticker)| ticker).unwrap_or(market))
    }

    /// First segment of the display name split on '/'.
    pub fn name_head(&self) -> Option<&str> {
        self.name.as_deref().and_then(|n| n.split('/').next())
    }
}
