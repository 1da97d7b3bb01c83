//! Display currency.

use rust_decimal::Decimal;
use serde::Deserialize;

use super::lenient;

/// The user's display currency: amounts are multiplied by `rate` before formatting.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Currency {
    #[serde(default)]
    pub code: String,
    #[serde(default, with = "lenient::text")]
    pub symbol: Option<String>,
    #[serde(default, alias = "exchange_rate", with = "lenient::decimal")]
    pub rate: Option<Decimal>,
}

impl Currency {
    pub fn new(code: impl Into<String>, symbol: impl Into<String>, rate: Decimal) -> Self {
        Self {
            code: code.into(),
            symbol: Some(symbol.into()),
            rate: Some(rate),
        }
    }

    /// US dollar at rate 1.
    pub fn usd() -> Self {
        Self::new("USD", "$", Decimal::ONE)
    }
}
