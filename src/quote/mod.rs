//! Fee ranges and currency display.
//!
//! Pure functions: no I/O and no shared state, so the same inputs always
//! produce the same string.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use crate::domain::{Currency, Wallet};

/// Where the currency symbol goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolPosition {
    Prefix,
    Suffix,
    Hidden,
}

/// Formatting knobs for [`format_with_currency`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatOptions {
    pub min_fraction_digits: usize,
    pub max_fraction_digits: usize,
    pub symbol: SymbolPosition,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            min_fraction_digits: 2,
            max_fraction_digits: 2,
            symbol: SymbolPosition::Prefix,
        }
    }
}

impl FormatOptions {
    pub fn fraction_digits(mut self, min: usize, max: usize) -> Self {
        self.min_fraction_digits = min.min(max);
        self.max_fraction_digits = max;
        self
    }

    pub fn symbol(mut self, position: SymbolPosition) -> Self {
        self.symbol = position;
        self
    }
}

/// Labels for a conversion fee range.
#[derive(Debug, Clone, PartialEq)]
pub struct RateRangeLabel {
    pub min_percent: Decimal,
    pub max_percent: Decimal,
    /// e.g. "2.00% - 5.00%"
    pub percent: String,
    /// e.g. "$20.00 - $50.00"
    pub amount: String,
}

/// Fraction digits above this are clamped; f64 carries no more than that.
const MAX_FRACTION_DIGITS: usize = 12;

/// Converts `value` by the currency rate and formats it with grouping and symbol.
///
/// A missing currency or rate means rate 1; non-finite results format as zero.
pub fn format_with_currency(value: f64, currency: Option<&Currency>, options: &FormatOptions) -> String {
    let rate = currency
        .and_then(|c| c.rate)
        .and_then(|r| r.to_f64())
        .filter(|r| r.is_finite())
        .unwrap_or(1.0);

    let converted = value * rate;
    let converted = if converted.is_finite() { converted } else { 0.0 };

    let max = options.max_fraction_digits.min(MAX_FRACTION_DIGITS);
    let min = options.min_fraction_digits.min(max);
    let number = format_number(converted.abs(), min, max);
    let negative = converted < 0.0 && number.chars().any(|c| c.is_ascii_digit() && c != '0');
    let sign = if negative { "-" } else { "" };

    let symbol = currency.and_then(|c| c.symbol.as_deref()).unwrap_or("");
    if symbol.is_empty() {
        return format!("{}{}", sign, number);
    }

    let spacer = if needs_space(symbol) { " " } else { "" };
    match options.symbol {
        SymbolPosition::Prefix => format!("{}{}{}{}", sign, symbol, spacer, number),
        SymbolPosition::Suffix => format!("{}{}{}{}", sign, number, spacer, symbol),
        SymbolPosition::Hidden => format!("{}{}", sign, number),
    }
}

/// Percentage range and amount range for converting `amount` out of `wallet`.
///
/// Bounds absent or unparseable on the wallet count as 0; reversed bounds are swapped.
pub fn format_conversion_rate_range(
    wallet: &Wallet,
    amount: f64,
    currency: Option<&Currency>,
) -> RateRangeLabel {
    let range = wallet.conversion_rate.clone().unwrap_or_default();
    let mut min = range.min.unwrap_or_default();
    let mut max = range.max.unwrap_or_default();
    if min > max {
        std::mem::swap(&mut min, &mut max);
    }

    let options = FormatOptions::default();
    let (low, high) = if amount.is_finite() {
        (
            amount * min.to_f64().unwrap_or(0.0) / 100.0,
            amount * max.to_f64().unwrap_or(0.0) / 100.0,
        )
    } else {
        (0.0, 0.0)
    };

    RateRangeLabel {
        min_percent: min,
        max_percent: max,
        percent: format!("{}% - {}%", format_percent(min), format_percent(max)),
        amount: format!(
            "{} - {}",
            format_with_currency(low, currency, &options),
            format_with_currency(high, currency, &options)
        ),
    }
}

fn format_percent(value: Decimal) -> String {
    format_number(value.to_f64().unwrap_or(0.0), 2, 2)
}

/// Multi-character symbols ending in a word character or ')' get a space ("CHF 10", "US$10" stays tight).
fn needs_space(symbol: &str) -> bool {
    symbol.chars().count() > 1
        && symbol
            .chars()
            .last()
            .is_some_and(|c| c.is_alphanumeric() || c == '_' || c == ')')
}

/// Formats a non-negative number with `,` grouping and between `min` and `max` fraction digits.
fn format_number(value: f64, min: usize, max: usize) -> String {
    let fixed = format!("{:.*}", max, value.abs());
    let (int_part, frac_part) = match fixed.split_once('.') {
        Some((i, f)) => (i, f),
        None => (fixed.as_str(), ""),
    };

    let mut frac = frac_part.to_string();
    while frac.len() > min && frac.ends_with('0') {
        frac.pop();
    }

    let grouped = group_thousands(int_part);
    if frac.is_empty() {
        grouped
    } else {
        format!("{}.{}", grouped, frac)
    }
}

/// Inserts thousands separators.
fn group_thousands(digits: &str) -> String {
    let mut result = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}
