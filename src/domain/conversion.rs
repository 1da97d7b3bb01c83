//! Conversion request read model and its stage projection.

use rust_decimal::Decimal;
use serde::Deserialize;

use super::lenient;

/// Server-side status of a conversion request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "Option<String>")]
pub enum ConversionStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Cancelled,
}

impl From<Option<String>> for ConversionStatus {
    fn from(value: Option<String>) -> Self {
        match value.as_deref().map(str::trim).map(str::to_ascii_lowercase).as_deref() {
            Some("processing") => ConversionStatus::Processing,
            Some("completed") | Some("complete") | Some("success") => ConversionStatus::Completed,
            Some("cancelled") | Some("canceled") => ConversionStatus::Cancelled,
            _ => ConversionStatus::Pending,
        }
    }
}

impl ConversionStatus {
    /// Pending and processing requests are still in flight.
    pub fn is_open(self) -> bool {
        matches!(self, ConversionStatus::Pending | ConversionStatus::Processing)
    }
}

/// A conversion request as reported by the backend.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConversionRequest {
    #[serde(with = "lenient::id")]
    pub id: String,
    #[serde(default, with = "lenient::opt_id")]
    pub user_id: Option<String>,
    #[serde(default, alias = "source_wallet_id", with = "lenient::opt_id")]
    pub from_wallet_id: Option<String>,
    #[serde(default, alias = "destination_wallet_id", with = "lenient::opt_id")]
    pub to_wallet_id: Option<String>,
    #[serde(default)]
    pub status: ConversionStatus,
    /// 1 = fee amount entry, 2 = fee payment confirmation, >2 = processing.
    #[serde(default, with = "lenient::count")]
    pub step: Option<u32>,
    #[serde(default, with = "lenient::decimal")]
    pub amount: Option<Decimal>,
    #[serde(default, with = "lenient::decimal")]
    pub paid_amount: Option<Decimal>,
    #[serde(default, with = "lenient::decimal")]
    pub percent: Option<Decimal>,
    #[serde(default, with = "lenient::text")]
    pub message: Option<String>,
    #[serde(default, with = "lenient::text")]
    pub updated_at: Option<String>,
}

impl ConversionRequest {
    /// Step with the backend's implicit default of 1.
    pub fn step(&self) -> u32 {
        self.step.unwrap_or(1)
    }
}

/// Which conversion screen to present, projected from server state.
#[derive(Debug, Clone, PartialEq)]
pub enum ConversionStage {
    /// No open request.
    None,
    /// step = 1: waiting for the fee amount.
    AmountEntry(ConversionRequest),
    /// step = 2: waiting for the payment confirmation.
    FeePayment(ConversionRequest),
    /// step > 2 or status = processing.
    Processing(ConversionRequest),
}

impl ConversionStage {
    /// Projects a single request; terminal requests project to `None`.
    pub fn of(request: &ConversionRequest) -> Self {
        if !request.status.is_open() {
            return ConversionStage::None;
        }
        if request.status == ConversionStatus::Processing {
            return ConversionStage::Processing(request.clone());
        }
        match request.step() {
            0 | 1 => ConversionStage::AmountEntry(request.clone()),
            2 => ConversionStage::FeePayment(request.clone()),
            _ => ConversionStage::Processing(request.clone()),
        }
    }

    /// The request behind this stage, if any.
    pub fn request(&self) -> Option<&ConversionRequest> {
        match self {
            ConversionStage::None => None,
            ConversionStage::AmountEntry(r)
            | ConversionStage::FeePayment(r)
            | ConversionStage::Processing(r) => Some(r),
        }
    }
}

/// Picks the active request among open ones: highest step wins, ties go to
/// the earliest in server order.
pub fn select_active<'a, I>(requests: I) -> Option<&'a ConversionRequest>
where
    I: IntoIterator<Item = &'a ConversionRequest>,
{
    requests
        .into_iter()
        .filter(|r| r.status.is_open())
        .fold(None, |best: Option<&ConversionRequest>, candidate| match best {
            Some(current) if current.step() >= candidate.step() => Some(current),
            _ => Some(candidate),
        })
}

/// Derives the conversion stage from the full set of the user's requests.
pub fn derive_conversion<'a, I>(requests: I) -> ConversionStage
where
    I: IntoIterator<Item = &'a ConversionRequest>,
{
    select_active(requests)
        .map(ConversionStage::of)
        .unwrap_or(ConversionStage::None)
}

/// Same as [`derive_conversion`] restricted to one source wallet.
pub fn derive_conversion_for_wallet<'a, I>(requests: I, wallet_ids: &[&str]) -> ConversionStage
where
    I: IntoIterator<Item = &'a ConversionRequest>,
{
    derive_conversion(requests.into_iter().filter(|r| {
        r.from_wallet_id
            .as_deref()
            .is_some_and(|id| wallet_ids.contains(&id))
    }))
}
