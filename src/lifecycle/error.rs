//! Lifecycle errors and the mapping of server field errors onto form slots.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::api::{ApiError, ServerError};

/// Client-side validation failures; none of these reach the network.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("wallet not found")]
    UnknownWallet,
    #[error("wallet balance is zero")]
    InsufficientBalance,
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error("amount must be a positive number")]
    InvalidAmount,
    #[error("amount exceeds wallet balance")]
    AmountExceedsBalance,
    #[error("code must be {expected} characters, got {actual}")]
    CodeLength { expected: u32, actual: u32 },
    #[error("explicit confirmation is required")]
    ConfirmationRequired,
}

/// Error returned by every flow action.
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Server(ServerError),
    #[error("request failed: {0}")]
    Transport(String),
    #[error("another request is already in progress")]
    Busy,
    #[error("no active {0} request")]
    NoActiveRequest(&'static str),
    #[error("action not available: {0}")]
    InvalidState(&'static str),
}

impl From<ApiError> for FlowError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Server(server) => FlowError::Server(server),
            other => FlowError::Transport(other.to_string()),
        }
    }
}

impl FlowError {
    /// Server field errors grouped by form slot.
    pub fn field_errors(&self) -> FieldErrors {
        let mut out = FieldErrors::default();
        if let FlowError::Server(server) = self {
            for (name, messages) in &server.fields {
                match field_slot(name) {
                    Some(slot) => out
                        .slots
                        .entry(slot)
                        .or_default()
                        .extend(messages.iter().cloned()),
                    None => out.unmapped.extend(messages.iter().cloned()),
                }
            }
        }
        out
    }

    /// Whether the error should also be raised as a toast.
    ///
    /// Validation and busy errors stay inline; server errors are toasted only when
    /// no field could absorb them.
    pub fn wants_toast(&self) -> bool {
        match self {
            FlowError::Validation(_) | FlowError::Busy => false,
            FlowError::Server(server) => {
                server.fields.is_empty() || !self.field_errors().unmapped.is_empty()
            }
            _ => true,
        }
    }

    /// Secondary line for toasts.
    pub fn description(&self) -> Option<&str> {
        match self {
            FlowError::Server(server) => server.description.as_deref(),
            _ => None,
        }
    }
}

/// Form inputs a server field error can be attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FieldSlot {
    Amount,
    Code,
    Destination,
    SourceWallet,
    Address,
    BankDetails,
    Confirmation,
}

/// Maps a server field name onto a form slot.
pub fn field_slot(name: &str) -> Option<FieldSlot> {
    let slot = match name {
        "amount" | "fee_amount" | "paid_amount" => FieldSlot::Amount,
        "code" | "stage_code" | "pin" => FieldSlot::Code,
        "to_wallet_id" | "destination" | "to_currency" => FieldSlot::Destination,
        "from_wallet_id" | "wallet_id" | "user_wallet_id" | "asset_id" => FieldSlot::SourceWallet,
        "address" | "wallet_address" | "network" => FieldSlot::Address,
        "bank_name" | "account_name" | "account_number" | "routing_number" | "swift_code" => {
            FieldSlot::BankDetails
        }
        "confirmed_payment" | "confirmation" => FieldSlot::Confirmation,
        _ => return None,
    };
    Some(slot)
}

/// Field errors split into slotted and unmapped messages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldErrors {
    pub slots: BTreeMap<FieldSlot, Vec<String>>,
    pub unmapped: Vec<String>,
}

impl FieldErrors {
    pub fn get(&self, slot: FieldSlot) -> &[String] {
        self.slots.get(&slot).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty() && self.unmapped.is_empty()
    }
}

/// Result of a successful flow action.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlowOutcome {
    pub message: Option<String>,
    pub description: Option<String>,
    /// False when the follow-up refetch failed; the next refresh converges.
    pub refreshed: bool,
}

/// At most one mutation in flight per flow.
#[derive(Debug, Default)]
pub(crate) struct PendingFlag(AtomicBool);

impl PendingFlag {
    pub fn acquire(&self) -> Result<PendingGuard<'_>, FlowError> {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| PendingGuard(&self.0))
            .map_err(|_| FlowError::Busy)
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

pub(crate) struct PendingGuard<'a>(&'a AtomicBool);

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
