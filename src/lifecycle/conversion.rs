use std::str::FromStr;
use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::info;

use super::error::PendingFlag;
use super::{FlowError, FlowOutcome, SessionStore, ValidationError, complete_mutation};
use crate::api::ConversionUpdate;
use crate::domain::ConversionStage;
use crate::notification::Notifier;

/// Conversion flow: a projection of the active conversion request plus the
/// four user actions that advance it.
pub struct ConversionFlow {
    session: Arc<SessionStore>,
    notifier: Arc<dyn Notifier>,
    pending: PendingFlag,
}

impl ConversionFlow {
    pub fn new(session: Arc<SessionStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            session,
            notifier,
            pending: PendingFlag::default(),
        }
    }

    /// Screen to show, across all wallets.
    pub fn stage(&self) -> ConversionStage {
        self.session.snapshot().conversion_stage()
    }

    /// Screen to show on one wallet card.
    pub fn stage_for(&self, wallet_id: &str) -> ConversionStage {
        let snapshot = self.session.snapshot();
        match snapshot.wallet(wallet_id) {
            Some(wallet) => snapshot.conversion_stage_for(wallet),
            None => ConversionStage::None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_set()
    }

    /// Opens a conversion from `source_wallet_id` into `destination`.
    pub async fn submit(
        &self,
        source_wallet_id: &str,
        destination: Option<&str>,
    ) -> Result<FlowOutcome, FlowError> {
        let _guard = self.pending.acquire()?;
        let snapshot = self.session.snapshot();
        let wallet = snapshot
            .wallet(source_wallet_id)
            .ok_or(ValidationError::UnknownWallet)?;
        if wallet.balance() <= Decimal::ZERO {
            return Err(ValidationError::InsufficientBalance.into());
        }
        let destination = destination
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .ok_or(ValidationError::MissingField("destination"))?;

        info!(from = %wallet.id, to = %destination, "submitting conversion");
        let (outcome, _) = complete_mutation(
            &self.session,
            self.notifier.as_ref(),
            "conversion",
            self.session.api().create_conversion(&wallet.id, destination),
        )
        .await?;
        Ok(outcome)
    }

    /// Step 1: the fee amount.
    pub async fn submit_fee_amount(&self, amount: &str) -> Result<FlowOutcome, FlowError> {
        let _guard = self.pending.acquire()?;
        let request = match self.stage() {
            ConversionStage::AmountEntry(request) => request,
            ConversionStage::None => return Err(FlowError::NoActiveRequest("conversion")),
            _ => return Err(FlowError::InvalidState("fee amount is not expected")),
        };
        let amount = Decimal::from_str(amount.trim())
            .ok()
            .filter(|a| *a > Decimal::ZERO)
            .ok_or(ValidationError::InvalidAmount)?;

        info!(id = %request.id, %amount, "submitting conversion fee amount");
        let (outcome, _) = complete_mutation(
            &self.session,
            self.notifier.as_ref(),
            "conversion fee",
            self.session
                .api()
                .update_conversion(&request.id, &ConversionUpdate::fee_amount(amount)),
        )
        .await?;
        Ok(outcome)
    }

    /// Step 2: the user confirms the fee was paid.
    pub async fn confirm_payment(&self, confirmed: bool) -> Result<FlowOutcome, FlowError> {
        let _guard = self.pending.acquire()?;
        let request = match self.stage() {
            ConversionStage::FeePayment(request) => request,
            ConversionStage::None => return Err(FlowError::NoActiveRequest("conversion")),
            _ => return Err(FlowError::InvalidState("payment confirmation is not expected")),
        };
        if !confirmed {
            return Err(ValidationError::ConfirmationRequired.into());
        }

        info!(id = %request.id, "confirming conversion payment");
        let (outcome, _) = complete_mutation(
            &self.session,
            self.notifier.as_ref(),
            "conversion payment",
            self.session
                .api()
                .update_conversion(&request.id, &ConversionUpdate::confirm_payment()),
        )
        .await?;
        Ok(outcome)
    }

    pub async fn cancel(&self, confirmed: bool) -> Result<FlowOutcome, FlowError> {
        let _guard = self.pending.acquire()?;
        let request = self
            .stage()
            .request()
            .cloned()
            .ok_or(FlowError::NoActiveRequest("conversion"))?;
        if !confirmed {
            return Err(ValidationError::ConfirmationRequired.into());
        }

        info!(id = %request.id, "cancelling conversion");
        let (outcome, _) = complete_mutation(
            &self.session,
            self.notifier.as_ref(),
            "conversion cancel",
            self.session.api().cancel_conversion(&request.id),
        )
        .await?;
        Ok(outcome)
    }
}
