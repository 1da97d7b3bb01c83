use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rust_decimal::Decimal;
use tracing::info;

use super::error::PendingFlag;
use super::{FlowError, FlowOutcome, SessionStore, ValidationError, complete_mutation};
use crate::api::{WithdrawalMethod, WithdrawalSubmission};
use crate::domain::{StagePrompt, WithdrawalRequest, WithdrawalStatus};
use crate::notification::Notifier;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodKind {
    Crypto,
    Bank,
}

impl MethodKind {
    fn of(method: &WithdrawalMethod) -> Self {
        match method {
            WithdrawalMethod::Crypto { .. } => MethodKind::Crypto,
            WithdrawalMethod::Bank { .. } => MethodKind::Bank,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusOutcome {
    Success,
    Failed,
    Pending,
}

impl StatusOutcome {
    fn default_message(self) -> &'static str {
        match self {
            StatusOutcome::Success => "Your withdrawal has been completed.",
            StatusOutcome::Failed => "Your withdrawal could not be completed.",
            StatusOutcome::Pending => "Your withdrawal is being processed.",
        }
    }
}

/// Final screen of a withdrawal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusView {
    pub outcome: StatusOutcome,
    pub message: String,
    pub request_id: Option<String>,
}

impl StatusView {
    fn from_request(request: &WithdrawalRequest, fallback: Option<&str>) -> Self {
        let outcome = match request.status {
            WithdrawalStatus::Completed => StatusOutcome::Success,
            WithdrawalStatus::Failed | WithdrawalStatus::Cancelled => StatusOutcome::Failed,
            WithdrawalStatus::Pending | WithdrawalStatus::Processing => StatusOutcome::Pending,
        };
        let message = request
            .message
            .as_deref()
            .or(fallback)
            .unwrap_or(outcome.default_message())
            .to_string();
        Self {
            outcome,
            message,
            request_id: Some(request.id.clone()),
        }
    }
}

/// What the withdrawal surface shows.
#[derive(Debug, Clone, PartialEq)]
pub enum WithdrawalView {
    None,
    MethodSelection { wallet_id: String },
    DetailEntry { wallet_id: String, method: MethodKind },
    /// The server-reported stage of the active request and its merged copy.
    StageLoop {
        request: WithdrawalRequest,
        prompt: StagePrompt,
    },
    Status(StatusView),
}

/// Pre-creation and post-terminal state; everything in between comes from the server.
#[derive(Debug, Clone, Default, PartialEq)]
enum Draft {
    #[default]
    Idle,
    Selecting { wallet_id: String },
    Details { wallet_id: String, method: MethodKind },
    Status(StatusView),
}

pub struct WithdrawalFlow {
    session: Arc<SessionStore>,
    notifier: Arc<dyn Notifier>,
    pending: PendingFlag,
    draft: Mutex<Draft>,
}

impl WithdrawalFlow {
    pub fn new(session: Arc<SessionStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            session,
            notifier,
            pending: PendingFlag::default(),
            draft: Mutex::new(Draft::Idle),
        }
    }

    fn draft(&self) -> MutexGuard<'_, Draft> {
        self.draft.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn view(&self) -> WithdrawalView {
        let draft = self.draft().clone();
        if let Draft::Status(status) = &draft {
            return WithdrawalView::Status(status.clone());
        }
        let snapshot = self.session.snapshot();
        if let Some(request) = snapshot.active_withdrawal() {
            return match request.prompt() {
                Some(prompt) => WithdrawalView::StageLoop {
                    request: request.clone(),
                    prompt,
                },
                None => WithdrawalView::Status(StatusView::from_request(request, None)),
            };
        }
        match draft {
            Draft::Idle => WithdrawalView::None,
            Draft::Selecting { wallet_id } => WithdrawalView::MethodSelection { wallet_id },
            Draft::Details { wallet_id, method } => WithdrawalView::DetailEntry { wallet_id, method },
            Draft::Status(status) => WithdrawalView::Status(status),
        }
    }

    /// The active withdrawal if it belongs to the given wallet card.
    pub fn active_for(&self, wallet_id: &str) -> Option<WithdrawalRequest> {
        let snapshot = self.session.snapshot();
        let wallet = snapshot.wallet(wallet_id)?;
        snapshot.active_withdrawal_for(wallet).cloned()
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_set()
    }

    /// Opens method selection for a wallet.
    pub fn begin(&self, wallet_id: &str) -> Result<(), FlowError> {
        let snapshot = self.session.snapshot();
        if snapshot.active_withdrawal().is_some() {
            return Err(FlowError::InvalidState("a withdrawal is already in progress"));
        }
        let wallet = snapshot
            .wallet(wallet_id)
            .ok_or(ValidationError::UnknownWallet)?;
        *self.draft() = Draft::Selecting {
            wallet_id: wallet.id.clone(),
        };
        Ok(())
    }

    pub fn select_method(&self, method: MethodKind) -> Result<(), FlowError> {
        let mut draft = self.draft();
        let wallet_id = match &*draft {
            Draft::Selecting { wallet_id } | Draft::Details { wallet_id, .. } => wallet_id.clone(),
            _ => return Err(FlowError::InvalidState("no withdrawal draft")),
        };
        *draft = Draft::Details { wallet_id, method };
        Ok(())
    }

    /// One step back through the local draft.
    pub fn back(&self) {
        let mut draft = self.draft();
        *draft = match &*draft {
            Draft::Details { wallet_id, .. } => Draft::Selecting {
                wallet_id: wallet_id.clone(),
            },
            Draft::Selecting { .. } => Draft::Idle,
            other => other.clone(),
        };
    }

    /// Creates the withdrawal request from the draft.
    pub async fn submit_details(
        &self,
        method: WithdrawalMethod,
        amount: &str,
    ) -> Result<FlowOutcome, FlowError> {
        let _guard = self.pending.acquire()?;
        let wallet_id = match &*self.draft() {
            Draft::Details { wallet_id, method: kind } if *kind == MethodKind::of(&method) => {
                wallet_id.clone()
            }
            Draft::Details { .. } => {
                return Err(FlowError::InvalidState("details do not match the selected method"));
            }
            _ => return Err(FlowError::InvalidState("no withdrawal draft")),
        };
        validate_method(&method)?;

        let snapshot = self.session.snapshot();
        let wallet = snapshot
            .wallet(&wallet_id)
            .ok_or(ValidationError::UnknownWallet)?;
        let amount = Decimal::from_str(amount.trim())
            .ok()
            .filter(|a| *a > Decimal::ZERO)
            .ok_or(ValidationError::InvalidAmount)?;
        if amount > wallet.balance() {
            return Err(ValidationError::AmountExceedsBalance.into());
        }

        let submission = WithdrawalSubmission {
            wallet_id: wallet.id.clone(),
            amount,
            method,
        };
        info!(wallet = %submission.wallet_id, method = submission.method.name(), %amount, "submitting withdrawal");
        let (outcome, _) = complete_mutation(
            &self.session,
            self.notifier.as_ref(),
            "withdrawal",
            self.session.api().submit_withdrawal(&submission),
        )
        .await?;
        *self.draft() = Draft::Idle;
        Ok(outcome)
    }

    /// Submits the code for whatever stage the server currently reports.
    pub async fn submit_code(&self, code: &str) -> Result<FlowOutcome, FlowError> {
        let _guard = self.pending.acquire()?;
        let request = self
            .session
            .snapshot()
            .active_withdrawal()
            .cloned()
            .ok_or(FlowError::NoActiveRequest("withdrawal"))?;
        let stage = request
            .stage
            .clone()
            .ok_or(FlowError::InvalidState("no stage awaiting a code"))?;
        let expected = request.effective_code_length();
        let actual = code.chars().count() as u32;
        if actual != expected {
            return Err(ValidationError::CodeLength { expected, actual }.into());
        }

        info!(id = %request.id, stage = %stage, "submitting withdrawal stage code");
        let (outcome, returned) = complete_mutation(
            &self.session,
            self.notifier.as_ref(),
            "withdrawal stage",
            self.session
                .api()
                .update_withdrawal_stage(&request.id, stage.as_str(), code),
        )
        .await?;

        let latest = returned.or_else(|| {
            self.session
                .snapshot()
                .withdrawals()
                .into_iter()
                .find(|r| r.id == request.id)
                .cloned()
        });
        if let Some(latest) = latest.filter(|r| r.status.is_terminal()) {
            info!(id = %latest.id, status = ?latest.status, "withdrawal finished");
            *self.draft() = Draft::Status(StatusView::from_request(
                &latest,
                outcome.message.as_deref(),
            ));
        }
        Ok(outcome)
    }

    /// Cancels the active request, or drops the local draft when none exists yet.
    pub async fn cancel(&self, confirmed: bool) -> Result<FlowOutcome, FlowError> {
        let _guard = self.pending.acquire()?;
        let active = self.session.snapshot().active_withdrawal().cloned();
        let Some(request) = active else {
            let mut draft = self.draft();
            if *draft == Draft::Idle {
                return Err(FlowError::NoActiveRequest("withdrawal"));
            }
            *draft = Draft::Idle;
            return Ok(FlowOutcome::default());
        };
        if !confirmed {
            return Err(ValidationError::ConfirmationRequired.into());
        }

        info!(id = %request.id, "cancelling withdrawal");
        let (outcome, _) = complete_mutation(
            &self.session,
            self.notifier.as_ref(),
            "withdrawal cancel",
            self.session.api().cancel_withdrawal(&request.id),
        )
        .await?;
        *self.draft() = Draft::Idle;
        Ok(outcome)
    }

    /// Closes the terminal status screen.
    pub fn dismiss_status(&self) {
        let mut draft = self.draft();
        if matches!(*draft, Draft::Status(_)) {
            *draft = Draft::Idle;
        }
    }
}

fn validate_method(method: &WithdrawalMethod) -> Result<(), ValidationError> {
    let required: Vec<(&'static str, &str)> = match method {
        WithdrawalMethod::Crypto { address, .. } => vec![("address", address.as_str())],
        WithdrawalMethod::Bank {
            bank_name,
            account_name,
            account_number,
            ..
        } => vec![
            ("bank_name", bank_name.as_str()),
            ("account_name", account_name.as_str()),
            ("account_number", account_number.as_str()),
        ],
    };
    match required.into_iter().find(|(_, value)| value.trim().is_empty()) {
        Some((name, _)) => Err(ValidationError::MissingField(name)),
        None => Ok(()),
    }
}
