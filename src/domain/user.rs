//! The full user snapshot returned by `GET /user`.

use serde::Deserialize;

use super::{
    lenient, ConversionRequest, ConversionStage, Currency, Notification, Wallet, WithdrawalRequest,
    derive_conversion, derive_conversion_for_wallet,
};

/// Single source of truth for the lifecycle engine; always replaced wholesale.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct UserSnapshot {
    #[serde(default, with = "lenient::opt_id")]
    pub id: Option<String>,
    #[serde(default, with = "lenient::text")]
    pub name: Option<String>,
    #[serde(default, with = "lenient::text")]
    pub email: Option<String>,
    #[serde(default, alias = "assets")]
    pub wallets: Vec<Wallet>,
    #[serde(default)]
    pub conversion_requests: Vec<ConversionRequest>,
    #[serde(default)]
    pub active_conversion_request: Option<ConversionRequest>,
    #[serde(default)]
    pub withdrawal_requests: Vec<WithdrawalRequest>,
    #[serde(default)]
    pub active_withdrawal_request: Option<WithdrawalRequest>,
    #[serde(default)]
    pub notifications: Vec<Notification>,
    #[serde(default)]
    pub currency: Option<Currency>,
}

impl UserSnapshot {
    /// All known conversion requests, the nested active one first, deduplicated by id.
    pub fn conversions(&self) -> Vec<&ConversionRequest> {
        let mut out: Vec<&ConversionRequest> = Vec::new();
        for r in self
            .active_conversion_request
            .iter()
            .chain(self.conversion_requests.iter())
        {
            if !out.iter().any(|seen| seen.id == r.id) {
                out.push(r);
            }
        }
        out
    }

    /// All known withdrawal requests, the nested active one first, deduplicated by id.
    pub fn withdrawals(&self) -> Vec<&WithdrawalRequest> {
        let mut out: Vec<&WithdrawalRequest> = Vec::new();
        for r in self
            .active_withdrawal_request
            .iter()
            .chain(self.withdrawal_requests.iter())
        {
            if !out.iter().any(|seen| seen.id == r.id) {
                out.push(r);
            }
        }
        out
    }

    /// The conversion stage to present.
    pub fn conversion_stage(&self) -> ConversionStage {
        derive_conversion(self.conversions())
    }

    /// The conversion stage for one source wallet card.
    pub fn conversion_stage_for(&self, wallet: &Wallet) -> ConversionStage {
        let ids: Vec<&str> = wallet.ids().collect();
        derive_conversion_for_wallet(self.conversions(), &ids)
    }

    /// The single non-terminal withdrawal, if any.
    pub fn active_withdrawal(&self) -> Option<&WithdrawalRequest> {
        self.withdrawals().into_iter().find(|r| r.is_active())
    }

    /// The active withdrawal if it belongs to `wallet`.
    pub fn active_withdrawal_for(&self, wallet: &Wallet) -> Option<&WithdrawalRequest> {
        self.active_withdrawal().filter(|r| r.matches_wallet(wallet))
    }

    /// Looks a wallet up by any of its ids.
    pub fn wallet(&self, id: &str) -> Option<&Wallet> {
        self.wallets.iter().find(|w| w.has_id(id))
    }

    /// First unread notification, in server order.
    pub fn first_unread(&self) -> Option<&Notification> {
        self.notifications.iter().find(|n| n.is_unread())
    }
}
