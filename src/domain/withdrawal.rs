//! Withdrawal request read model, compliance stages and their default copy.

use std::fmt;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Deserializer};

use super::{lenient, Wallet};

/// Server-side status of a withdrawal request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "Option<String>")]
pub enum WithdrawalStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl From<Option<String>> for WithdrawalStatus {
    fn from(value: Option<String>) -> Self {
        match value.as_deref().map(str::trim).map(str::to_ascii_lowercase).as_deref() {
            Some("processing") => WithdrawalStatus::Processing,
            Some("completed") | Some("complete") | Some("success") | Some("approved") => {
                WithdrawalStatus::Completed
            }
            Some("failed") | Some("rejected") | Some("declined") => WithdrawalStatus::Failed,
            Some("cancelled") | Some("canceled") => WithdrawalStatus::Cancelled,
            _ => WithdrawalStatus::Pending,
        }
    }
}

impl WithdrawalStatus {
    /// Terminal statuses end the stage loop.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            WithdrawalStatus::Completed | WithdrawalStatus::Failed | WithdrawalStatus::Cancelled
        )
    }
}

/// A compliance checkpoint the server currently requires.
///
/// The client never orders these; it shows whatever stage the server reports.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum WithdrawalStage {
    TaxClearance,
    EtfCode,
    EntityPin,
    FscsCode,
    RegulationCode,
    FundTransferPin,
    /// A stage this client has no default copy for.
    Other(String),
}

/// Display copy for a stage; server values override these when present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagePrompt {
    pub title: String,
    pub description: String,
    pub code_length: u32,
    pub percent: u32,
}

/// Code length used for stages the client doesn't know.
const FALLBACK_CODE_LENGTH: u32 = 6;

impl WithdrawalStage {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "tax_clearance" => WithdrawalStage::TaxClearance,
            "etf_code" => WithdrawalStage::EtfCode,
            "entity_pin" => WithdrawalStage::EntityPin,
            "fscs_code" => WithdrawalStage::FscsCode,
            "regulation_code" => WithdrawalStage::RegulationCode,
            "fund_transfer_pin" => WithdrawalStage::FundTransferPin,
            _ => WithdrawalStage::Other(value.trim().to_string()),
        }
    }

    /// Wire name sent back with the code.
    pub fn as_str(&self) -> &str {
        match self {
            WithdrawalStage::TaxClearance => "tax_clearance",
            WithdrawalStage::EtfCode => "etf_code",
            WithdrawalStage::EntityPin => "entity_pin",
            WithdrawalStage::FscsCode => "fscs_code",
            WithdrawalStage::RegulationCode => "regulation_code",
            WithdrawalStage::FundTransferPin => "fund_transfer_pin",
            WithdrawalStage::Other(name) => name,
        }
    }

    /// Default code length for this stage.
    pub fn default_code_length(&self) -> u32 {
        match self {
            WithdrawalStage::TaxClearance => 6,
            WithdrawalStage::EtfCode => 8,
            WithdrawalStage::EntityPin => 4,
            WithdrawalStage::FscsCode => 7,
            WithdrawalStage::RegulationCode => 8,
            WithdrawalStage::FundTransferPin => 6,
            WithdrawalStage::Other(_) => FALLBACK_CODE_LENGTH,
        }
    }

    /// Default display copy.
    pub fn defaults(&self) -> StagePrompt {
        let (title, description, percent) = match self {
            WithdrawalStage::TaxClearance => (
                "Tax clearance",
                "Enter the tax clearance code issued for this withdrawal.",
                15,
            ),
            WithdrawalStage::EtfCode => (
                "ETF code",
                "Enter the electronic funds transfer code.",
                30,
            ),
            WithdrawalStage::EntityPin => (
                "Entity PIN",
                "Enter the PIN of the receiving entity.",
                45,
            ),
            WithdrawalStage::FscsCode => (
                "FSCS code",
                "Enter the compensation scheme reference code.",
                60,
            ),
            WithdrawalStage::RegulationCode => (
                "Regulation code",
                "Enter the regulation clearance code.",
                75,
            ),
            WithdrawalStage::FundTransferPin => (
                "Fund transfer PIN",
                "Enter the final fund transfer PIN to release the withdrawal.",
                90,
            ),
            WithdrawalStage::Other(_) => ("Verification code", "Enter the code provided by support.", 0),
        };

        StagePrompt {
            title: title.to_string(),
            description: description.to_string(),
            code_length: self.default_code_length(),
            percent,
        }
    }
}

impl fmt::Display for WithdrawalStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn deserialize_stage<'de, D>(deserializer: D) -> Result<Option<WithdrawalStage>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = lenient::text::deserialize(deserializer)?;
    Ok(raw.map(|s| WithdrawalStage::parse(&s)))
}

/// A withdrawal request as reported by the backend.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WithdrawalRequest {
    #[serde(with = "lenient::id")]
    pub id: String,
    #[serde(default, with = "lenient::opt_id")]
    pub user_id: Option<String>,
    // Any of these four may identify the wallet; all are checked when matching.
    #[serde(default, with = "lenient::opt_id")]
    pub wallet_id: Option<String>,
    #[serde(default, with = "lenient::opt_id")]
    pub user_wallet_id: Option<String>,
    #[serde(default, with = "lenient::opt_id")]
    pub asset_id: Option<String>,
    #[serde(default, with = "lenient::opt_id")]
    pub from_wallet_id: Option<String>,
    #[serde(default)]
    pub status: WithdrawalStatus,
    #[serde(default, deserialize_with = "deserialize_stage")]
    pub stage: Option<WithdrawalStage>,
    #[serde(default, with = "lenient::text")]
    pub method: Option<String>,
    #[serde(default, with = "lenient::decimal")]
    pub amount: Option<Decimal>,
    #[serde(default, with = "lenient::decimal")]
    pub percent: Option<Decimal>,
    #[serde(default, with = "lenient::flag")]
    pub show_percent: Option<bool>,
    #[serde(default, with = "lenient::count")]
    pub code_length: Option<u32>,
    #[serde(default, with = "lenient::text")]
    pub title: Option<String>,
    #[serde(default, with = "lenient::text")]
    pub message: Option<String>,
}

impl WithdrawalRequest {
    /// The wallet-identifying fields that are set.
    pub fn wallet_refs(&self) -> impl Iterator<Item = &str> {
        [
            self.wallet_id.as_deref(),
            self.user_wallet_id.as_deref(),
            self.asset_id.as_deref(),
            self.from_wallet_id.as_deref(),
        ]
        .into_iter()
        .flatten()
    }

    /// True if any of the wallet's ids intersects any of this request's wallet fields.
    pub fn matches_wallet(&self, wallet: &Wallet) -> bool {
        self.wallet_refs().any(|r| wallet.has_id(r))
    }

    /// Non-terminal requests are active.
    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }

    /// Server code length when set and non-zero, otherwise the stage default.
    pub fn effective_code_length(&self) -> u32 {
        match self.code_length {
            Some(len) if len > 0 => len,
            _ => self
                .stage
                .as_ref()
                .map(WithdrawalStage::default_code_length)
                .unwrap_or(FALLBACK_CODE_LENGTH),
        }
    }

    /// Stage copy merged with the server's overrides.
    pub fn prompt(&self) -> Option<StagePrompt> {
        let stage = self.stage.as_ref()?;
        let mut prompt = stage.defaults();
        if let Some(title) = &self.title {
            prompt.title = title.clone();
        }
        if let Some(message) = &self.message {
            prompt.description = message.clone();
        }
        if let Some(percent) = self.percent.and_then(|p| p.trunc().to_u32()) {
            prompt.percent = percent.min(100);
        }
        prompt.code_length = self.effective_code_length();
        Some(prompt)
    }
}
