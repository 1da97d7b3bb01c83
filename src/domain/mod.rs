//! Read models shared by every component: wallets, requests, the user snapshot.

pub mod lenient;

mod asset;
mod conversion;
mod currency;
mod notification;
mod user;
mod wallet;
mod withdrawal;

pub use asset::Asset;
pub use conversion::{
    ConversionRequest, ConversionStage, ConversionStatus, derive_conversion,
    derive_conversion_for_wallet, select_active,
};
pub use currency::Currency;
pub use notification::{ChatMessage, ChatPage, Notification};
pub use user::UserSnapshot;
pub use wallet::{RateRange, Wallet};
pub use withdrawal::{StagePrompt, WithdrawalRequest, WithdrawalStage, WithdrawalStatus};
