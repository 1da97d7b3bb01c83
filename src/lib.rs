//! Wallet desk core: the read models, request lifecycle flows, realtime
//! plumbing and polling fallback that a portal front end drives.
//!
//! The binary in `main.rs` only wires a [`desk::Desk`] from configuration;
//! everything user-facing is consumed through this library.

pub mod api;
pub mod bridge;
pub mod config;
pub mod desk;
pub mod domain;
pub mod lifecycle;
pub mod market;
pub mod notification;
pub mod polling;
pub mod quote;
pub mod realtime;

pub use desk::{Desk, DeskConfig, DeskError};
pub use lifecycle::{ConversionFlow, SessionStore, WithdrawalFlow};
