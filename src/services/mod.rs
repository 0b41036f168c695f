//! Service layer for splitcrypt
//!
//! The service layer sits on top of storage and crypto: group key lifecycle,
//! expense field encryption and batch owner recovery.

pub mod cancellation;
pub mod expense_crypto;
pub mod group_keys;

pub use cancellation::{Cancellation, NeverCancelled};
pub use expense_crypto::ExpenseCryptoService;
pub use group_keys::{GroupKeyService, GroupKeySummary};
