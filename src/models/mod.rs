//! Core data models for splitcrypt
//!
//! This module contains the data structures the encryption layer works on:
//! identifiers, rotation tags, expense fields and group master key rows.

pub mod expense;
pub mod group_key;
pub mod ids;
pub mod money;
pub mod rotation;

pub use expense::{DecryptedExpense, EncryptedExpense, EncryptedField, ExpenseField, ExpenseFields};
pub use group_key::GroupMasterKey;
pub use ids::{ExpenseId, GroupId, UserId};
pub use money::Money;
pub use rotation::RotationTag;
