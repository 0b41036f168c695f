//! Display formatting for terminal output
//!
//! Formats group key listings and decrypted expenses as plain-text tables.

pub mod expense;
pub mod group_key;

pub use expense::{format_decrypted_list, format_expense_fields};
pub use group_key::{format_group_key_details, format_group_key_list};
