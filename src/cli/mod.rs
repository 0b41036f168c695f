//! CLI command handlers
//!
//! This module contains the implementation of CLI commands,
//! bridging the clap argument parsing with the service layer.

pub mod expense;
pub mod keys;
pub mod protection;

pub use expense::{handle_expense_command, ExpenseCommands};
pub use keys::{handle_key_command, KeyCommands};
pub use protection::{handle_init, handle_protection_command, ProtectionCommands};
