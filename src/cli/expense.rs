//! Expense encryption CLI commands
//!
//! Encrypted expenses are exchanged as JSON files so the commands can sit
//! in front of any expense store.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use clap::Subcommand;
use serde::Serialize;

use crate::config::settings::Settings;
use crate::crypto::FieldCipher;
use crate::display::{format_decrypted_list, format_expense_fields};
use crate::error::{SplitError, SplitResult};
use crate::models::{EncryptedExpense, ExpenseFields, ExpenseId, Money, RotationTag, UserId};
use crate::services::{ExpenseCryptoService, NeverCancelled};
use crate::storage::{write_json_atomic, Storage};

use super::keys::parse_group;
use super::protection::unlock;

/// Expense subcommands
#[derive(Subcommand)]
pub enum ExpenseCommands {
    /// Encrypt an expense's fields as a member
    Encrypt {
        /// Acting member (user UUID)
        #[arg(short, long)]
        user: String,
        /// Group UUID
        #[arg(short, long)]
        group: String,
        /// Rotation tag
        #[arg(short, long)]
        tag: String,
        /// Expense title
        #[arg(long)]
        title: String,
        /// Expense date (YYYY-MM-DD)
        #[arg(long)]
        date: String,
        /// Amount (e.g., "42.50")
        #[arg(long, allow_hyphen_values = true)]
        amount: String,
        /// Description
        #[arg(long, default_value = "")]
        description: String,
        /// Write the encrypted record here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Decrypt an expense whose owner is known
    Decrypt {
        /// Owner (user UUID)
        #[arg(short, long)]
        user: String,
        /// Group UUID
        #[arg(short, long)]
        group: String,
        /// Rotation tag
        #[arg(short, long)]
        tag: String,
        /// JSON file holding one encrypted expense
        file: PathBuf,
        /// Print JSON instead of a summary
        #[arg(long)]
        json: bool,
    },

    /// Decrypt a batch of expenses, recovering each one's owner from the candidates
    Recover {
        /// Group UUID
        #[arg(short, long)]
        group: String,
        /// Rotation tag
        #[arg(short, long)]
        tag: String,
        /// Candidate members (user UUIDs, comma separated or repeated)
        #[arg(short, long = "candidate", value_delimiter = ',', required = true)]
        candidates: Vec<String>,
        /// JSON file holding an array of encrypted expenses
        file: PathBuf,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

/// Handle expense commands
pub fn handle_expense_command(
    settings: &Settings,
    storage: &Storage,
    cmd: ExpenseCommands,
) -> SplitResult<()> {
    let protector = unlock(settings)?;
    let service = ExpenseCryptoService::new(
        &storage.group_keys,
        &protector,
        FieldCipher::new(settings.field_format),
        settings.derivation,
    )?;

    match cmd {
        ExpenseCommands::Encrypt {
            user,
            group,
            tag,
            title,
            date,
            amount,
            description,
            output,
        } => {
            let date = NaiveDate::parse_from_str(&date, "%Y-%m-%d").map_err(|e| {
                SplitError::Validation(format!("Invalid date '{}': {}. Use YYYY-MM-DD", date, e))
            })?;
            let amount = Money::parse(&amount)
                .map_err(|e| SplitError::Validation(format!("Invalid amount: {}", e)))?;
            let fields = ExpenseFields::new(title, date, amount, description);

            let encrypted = service.encrypt_expense(
                &parse_user(&user)?,
                &parse_group(&group)?,
                &RotationTag::new(tag),
                ExpenseId::new(),
                &fields,
            )?;

            emit_json(&encrypted, output.as_deref())?;
        }
        ExpenseCommands::Decrypt {
            user,
            group,
            tag,
            file,
            json,
        } => {
            let expense: EncryptedExpense = read_input(&file)?;
            let fields = service.decrypt_expense(
                &parse_user(&user)?,
                &parse_group(&group)?,
                &RotationTag::new(tag),
                &expense,
                &NeverCancelled,
            )?;

            if json {
                emit_json(&fields, None)?;
            } else {
                print!("{}", format_expense_fields(&fields));
            }
        }
        ExpenseCommands::Recover {
            group,
            tag,
            candidates,
            file,
            json,
        } => {
            let expenses: Vec<EncryptedExpense> = read_input(&file)?;
            let candidates = candidates
                .iter()
                .map(|c| parse_user(c))
                .collect::<SplitResult<Vec<_>>>()?;

            let recovered = service.decrypt_expenses_for_candidates(
                &parse_group(&group)?,
                &candidates,
                &expenses,
                &RotationTag::new(tag),
                &NeverCancelled,
            )?;

            if json {
                emit_json(&recovered, None)?;
            } else {
                println!("{}", format_decrypted_list(&recovered));
                let missing = expenses.len() - recovered.len();
                if missing > 0 {
                    println!("{} record(s) could not be decrypted by any candidate.", missing);
                }
            }
        }
    }

    Ok(())
}

fn parse_user(s: &str) -> SplitResult<UserId> {
    s.parse()
        .map_err(|e| SplitError::Validation(format!("Invalid user id '{}': {}", s, e)))
}

fn read_input<T: serde::de::DeserializeOwned>(path: &Path) -> SplitResult<T> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| SplitError::Io(format!("Failed to read {}: {}", path.display(), e)))?;
    serde_json::from_str(&contents)
        .map_err(|e| SplitError::Json(format!("Failed to parse {}: {}", path.display(), e)))
}

fn emit_json<T: Serialize>(value: &T, output: Option<&Path>) -> SplitResult<()> {
    match output {
        Some(path) => {
            write_json_atomic(path, value)?;
            println!("Wrote {}", path.display());
        }
        None => println!("{}", serde_json::to_string_pretty(value)?),
    }
    Ok(())
}
