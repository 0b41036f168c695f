//! Expense field models
//!
//! Plaintext expense fields as the expense layer sees them, and their
//! encrypted storage form. Each encrypted column is a self-contained base64
//! string that carries no indication of which key produced it.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::{ExpenseId, UserId};
use super::money::Money;

/// Date format used for the plaintext of the date field
pub const FIELD_DATE_FORMAT: &str = "%Y-%m-%d";

/// The four shared expense fields in plaintext
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpenseFields {
    /// Short title ("Groceries", "Train tickets")
    pub title: String,

    /// Date the expense was incurred
    pub date: NaiveDate,

    /// Amount paid
    pub amount: Money,

    /// Free-form description
    #[serde(default)]
    pub description: String,
}

impl ExpenseFields {
    /// Create a new set of expense fields
    pub fn new(
        title: impl Into<String>,
        date: NaiveDate,
        amount: Money,
        description: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            date,
            amount,
            description: description.into(),
        }
    }

    /// Plaintext string of the date field
    pub fn date_plaintext(&self) -> String {
        self.date.format(FIELD_DATE_FORMAT).to_string()
    }

    /// Plaintext string of the amount field
    pub fn amount_plaintext(&self) -> String {
        self.amount.to_field_string()
    }
}

/// Which of the four encrypted columns a value belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpenseField {
    Title,
    Date,
    Amount,
    Description,
}

impl fmt::Display for ExpenseField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Title => write!(f, "title"),
            Self::Date => write!(f, "date"),
            Self::Amount => write!(f, "amount"),
            Self::Description => write!(f, "description"),
        }
    }
}

/// A single encrypted column value: `base64(nonce ‖ ciphertext ‖ tag)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncryptedField(String);

impl EncryptedField {
    /// Wrap an already-encoded column value
    pub fn new(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    /// Get the encoded value
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume and return the encoded value
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for EncryptedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The encrypted columns of one expense row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedExpense {
    /// Expense row identifier (not secret)
    pub id: ExpenseId,

    pub title: EncryptedField,
    pub date: EncryptedField,
    pub amount: EncryptedField,
    pub description: EncryptedField,
}

impl EncryptedExpense {
    /// Iterate the encrypted columns with their field names
    pub fn fields(&self) -> [(ExpenseField, &EncryptedField); 4] {
        [
            (ExpenseField::Title, &self.title),
            (ExpenseField::Date, &self.date),
            (ExpenseField::Amount, &self.amount),
            (ExpenseField::Description, &self.description),
        ]
    }
}

/// An expense recovered by trial decryption, with the member whose key opened it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecryptedExpense {
    pub expense_id: ExpenseId,

    /// Candidate whose derived key authenticated every field
    pub owner: UserId,

    pub fields: ExpenseFields,
}
