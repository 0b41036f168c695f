//! Custom error types for splitcrypt
//!
//! This module defines the error hierarchy for the crate using thiserror
//! for ergonomic error definitions.

use thiserror::Error;

/// The main error type for splitcrypt operations
#[derive(Error, Debug)]
pub enum SplitError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(String),

    /// Validation errors for inputs and settings
    #[error("Validation error: {0}")]
    Validation(String),

    /// Entity not found errors
    #[error("{entity_type} not found: {identifier}")]
    NotFound {
        entity_type: &'static str,
        identifier: String,
    },

    /// Duplicate entity errors
    #[error("{entity_type} already exists: {identifier}")]
    Duplicate {
        entity_type: &'static str,
        identifier: String,
    },

    /// Key protection and passphrase errors
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// No usable master key for a group, or the stored blob could not be unprotected
    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    /// Ciphertext did not verify under the supplied key
    #[error("Authentication failed: wrong key or tampered ciphertext")]
    AuthenticationFailure,

    /// Stored ciphertext is structurally invalid (bad base64, too short, bad version)
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// Cooperative cancellation was observed
    #[error("Operation cancelled")]
    Cancelled,

    /// Storage errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Unexpected internal failures
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SplitError {
    /// Create a "not found" error for group keys
    pub fn group_key_not_found(identifier: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: "Group key",
            identifier: identifier.into(),
        }
    }

    /// Create a "duplicate" error for group keys
    pub fn group_key_exists(identifier: impl Into<String>) -> Self {
        Self::Duplicate {
            entity_type: "Group key",
            identifier: identifier.into(),
        }
    }

    /// Check if this is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this is a validation error
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Check if this is an authentication failure (wrong key)
    pub fn is_authentication_failure(&self) -> bool {
        matches!(self, Self::AuthenticationFailure)
    }

    /// Check if this is a malformed-input error (corrupt record)
    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::MalformedInput(_))
    }

    /// Check if this operation was cancelled
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Check if this is an internal failure the caller cannot fix by changing input
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            Self::KeyDerivation(_) | Self::Storage(_) | Self::Io(_) | Self::Internal(_)
        )
    }
}

// Implement From traits for common error types

impl From<std::io::Error> for SplitError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for SplitError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

/// Result type alias for splitcrypt operations
pub type SplitResult<T> = Result<T, SplitError>;
