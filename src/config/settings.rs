//! Settings for splitcrypt
//!
//! Holds the fixed derivation parameters shared by every caller, the field
//! storage layout, the protection-key parameters and the default log filter.

use serde::{Deserialize, Serialize};

use super::paths::SplitPaths;
use crate::crypto::field_cipher::{FieldFormat, KEY_SIZE};
use crate::crypto::group_key::{DEFAULT_ITERATIONS, DEFAULT_OUTPUT_LENGTH};
use crate::crypto::key_derivation::KeyDerivationParams;
use crate::error::SplitError;
use crate::storage::file_io::write_json_atomic;

/// Per-user key derivation parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivationSettings {
    /// PBKDF2 iteration count
    #[serde(default = "default_iterations")]
    pub iterations: u32,

    /// Derived key length in bytes
    #[serde(default = "default_output_length")]
    pub output_length: usize,
}

fn default_iterations() -> u32 {
    DEFAULT_ITERATIONS
}

fn default_output_length() -> usize {
    DEFAULT_OUTPUT_LENGTH
}

impl Default for DerivationSettings {
    fn default() -> Self {
        Self {
            iterations: default_iterations(),
            output_length: default_output_length(),
        }
    }
}

impl DerivationSettings {
    /// Reject parameters the field cipher cannot work with
    pub fn validate(&self) -> Result<(), SplitError> {
        if self.iterations == 0 {
            return Err(SplitError::Validation(
                "Derivation iterations must be at least 1".into(),
            ));
        }
        if self.output_length != KEY_SIZE {
            return Err(SplitError::Validation(format!(
                "Derived key length must be {} bytes for AES-256, got {}",
                KEY_SIZE, self.output_length
            )));
        }
        Ok(())
    }
}

/// Protection key settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProtectionSettings {
    /// Argon2id parameters (salt, memory cost, etc.)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_params: Option<KeyDerivationParams>,

    /// Known plaintext sealed under the protection key, to reject wrong passphrases
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification: Option<String>,
}

impl ProtectionSettings {
    /// Whether a protection passphrase has been set up
    pub fn is_configured(&self) -> bool {
        self.key_params.is_some() && self.verification.is_some()
    }
}

/// Settings for splitcrypt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Schema version for migration support
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,

    /// Per-user key derivation parameters
    #[serde(default)]
    pub derivation: DerivationSettings,

    /// Storage layout for encrypted fields
    #[serde(default)]
    pub field_format: FieldFormat,

    /// Protection key settings
    #[serde(default)]
    pub protection: ProtectionSettings,

    /// Default tracing filter when RUST_LOG is unset
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

fn default_schema_version() -> u32 {
    1
}

fn default_log_filter() -> String {
    "splitcrypt=info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            derivation: DerivationSettings::default(),
            field_format: FieldFormat::default(),
            protection: ProtectionSettings::default(),
            log_filter: default_log_filter(),
        }
    }
}

impl Settings {
    /// Load settings from disk, or return defaults if the file doesn't exist
    pub fn load_or_create(paths: &SplitPaths) -> Result<Self, SplitError> {
        let settings_path = paths.settings_file();

        if !settings_path.exists() {
            // Don't save yet - let caller decide when to persist
            return Ok(Settings::default());
        }

        let contents = std::fs::read_to_string(&settings_path)
            .map_err(|e| SplitError::Io(format!("Failed to read settings file: {}", e)))?;

        let settings: Settings = serde_json::from_str(&contents)
            .map_err(|e| SplitError::Config(format!("Failed to parse settings file: {}", e)))?;

        settings.derivation.validate()?;
        Ok(settings)
    }

    /// Save settings to disk
    pub fn save(&self, paths: &SplitPaths) -> Result<(), SplitError> {
        self.derivation.validate()?;
        paths.ensure_directories()?;
        write_json_atomic(paths.settings_file(), self)
    }
}
