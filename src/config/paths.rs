//! Path management for splitcrypt
//!
//! ## Path Resolution Order
//!
//! 1. `SPLITCRYPT_DATA_DIR` environment variable (if set)
//! 2. The platform config directory from `directories` plus `splitcrypt`
//!    (`~/.config/splitcrypt`, `%APPDATA%\splitcrypt`, ...)

use std::path::{Path, PathBuf};

use directories::BaseDirs;

use crate::error::SplitError;

/// Environment variable overriding the base directory
pub const DATA_DIR_ENV: &str = "SPLITCRYPT_DATA_DIR";

/// Manages all paths used by splitcrypt
#[derive(Debug, Clone)]
pub struct SplitPaths {
    base_dir: PathBuf,
}

impl SplitPaths {
    /// Resolve the base directory from the environment or platform defaults
    ///
    /// # Errors
    ///
    /// Returns an error if no home directory can be determined.
    pub fn new() -> Result<Self, SplitError> {
        let base_dir = match std::env::var_os(DATA_DIR_ENV) {
            Some(custom) => PathBuf::from(custom),
            None => BaseDirs::new()
                .map(|dirs| dirs.config_dir().join("splitcrypt"))
                .ok_or_else(|| {
                    SplitError::Config("Could not determine a home directory".into())
                })?,
        };

        Ok(Self { base_dir })
    }

    /// Create SplitPaths with a custom base directory (useful for testing)
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Get the base directory
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Get the data directory (<base>/data/)
    pub fn data_dir(&self) -> PathBuf {
        self.base_dir.join("data")
    }

    /// Get the path to the settings file
    pub fn settings_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Get the path to the audit log
    pub fn audit_log(&self) -> PathBuf {
        self.base_dir.join("audit.log")
    }

    /// Get the path to group_keys.json
    pub fn group_keys_file(&self) -> PathBuf {
        self.data_dir().join("group_keys.json")
    }

    /// Ensure the base and data directories exist
    pub fn ensure_directories(&self) -> Result<(), SplitError> {
        std::fs::create_dir_all(self.data_dir())
            .map_err(|e| SplitError::Io(format!("Failed to create data directory: {}", e)))
    }

    /// Check if splitcrypt has been initialized (config file exists)
    pub fn is_initialized(&self) -> bool {
        self.settings_file().exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_custom_base_dir() {
        let temp_dir = TempDir::new().unwrap();
        let paths = SplitPaths::with_base_dir(temp_dir.path().to_path_buf());

        assert_eq!(paths.base_dir(), temp_dir.path());
        assert_eq!(paths.settings_file(), temp_dir.path().join("config.json"));
        assert_eq!(
            paths.group_keys_file(),
            temp_dir.path().join("data").join("group_keys.json")
        );
    }

    #[test]
    fn test_ensure_directories() {
        let temp_dir = TempDir::new().unwrap();
        let paths = SplitPaths::with_base_dir(temp_dir.path().join("nested"));

        paths.ensure_directories().unwrap();

        assert!(paths.data_dir().exists());
        assert!(!paths.is_initialized());
    }
}
