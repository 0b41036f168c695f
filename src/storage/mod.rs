//! Storage layer for splitcrypt
//!
//! Provides the JSON-file group key table (atomic writes, one row per group)
//! and the audit log, bundled behind a single coordinator.

pub mod file_io;
pub mod group_keys;

pub use file_io::{read_json, write_json_atomic};
pub use group_keys::{GroupKeyRepository, MasterKeyStore};

use serde::Serialize;

use crate::audit::{AuditEntry, AuditLogger, EntityType};
use crate::config::paths::SplitPaths;
use crate::error::SplitError;

/// Main storage coordinator
pub struct Storage {
    paths: SplitPaths,
    pub group_keys: GroupKeyRepository,
    audit: AuditLogger,
}

impl Storage {
    /// Create a new Storage instance
    pub fn new(paths: SplitPaths) -> Result<Self, SplitError> {
        paths.ensure_directories()?;

        Ok(Self {
            group_keys: GroupKeyRepository::new(paths.group_keys_file()),
            audit: AuditLogger::new(paths.audit_log()),
            paths,
        })
    }

    /// Create and load a Storage instance in one step
    pub fn open(paths: SplitPaths) -> Result<Self, SplitError> {
        let storage = Self::new(paths)?;
        storage.load_all()?;
        Ok(storage)
    }

    /// Get the paths configuration
    pub fn paths(&self) -> &SplitPaths {
        &self.paths
    }

    /// Get the audit logger
    pub fn audit(&self) -> &AuditLogger {
        &self.audit
    }

    /// Load all data from disk
    pub fn load_all(&self) -> Result<(), SplitError> {
        self.group_keys.load()
    }

    /// Record a create operation in the audit log
    pub fn log_create<T: Serialize>(
        &self,
        entity_type: EntityType,
        entity_id: impl Into<String>,
        details: &T,
    ) -> Result<(), SplitError> {
        self.audit
            .log(&AuditEntry::create(entity_type, entity_id, details))
    }

    /// Record a delete operation in the audit log
    pub fn log_delete<T: Serialize>(
        &self,
        entity_type: EntityType,
        entity_id: impl Into<String>,
        details: &T,
    ) -> Result<(), SplitError> {
        self.audit
            .log(&AuditEntry::delete(entity_type, entity_id, details))
    }

    /// Record an update operation in the audit log
    pub fn log_update<T: Serialize>(
        &self,
        entity_type: EntityType,
        entity_id: impl Into<String>,
        details: &T,
        summary: Option<String>,
    ) -> Result<(), SplitError> {
        self.audit
            .log(&AuditEntry::update(entity_type, entity_id, details, summary))
    }
}

#[cfg(test)]
pub(crate) fn create_test_storage() -> (tempfile::TempDir, Storage) {
    let temp_dir = tempfile::TempDir::new().unwrap();
    let paths = SplitPaths::with_base_dir(temp_dir.path().to_path_buf());
    let storage = Storage::open(paths).unwrap();
    (temp_dir, storage)
}
