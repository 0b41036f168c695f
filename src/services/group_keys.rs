//! Group master key service
//!
//! Creates a group's master key when the group is created, removes it when
//! the group is deleted, and re-protects every stored key when the
//! protection passphrase changes.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::audit::{AuditEntry, EntityType};
use crate::crypto::{GroupKeyDerivation, KeyProtector};
use crate::error::{SplitError, SplitResult};
use crate::models::{GroupId, GroupMasterKey};
use crate::storage::{MasterKeyStore, Storage};

/// Non-secret view of a stored group key, used for listings and audit entries
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupKeySummary {
    pub group_id: GroupId,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub protected_len: usize,
}

impl From<&GroupMasterKey> for GroupKeySummary {
    fn from(row: &GroupMasterKey) -> Self {
        Self {
            group_id: row.group_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
            protected_len: row.protected_key_material.len(),
        }
    }
}

/// Service for group key lifecycle
pub struct GroupKeyService<'a> {
    storage: &'a Storage,
    protector: &'a dyn KeyProtector,
}

impl<'a> GroupKeyService<'a> {
    /// Create a new group key service
    pub fn new(storage: &'a Storage, protector: &'a dyn KeyProtector) -> Self {
        Self { storage, protector }
    }

    fn derivation(&self) -> GroupKeyDerivation<'a> {
        GroupKeyDerivation::new(&self.storage.group_keys, self.protector)
    }

    /// Create the master key for a new group
    ///
    /// Any error means the group has no key and group creation must abort.
    /// A second key for the same group is rejected and the first is kept.
    pub fn create_group_key(&self, group_id: GroupId) -> SplitResult<GroupKeySummary> {
        let blob = self.derivation().protect(&group_id)?;

        if let Err(e) = self.storage.group_keys.put_protected_key(&group_id, blob) {
            if matches!(e, SplitError::Duplicate { .. }) {
                warn!(group = %group_id, "Rejected second master key for group");
            }
            return Err(e);
        }

        let row = self
            .storage
            .group_keys
            .get(group_id)?
            .ok_or_else(|| SplitError::Internal(format!("Key row for {} vanished after insert", group_id)))?;
        let summary = GroupKeySummary::from(&row);

        if let Err(e) = self
            .storage
            .log_create(EntityType::GroupKey, group_id.as_uuid().to_string(), &summary)
        {
            // Keep key table and audit log consistent: undo the row
            self.storage.group_keys.delete(&group_id)?;
            return Err(e);
        }

        info!(group = %group_id, "Created group master key");
        Ok(summary)
    }

    /// Delete a group's master key
    ///
    /// Returns `false` (and logs a warning) when the group had no key, which
    /// should never happen for an existing group.
    pub fn delete_group_key(&self, group_id: GroupId) -> SplitResult<bool> {
        let Some(row) = self.storage.group_keys.get(group_id)? else {
            warn!(group = %group_id, "Deleting group with no master key row");
            return Ok(false);
        };

        if !self.storage.group_keys.delete(&group_id)? {
            warn!(group = %group_id, "Master key row disappeared before delete");
            return Ok(false);
        }

        self.storage.log_delete(
            EntityType::GroupKey,
            group_id.as_uuid().to_string(),
            &GroupKeySummary::from(&row),
        )?;

        info!(group = %group_id, "Deleted group master key");
        Ok(true)
    }

    /// Summaries of every stored key, oldest first
    ///
    /// Listing reads only metadata, so no protector is needed.
    pub fn list(storage: &Storage) -> SplitResult<Vec<GroupKeySummary>> {
        Ok(storage
            .group_keys
            .get_all()?
            .iter()
            .map(GroupKeySummary::from)
            .collect())
    }

    /// Summary of one group's key
    pub fn get(storage: &Storage, group_id: GroupId) -> SplitResult<GroupKeySummary> {
        storage
            .group_keys
            .get(group_id)?
            .map(|row| GroupKeySummary::from(&row))
            .ok_or_else(|| SplitError::group_key_not_found(group_id.as_uuid().to_string()))
    }

    /// Re-wrap every stored master key under a new protector
    ///
    /// Master keys themselves do not change, so every member key and every
    /// ciphertext stays valid. Either every row is re-protected or none is.
    pub fn reprotect_all(&self, new_protector: &dyn KeyProtector) -> SplitResult<usize> {
        let derivation = self.derivation();
        let old_rows = self.storage.group_keys.get_all()?;

        let mut new_rows = Vec::with_capacity(old_rows.len());
        for row in &old_rows {
            let material = derivation.unprotect(&row.group_id, &row.protected_key_material)?;
            let blob = new_protector.protect(&row.group_id, material.as_bytes())?;

            let mut updated = row.clone();
            updated.replace_material(blob);
            new_rows.push(updated);
        }

        let summaries: Vec<GroupKeySummary> = new_rows.iter().map(GroupKeySummary::from).collect();
        let entries: Vec<_> = summaries
            .iter()
            .map(|s| {
                AuditEntry::update(
                    EntityType::GroupKey,
                    s.group_id.as_uuid().to_string(),
                    s,
                    Some("re-protected under new protection key".to_string()),
                )
            })
            .collect();

        self.storage.group_keys.replace_all(new_rows)?;
        let committed = self
            .storage
            .group_keys
            .save()
            .and_then(|()| self.storage.audit().log_batch(&entries));

        if let Err(e) = committed {
            // Put the old blobs back on disk so the current passphrase still opens them
            warn!(error = %e, "Re-protection failed, restoring previous key rows");
            self.storage.group_keys.replace_all(old_rows)?;
            self.storage.group_keys.save()?;
            return Err(e);
        }

        info!(count = summaries.len(), "Re-protected group master keys");
        Ok(summaries.len())
    }
}
