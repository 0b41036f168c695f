//! Group master key repository for JSON storage
//!
//! Manages loading and saving protected master keys to group_keys.json.
//! The table is keyed by group id and enforces one row per group.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;

use tracing::debug;

use crate::error::SplitError;
use crate::models::{GroupId, GroupMasterKey};

use super::file_io::{read_json, write_json_atomic};

/// Keyed store of protected master-key blobs, one per group
pub trait MasterKeyStore {
    /// Fetch the protected blob for a group, if one exists
    fn get_protected_key(&self, group_id: &GroupId) -> Result<Option<Vec<u8>>, SplitError>;

    /// Persist a new row; fails with `Duplicate` if the group already has one
    fn put_protected_key(&self, group_id: &GroupId, blob: Vec<u8>) -> Result<(), SplitError>;

    /// Remove a group's row, reporting whether one existed
    fn delete(&self, group_id: &GroupId) -> Result<bool, SplitError>;
}

/// Serializable group key data structure
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
struct GroupKeyData {
    group_keys: Vec<GroupMasterKey>,
}

/// Repository for group master key persistence
pub struct GroupKeyRepository {
    path: PathBuf,
    data: RwLock<HashMap<GroupId, GroupMasterKey>>,
}

impl GroupKeyRepository {
    /// Create a new group key repository
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            data: RwLock::new(HashMap::new()),
        }
    }

    /// Load group keys from disk
    pub fn load(&self) -> Result<(), SplitError> {
        let file_data: GroupKeyData = read_json(&self.path)?;

        let mut data = self.data.write().map_err(|e| {
            SplitError::Storage(format!("Failed to acquire write lock: {}", e))
        })?;

        data.clear();
        for row in file_data.group_keys {
            if data.insert(row.group_id, row.clone()).is_some() {
                return Err(SplitError::Storage(format!(
                    "Duplicate group key row for {} in {}",
                    row.group_id,
                    self.path.display()
                )));
            }
        }

        debug!("Loaded {} group keys from {}", data.len(), self.path.display());
        Ok(())
    }

    /// Save group keys to disk
    pub fn save(&self) -> Result<(), SplitError> {
        let data = self.data.read().map_err(|e| {
            SplitError::Storage(format!("Failed to acquire read lock: {}", e))
        })?;

        let mut group_keys: Vec<_> = data.values().cloned().collect();
        group_keys.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.group_id.cmp(&b.group_id)));

        write_json_atomic(&self.path, &GroupKeyData { group_keys })
    }

    /// Get a group's key row
    pub fn get(&self, group_id: GroupId) -> Result<Option<GroupMasterKey>, SplitError> {
        let data = self.data.read().map_err(|e| {
            SplitError::Storage(format!("Failed to acquire read lock: {}", e))
        })?;

        Ok(data.get(&group_id).cloned())
    }

    /// Get all key rows, oldest first
    pub fn get_all(&self) -> Result<Vec<GroupMasterKey>, SplitError> {
        let data = self.data.read().map_err(|e| {
            SplitError::Storage(format!("Failed to acquire read lock: {}", e))
        })?;

        let mut rows: Vec<_> = data.values().cloned().collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.group_id.cmp(&b.group_id)));
        Ok(rows)
    }

    /// Insert a row, rejecting a second row for the same group
    pub fn insert(&self, row: GroupMasterKey) -> Result<(), SplitError> {
        let mut data = self.data.write().map_err(|e| {
            SplitError::Storage(format!("Failed to acquire write lock: {}", e))
        })?;

        if data.contains_key(&row.group_id) {
            return Err(SplitError::group_key_exists(row.group_id.as_uuid().to_string()));
        }

        data.insert(row.group_id, row);
        Ok(())
    }

    /// Replace every listed row in one step; all rows must already exist
    pub fn replace_all(&self, rows: Vec<GroupMasterKey>) -> Result<(), SplitError> {
        let mut data = self.data.write().map_err(|e| {
            SplitError::Storage(format!("Failed to acquire write lock: {}", e))
        })?;

        if let Some(missing) = rows.iter().find(|r| !data.contains_key(&r.group_id)) {
            return Err(SplitError::group_key_not_found(
                missing.group_id.as_uuid().to_string(),
            ));
        }

        for row in rows {
            data.insert(row.group_id, row);
        }
        Ok(())
    }

    /// Remove a row from memory
    pub fn remove(&self, group_id: GroupId) -> Result<Option<GroupMasterKey>, SplitError> {
        let mut data = self.data.write().map_err(|e| {
            SplitError::Storage(format!("Failed to acquire write lock: {}", e))
        })?;

        Ok(data.remove(&group_id))
    }

    /// Check if a group has a key row
    pub fn exists(&self, group_id: GroupId) -> Result<bool, SplitError> {
        let data = self.data.read().map_err(|e| {
            SplitError::Storage(format!("Failed to acquire read lock: {}", e))
        })?;

        Ok(data.contains_key(&group_id))
    }

    /// Count key rows
    pub fn count(&self) -> Result<usize, SplitError> {
        let data = self.data.read().map_err(|e| {
            SplitError::Storage(format!("Failed to acquire read lock: {}", e))
        })?;

        Ok(data.len())
    }
}

impl MasterKeyStore for GroupKeyRepository {
    fn get_protected_key(&self, group_id: &GroupId) -> Result<Option<Vec<u8>>, SplitError> {
        Ok(self.get(*group_id)?.map(|row| row.protected_key_material))
    }

    fn put_protected_key(&self, group_id: &GroupId, blob: Vec<u8>) -> Result<(), SplitError> {
        self.insert(GroupMasterKey::new(*group_id, blob))?;

        // Never leave an in-memory row the file does not have
        if let Err(e) = self.save() {
            self.remove(*group_id)?;
            return Err(e);
        }
        Ok(())
    }

    fn delete(&self, group_id: &GroupId) -> Result<bool, SplitError> {
        let Some(row) = self.remove(*group_id)? else {
            return Ok(false);
        };

        if let Err(e) = self.save() {
            self.data
                .write()
                .map_err(|e| SplitError::Storage(format!("Failed to acquire write lock: {}", e)))?
                .insert(row.group_id, row);
            return Err(e);
        }
        Ok(true)
    }
}

#[cfg(test)]
pub(crate) fn create_test_repo() -> (tempfile::TempDir, GroupKeyRepository) {
    let temp_dir = tempfile::TempDir::new().unwrap();
    let path = temp_dir.path().join("group_keys.json");
    let repo = GroupKeyRepository::new(path);
    (temp_dir, repo)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_load() {
        let (_temp_dir, repo) = create_test_repo();
        repo.load().unwrap();
        assert_eq!(repo.count().unwrap(), 0);
    }

    #[test]
    fn test_put_and_get() {
        let (_temp_dir, repo) = create_test_repo();
        let group = GroupId::new();

        repo.put_protected_key(&group, vec![1, 2, 3]).unwrap();

        assert_eq!(repo.get_protected_key(&group).unwrap(), Some(vec![1, 2, 3]));
        assert!(repo.get_protected_key(&GroupId::new()).unwrap().is_none());
    }

    #[test]
    fn test_put_persists_and_reloads() {
        let (temp_dir, repo) = create_test_repo();
        let group = GroupId::new();
        repo.put_protected_key(&group, vec![9; 61]).unwrap();

        let repo2 = GroupKeyRepository::new(temp_dir.path().join("group_keys.json"));
        repo2.load().unwrap();
        assert_eq!(repo2.get_protected_key(&group).unwrap(), Some(vec![9; 61]));
    }

    #[test]
    fn test_duplicate_put_rejected_and_original_kept() {
        let (_temp_dir, repo) = create_test_repo();
        let group = GroupId::new();
        repo.put_protected_key(&group, vec![1]).unwrap();

        let err = repo.put_protected_key(&group, vec![2]).unwrap_err();
        assert!(matches!(err, SplitError::Duplicate { .. }));
        assert_eq!(repo.get_protected_key(&group).unwrap(), Some(vec![1]));
    }

    #[test]
    fn test_delete() {
        let (temp_dir, repo) = create_test_repo();
        let group = GroupId::new();
        repo.put_protected_key(&group, vec![1]).unwrap();

        assert!(MasterKeyStore::delete(&repo, &group).unwrap());
        assert!(!MasterKeyStore::delete(&repo, &group).unwrap());

        let repo2 = GroupKeyRepository::new(temp_dir.path().join("group_keys.json"));
        repo2.load().unwrap();
        assert!(!repo2.exists(group).unwrap());
    }

    #[test]
    fn test_replace_all_requires_existing_rows() {
        let (_temp_dir, repo) = create_test_repo();
        let group = GroupId::new();
        repo.put_protected_key(&group, vec![1]).unwrap();

        let mut row = repo.get(group).unwrap().unwrap();
        row.replace_material(vec![2]);
        let stray = GroupMasterKey::new(GroupId::new(), vec![3]);

        assert!(repo.replace_all(vec![row.clone(), stray]).is_err());
        assert_eq!(repo.get_protected_key(&group).unwrap(), Some(vec![1]));

        repo.replace_all(vec![row]).unwrap();
        assert_eq!(repo.get_protected_key(&group).unwrap(), Some(vec![2]));
    }

    #[test]
    fn test_load_rejects_duplicate_rows() {
        let (temp_dir, repo) = create_test_repo();
        let row = GroupMasterKey::new(GroupId::new(), vec![1]);
        write_json_atomic(
            temp_dir.path().join("group_keys.json"),
            &GroupKeyData {
                group_keys: vec![row.clone(), row],
            },
        )
        .unwrap();

        assert!(matches!(repo.load(), Err(SplitError::Storage(_))));
    }
}
