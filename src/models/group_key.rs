//! Group master key model
//!
//! One row per group holding the protected (never raw) master key blob.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::GroupId;

/// Stored master key row for a group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMasterKey {
    /// Owning group (unique)
    pub group_id: GroupId,

    /// Opaque blob only `KeyProtector::unprotect` can reverse
    #[serde(with = "base64_bytes")]
    pub protected_key_material: Vec<u8>,

    /// When the row was created
    pub created_at: DateTime<Utc>,

    /// When the blob was last re-protected
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl GroupMasterKey {
    /// Create a new row for a freshly protected key
    pub fn new(group_id: GroupId, protected_key_material: Vec<u8>) -> Self {
        Self {
            group_id,
            protected_key_material,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    /// Replace the protected blob, e.g. after the protection key changed
    pub fn replace_material(&mut self, protected_key_material: Vec<u8>) {
        self.protected_key_material = protected_key_material;
        self.updated_at = Some(Utc::now());
    }
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_row_has_no_update() {
        let row = GroupMasterKey::new(GroupId::new(), vec![1, 2, 3]);
        assert!(row.updated_at.is_none());
    }

    #[test]
    fn test_replace_material_stamps_update() {
        let mut row = GroupMasterKey::new(GroupId::new(), vec![1, 2, 3]);
        row.replace_material(vec![4, 5]);
        assert_eq!(row.protected_key_material, vec![4, 5]);
        assert!(row.updated_at.is_some());
    }

    #[test]
    fn test_material_serialized_as_base64() {
        let row = GroupMasterKey::new(GroupId::new(), vec![0xde, 0xad, 0xbe, 0xef]);
        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json["protected_key_material"], "3q2+7w==");

        let back: GroupMasterKey = serde_json::from_value(json).unwrap();
        assert_eq!(back, row);
    }
}
