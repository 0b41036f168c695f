//! Per-user, per-group, per-epoch key derivation
//!
//! Each group has one random master key, stored only in protected form.
//! A member's field key is PBKDF2-HMAC-SHA256 over the unprotected master key,
//! salted with the member's user id, the group id and the rotation tag.
//! Nothing derived here is persisted; keys are recomputed on every call.

use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::OsRng;
use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use tracing::debug;
use zeroize::Zeroizing;

use crate::error::{SplitError, SplitResult};
use crate::models::{GroupId, RotationTag, UserId};
use crate::storage::group_keys::MasterKeyStore;

use super::field_cipher::KEY_SIZE;
use super::protection::KeyProtector;
use super::secure_memory::SecureBytes;

/// Length of a group's raw master key in bytes
pub const MASTER_KEY_SIZE: usize = 32;

/// PBKDF2 iteration count used for member keys
pub const DEFAULT_ITERATIONS: u32 = 10_000;

/// Length of a member key in bytes
pub const DEFAULT_OUTPUT_LENGTH: usize = KEY_SIZE;

/// Longest member key `derive_user_key` will produce (two SHA-256 blocks)
pub const MAX_OUTPUT_LENGTH: usize = 64;

/// Domain separator at the start of every derivation salt
const USER_KEY_CONTEXT: &[u8] = b"splitcrypt/user-key/v1";

/// A member's symmetric key for one group and rotation tag
///
/// Zeroed on drop. Never persisted; lives for one encrypt/decrypt call.
pub struct DerivedUserKey {
    bytes: Zeroizing<Vec<u8>>,
}

impl DerivedUserKey {
    /// Get the key bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Get the key as an AES-256 key
    pub fn aes_key(&self) -> SplitResult<&[u8; KEY_SIZE]> {
        self.bytes.as_slice().try_into().map_err(|_| {
            SplitError::KeyDerivation(format!(
                "Derived key is {} bytes, AES-256 needs {}",
                self.bytes.len(),
                KEY_SIZE
            ))
        })
    }
}

impl std::fmt::Debug for DerivedUserKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedUserKey")
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Build the PBKDF2 salt for a (user, group, tag) triple
///
/// Ids are fixed-width; the tag is length-prefixed so distinct triples never
/// produce the same byte string.
pub fn derivation_salt(user_id: &UserId, group_id: &GroupId, tag: &RotationTag) -> Vec<u8> {
    let tag = tag.as_bytes();
    let mut salt = Vec::with_capacity(USER_KEY_CONTEXT.len() + 16 + 16 + 8 + tag.len());
    salt.extend_from_slice(USER_KEY_CONTEXT);
    salt.extend_from_slice(user_id.as_bytes());
    salt.extend_from_slice(group_id.as_bytes());
    salt.extend_from_slice(&(tag.len() as u64).to_be_bytes());
    salt.extend_from_slice(tag);
    salt
}

/// Derives member keys from a group's stored master key
pub struct GroupKeyDerivation<'a> {
    store: &'a dyn MasterKeyStore,
    protector: &'a dyn KeyProtector,
}

impl<'a> GroupKeyDerivation<'a> {
    /// Create a derivation service over a key store and protector
    pub fn new(store: &'a dyn MasterKeyStore, protector: &'a dyn KeyProtector) -> Self {
        Self { store, protector }
    }

    /// Generate fresh master-key material for a new group and protect it
    ///
    /// The raw material is zeroed before this returns; only the opaque blob
    /// leaves.
    pub fn protect(&self, group_id: &GroupId) -> SplitResult<Vec<u8>> {
        let mut material = SecureBytes::zeroed(MASTER_KEY_SIZE);
        OsRng.fill_bytes(material.as_bytes_mut());
        self.protector.protect(group_id, material.as_bytes())
    }

    /// Reverse [`GroupKeyDerivation::protect`] for a stored blob
    pub fn unprotect(&self, group_id: &GroupId, blob: &[u8]) -> SplitResult<SecureBytes> {
        let material = self.protector.unprotect(group_id, blob)?;
        if material.len() != MASTER_KEY_SIZE {
            return Err(SplitError::KeyDerivation(format!(
                "Master key for group {} has unexpected length {}",
                group_id,
                material.len()
            )));
        }
        Ok(material)
    }

    /// Derive `user_id`'s key for `group_id` under rotation tag `tag`
    ///
    /// Returns `Ok(None)` when the group has no stored master key. Identical
    /// inputs always produce identical output.
    pub fn derive_user_key(
        &self,
        iterations: u32,
        output_length: usize,
        user_id: &UserId,
        group_id: &GroupId,
        tag: &RotationTag,
    ) -> SplitResult<Option<DerivedUserKey>> {
        if iterations == 0 || output_length == 0 || output_length > MAX_OUTPUT_LENGTH {
            return Err(SplitError::Validation(format!(
                "Invalid derivation parameters: iterations={}, output_length={}",
                iterations, output_length
            )));
        }

        let Some(blob) = self.store.get_protected_key(group_id)? else {
            debug!(group = %group_id, "No master key stored for group");
            return Ok(None);
        };

        let master = self.unprotect(group_id, &blob)?;
        let salt = derivation_salt(user_id, group_id, tag);

        let mut bytes = Zeroizing::new(vec![0u8; output_length]);
        pbkdf2_hmac::<Sha256>(master.as_bytes(), &salt, iterations, &mut bytes);

        debug!(user = %user_id, group = %group_id, tag = %tag, "Derived member key");
        Ok(Some(DerivedUserKey { bytes }))
    }
}
