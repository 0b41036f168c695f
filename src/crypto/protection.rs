//! Protection of group master keys at rest
//!
//! The stored blob is opaque to everything but the [`KeyProtector`] that
//! produced it. The default protector seals the master key with AES-256-GCM
//! under the application protection key and binds the owning group id as
//! associated data, so a blob moved to another group's row will not open.

use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::{
    aead::{Aead, KeyInit, OsRng, Payload},
    Aes256Gcm, Key, Nonce,
};

use crate::error::{SplitError, SplitResult};
use crate::models::GroupId;

use super::field_cipher::{DecryptOutcome, FieldCipher, NONCE_SIZE, TAG_SIZE};
use super::key_derivation::ProtectionKey;
use super::secure_memory::SecureBytes;

/// Leading byte of a protected master-key blob
const PROTECTED_BLOB_V1: u8 = 0x01;

/// Associated-data prefix for protected master keys
const PROTECTION_CONTEXT: &[u8] = b"splitcrypt/group-master-key/v1";

/// Plaintext sealed into the settings file to check a passphrase
const VERIFY_PLAINTEXT: &str = "splitcrypt_verify";

/// Reversible protection of master-key material for storage
pub trait KeyProtector {
    /// Seal raw master-key material for the given group
    fn protect(&self, group_id: &GroupId, material: &[u8]) -> SplitResult<Vec<u8>>;

    /// Recover raw master-key material from a blob produced by `protect`
    fn unprotect(&self, group_id: &GroupId, blob: &[u8]) -> SplitResult<SecureBytes>;
}

/// AES-256-GCM protector keyed by the application protection key
#[derive(Debug)]
pub struct AeadKeyProtector {
    key: ProtectionKey,
}

impl AeadKeyProtector {
    /// Create a protector from a derived protection key
    pub fn new(key: ProtectionKey) -> Self {
        Self { key }
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(self.key.as_bytes()))
    }

    /// Create a token that later proves a passphrase derives this same key
    pub fn verification_token(&self) -> SplitResult<String> {
        Ok(FieldCipher::default()
            .encrypt(VERIFY_PLAINTEXT, self.key.as_bytes())?
            .into_inner())
    }

    /// Check a token produced by [`AeadKeyProtector::verification_token`]
    pub fn verify(&self, token: &str) -> SplitResult<()> {
        match FieldCipher::default().try_decrypt(token, self.key.as_bytes()) {
            DecryptOutcome::Decrypted(s) if s == VERIFY_PLAINTEXT => Ok(()),
            DecryptOutcome::Malformed(reason) => Err(SplitError::Encryption(format!(
                "Corrupt verification token: {}",
                reason
            ))),
            _ => Err(SplitError::Encryption("Invalid passphrase".to_string())),
        }
    }
}

fn associated_data(group_id: &GroupId) -> Vec<u8> {
    let mut aad = Vec::with_capacity(PROTECTION_CONTEXT.len() + 16);
    aad.extend_from_slice(PROTECTION_CONTEXT);
    aad.extend_from_slice(group_id.as_bytes());
    aad
}

impl KeyProtector for AeadKeyProtector {
    fn protect(&self, group_id: &GroupId, material: &[u8]) -> SplitResult<Vec<u8>> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);

        let aad = associated_data(group_id);
        let sealed = self
            .cipher()
            .encrypt(
                Nonce::from_slice(&nonce_bytes),
                Payload {
                    msg: material,
                    aad: &aad,
                },
            )
            .map_err(|e| SplitError::Encryption(format!("Failed to protect master key: {}", e)))?;

        let mut blob = Vec::with_capacity(1 + NONCE_SIZE + sealed.len());
        blob.push(PROTECTED_BLOB_V1);
        blob.extend_from_slice(&nonce_bytes);
        blob.extend_from_slice(&sealed);
        Ok(blob)
    }

    fn unprotect(&self, group_id: &GroupId, blob: &[u8]) -> SplitResult<SecureBytes> {
        let body = match blob.split_first() {
            Some((&PROTECTED_BLOB_V1, rest)) => rest,
            Some((version, _)) => {
                return Err(SplitError::KeyDerivation(format!(
                    "Unsupported protected key version {} for group {}",
                    version, group_id
                )))
            }
            None => {
                return Err(SplitError::KeyDerivation(format!(
                    "Empty protected key for group {}",
                    group_id
                )))
            }
        };

        if body.len() < NONCE_SIZE + TAG_SIZE {
            return Err(SplitError::KeyDerivation(format!(
                "Protected key for group {} is truncated",
                group_id
            )));
        }

        let (nonce_bytes, sealed) = body.split_at(NONCE_SIZE);
        let aad = associated_data(group_id);
        let material = self
            .cipher()
            .decrypt(
                Nonce::from_slice(nonce_bytes),
                Payload {
                    msg: sealed,
                    aad: &aad,
                },
            )
            .map_err(|_| {
                SplitError::KeyDerivation(format!(
                    "Failed to unprotect master key for group {}",
                    group_id
                ))
            })?;

        Ok(SecureBytes::new(material))
    }
}
