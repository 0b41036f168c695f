//! AES-256-GCM encryption of single expense fields
//!
//! Each field is stored as `base64(nonce[12] ‖ ciphertext ‖ tag[16])`, with an
//! optional leading format byte when [`FieldFormat::Versioned`] is selected.
//! No associated data is bound and nothing in the output identifies the key.
//!
//! Decryption reports a tri-state [`DecryptOutcome`] so that trial decryption
//! can treat a wrong key as an ordinary branch instead of an error.

use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Key, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};

use crate::error::{SplitError, SplitResult};
use crate::models::EncryptedField;

/// Size of the AES-GCM nonce in bytes (96 bits)
pub const NONCE_SIZE: usize = 12;

/// Size of the AES-GCM authentication tag in bytes
pub const TAG_SIZE: usize = 16;

/// Size of an AES-256 key in bytes
pub const KEY_SIZE: usize = 32;

/// Leading byte of a [`FieldFormat::Versioned`] field
pub const FIELD_FORMAT_V1: u8 = 0x01;

/// Storage layout of an encrypted field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldFormat {
    /// `nonce ‖ ciphertext ‖ tag`
    #[default]
    Unversioned,
    /// `0x01 ‖ nonce ‖ ciphertext ‖ tag`
    Versioned,
}

/// Result of attempting to decrypt one field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecryptOutcome {
    /// The tag verified and the plaintext is valid UTF-8
    Decrypted(String),
    /// The tag did not verify: wrong key or tampered ciphertext
    WrongKey,
    /// The stored value is structurally invalid
    Malformed(String),
}

impl DecryptOutcome {
    /// Convert into a result, mapping `WrongKey` to `AuthenticationFailure`
    pub fn into_result(self) -> SplitResult<String> {
        match self {
            Self::Decrypted(plaintext) => Ok(plaintext),
            Self::WrongKey => Err(SplitError::AuthenticationFailure),
            Self::Malformed(reason) => Err(SplitError::MalformedInput(reason)),
        }
    }
}

/// Stateless field encryptor, parameterised only by the storage layout
#[derive(Debug, Clone, Copy, Default)]
pub struct FieldCipher {
    format: FieldFormat,
}

impl FieldCipher {
    /// Create a cipher writing and reading the given layout
    pub fn new(format: FieldFormat) -> Self {
        Self { format }
    }

    /// Encrypt a plaintext string under a 32-byte key with a fresh random nonce
    pub fn encrypt(&self, plaintext: &str, key: &[u8; KEY_SIZE]) -> SplitResult<EncryptedField> {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let sealed = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| SplitError::Encryption(format!("Field encryption failed: {}", e)))?;

        let mut blob = Vec::with_capacity(1 + NONCE_SIZE + sealed.len());
        if self.format == FieldFormat::Versioned {
            blob.push(FIELD_FORMAT_V1);
        }
        blob.extend_from_slice(&nonce_bytes);
        blob.extend_from_slice(&sealed);

        Ok(EncryptedField::new(STANDARD.encode(blob)))
    }

    /// Attempt to decrypt an encoded field, reporting the outcome
    pub fn try_decrypt(&self, encoded: &str, key: &[u8; KEY_SIZE]) -> DecryptOutcome {
        let blob = match STANDARD.decode(encoded) {
            Ok(blob) => blob,
            Err(e) => return DecryptOutcome::Malformed(format!("Invalid base64: {}", e)),
        };

        let body = match self.format {
            FieldFormat::Unversioned => &blob[..],
            FieldFormat::Versioned => match blob.split_first() {
                Some((&FIELD_FORMAT_V1, rest)) => rest,
                Some((version, _)) => {
                    return DecryptOutcome::Malformed(format!(
                        "Unsupported field format version: {}",
                        version
                    ))
                }
                None => return DecryptOutcome::Malformed("Empty field".to_string()),
            },
        };

        if body.len() < NONCE_SIZE + TAG_SIZE {
            return DecryptOutcome::Malformed(format!(
                "Field too short: need at least {} bytes, got {}",
                NONCE_SIZE + TAG_SIZE,
                body.len()
            ));
        }

        let (nonce_bytes, sealed) = body.split_at(NONCE_SIZE);
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));

        let plaintext = match cipher.decrypt(Nonce::from_slice(nonce_bytes), sealed) {
            Ok(plaintext) => plaintext,
            Err(_) => return DecryptOutcome::WrongKey,
        };

        match String::from_utf8(plaintext) {
            Ok(s) => DecryptOutcome::Decrypted(s),
            Err(_) => DecryptOutcome::Malformed("Decrypted field is not valid UTF-8".to_string()),
        }
    }

    /// Decrypt an encoded field, failing on a wrong key or malformed input
    pub fn decrypt(&self, encoded: &str, key: &[u8; KEY_SIZE]) -> SplitResult<String> {
        self.try_decrypt(encoded, key).into_result()
    }
}
