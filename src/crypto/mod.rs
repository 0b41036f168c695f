//! Cryptographic functions for splitcrypt
//!
//! - `field_cipher`: AES-256-GCM encryption of single expense fields
//! - `group_key`: PBKDF2 derivation of member keys from a group master key
//! - `protection`: sealing group master keys at rest
//! - `key_derivation`: Argon2id derivation of the protection key from a passphrase
//! - `secure_memory`: zero-on-drop buffers

pub mod field_cipher;
pub mod group_key;
pub mod key_derivation;
pub mod protection;
pub mod secure_memory;

pub use field_cipher::{DecryptOutcome, FieldCipher, FieldFormat};
pub use group_key::{DerivedUserKey, GroupKeyDerivation};
pub use key_derivation::{derive_protection_key, KeyDerivationParams, ProtectionKey};
pub use protection::{AeadKeyProtector, KeyProtector};
pub use secure_memory::{SecureBytes, SecureString};
