//! Rotation tag model
//!
//! A rotation tag selects a key epoch for a group. It is supplied by the
//! caller on every derive/encrypt/decrypt call and is never persisted here.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Opaque, comparable version identifier for a group's key epoch
///
/// Changing the tag changes every derived user key for the group without
/// touching the stored master key. Ciphertexts written under one tag can only
/// be read back with that same tag.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RotationTag(String);

impl RotationTag {
    /// Create a tag from any string value
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    /// Get the tag as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Get the tag bytes fed into key derivation
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for RotationTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RotationTag {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for RotationTag {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl FromStr for RotationTag {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}
