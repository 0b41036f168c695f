//! Configuration module for splitcrypt
//!
//! This module provides configuration management including:
//! - Data directory resolution
//! - Settings persistence (derivation parameters, field format, protection key)

pub mod paths;
pub mod settings;

pub use paths::SplitPaths;
pub use settings::{DerivationSettings, ProtectionSettings, Settings};
