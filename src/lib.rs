//! splitcrypt - per-group field encryption for shared expenses
//!
//! Every group gets one random master key, stored only in protected form.
//! Each member's field key is derived from that master key, the member's id
//! and a caller-supplied rotation tag, and the four shared expense fields are
//! sealed with AES-256-GCM under it. Because nothing records which member
//! encrypted a row, reading a batch recovers owners by trial decryption over
//! the group's members.
//!
//! # Architecture
//!
//! - `config`: path resolution and settings
//! - `error`: custom error types
//! - `models`: ids, rotation tags, expense fields and key rows
//! - `crypto`: field cipher, member key derivation, key protection
//! - `storage`: JSON-file group key table
//! - `audit`: audit log of group key lifecycle events
//! - `services`: group key lifecycle and expense encryption
//! - `cli` / `display`: the `splitcrypt` command line
//!
//! # Example
//!
//! ```rust,ignore
//! use splitcrypt::config::{paths::SplitPaths, settings::Settings};
//! use splitcrypt::storage::Storage;
//!
//! let paths = SplitPaths::new()?;
//! let settings = Settings::load_or_create(&paths)?;
//! let storage = Storage::open(paths)?;
//! ```

pub mod audit;
pub mod cli;
pub mod config;
pub mod crypto;
pub mod display;
pub mod error;
pub mod models;
pub mod services;
pub mod storage;

pub use error::{SplitError, SplitResult};
