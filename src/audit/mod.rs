//! Audit logging for group key lifecycle events
//!
//! Records group key creation, deletion and re-protection in an append-only
//! JSONL log. Entries carry group ids and timestamps, never key material.
//!
//! # Example
//!
//! ```rust,ignore
//! use splitcrypt::audit::{AuditEntry, AuditLogger, EntityType};
//!
//! let logger = AuditLogger::new(audit_log_path);
//! logger.log(&AuditEntry::create(EntityType::GroupKey, group_id.to_string(), &summary))?;
//! ```

mod entry;
mod logger;

pub use entry::{AuditEntry, EntityType, Operation};
pub use logger::AuditLogger;
