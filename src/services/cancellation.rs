//! Cooperative cancellation for long-running decryption
//!
//! Batch trial decryption polls a [`Cancellation`] before every record
//! attempt. `tokio_util`'s `CancellationToken` and a plain `AtomicBool` both
//! work as sources.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio_util::sync::CancellationToken;

/// Something that can report whether the caller has given up
pub trait Cancellation {
    fn is_cancelled(&self) -> bool;
}

impl Cancellation for CancellationToken {
    fn is_cancelled(&self) -> bool {
        CancellationToken::is_cancelled(self)
    }
}

impl Cancellation for AtomicBool {
    fn is_cancelled(&self) -> bool {
        self.load(Ordering::Acquire)
    }
}

/// A source that is never cancelled
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverCancelled;

impl Cancellation for NeverCancelled {
    fn is_cancelled(&self) -> bool {
        false
    }
}
