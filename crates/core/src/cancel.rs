//! Cooperative cancellation for long-running snapshots

use crate::error::{Result, SnapshotError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared flag signalling that the surrounding build was cancelled
///
/// Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation of every operation observing this token
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Fail with [`SnapshotError::Cancelled`] once cancellation was requested
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(SnapshotError::Cancelled)
        } else {
            Ok(())
        }
    }
}
