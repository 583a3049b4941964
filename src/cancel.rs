//! Cooperative cancellation for long-running backup operations.
//!
//! A backup is driven by a single logical task, but every long step —
//! engine queries, part moves, object copies, keeper dumps — must be
//! interruptible. The orchestrator checks the token before entering each
//! such step; in-flight work inside an adapter is the adapter's concern.
//!
//! Cancellation never triggers directory cleanup: the half-written backup
//! stays on disk (without its commit marker) and retention reaps it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cloneable cancellation handle shared between the backup task and its
/// controller.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Safe to call from any thread, any number of
    /// times.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Step-boundary check: returns `Err(Cancelled)` once `cancel` has
    /// been called.
    pub fn check(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Marker error for a cancelled operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("operation cancelled")]
pub struct Cancelled;
