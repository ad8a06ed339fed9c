//! Cooperative cancellation for reconciliation runs.
//!
//! The flag is checked between URLs only; an in-flight fetch always
//! completes and its outcome is committed.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Shared cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    cancelled: Arc<AtomicBool>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Cancel automatically once `budget` has elapsed.
    ///
    /// Must be called inside a tokio runtime.
    pub fn cancel_after(&self, budget: Duration) -> tokio::task::JoinHandle<()> {
        let flag = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(budget).await;
            if !flag.is_cancelled() {
                log::warn!("Time budget of {:?} exhausted, cancelling run", budget);
                flag.cancel();
            }
        })
    }
}
