//! Cooperative cancellation for render passes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::RenderError;

/// Cloneable cancellation flag checked between fragment writes
#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    cancelled: Arc<AtomicBool>,
}

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; returns false if already cancelled
    pub fn cancel(&self) -> bool {
        !self.cancelled.swap(true, Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// `Err(RenderError::Cancelled)` once cancellation was requested
    pub fn check(&self) -> Result<(), RenderError> {
        if self.is_cancelled() {
            Err(RenderError::Cancelled)
        } else {
            Ok(())
        }
    }
}
