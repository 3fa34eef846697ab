//! Cooperative cancellation
//!
//! A pass never preempts work in flight. Schedulers observe the token only at
//! well-defined boundaries: between chunks in the cooperative scheduler, before
//! each claim in a pool worker, and between passes in the escalator.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Cancellation flag shared between a requester and a running pass
///
/// Clones observe the same state, so the token can be handed to another
/// thread (or an input handler) that decides when to stop.
///
/// # Example
///
/// ```
/// use raypace_scheduler::CancellationToken;
///
/// let token = CancellationToken::new();
/// let input_handler = token.clone();
///
/// input_handler.cancel();
/// assert!(token.is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a token in the non-cancelled state
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    ///
    /// Idempotent. Takes effect at the next boundary the owner checks.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Check whether `cancel()` was called on this token or any clone
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}
