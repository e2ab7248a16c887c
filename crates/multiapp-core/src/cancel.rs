//! Cooperative cancellation for plugin installs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A cancellation token shared between an install task and whoever started it.
///
/// Clones share state: cancelling any clone cancels them all. The installer
/// checks the token between steps and between download chunks, so an abort
/// always lands on a step boundary and leaves the previous install untouched.
///
/// # Example
///
/// ```
/// use multiapp_core::cancel::CancellationToken;
///
/// let token = CancellationToken::new();
/// let for_task = token.clone();
///
/// token.cancel();
/// assert!(for_task.is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
