//! Cancellation tokens for background loops
//!
//! A token is shared between the owner of a background thread and the thread
//! itself. The thread either polls `is_cancelled()` or sleeps in
//! `wait_timeout()`, which wakes early as soon as the token is cancelled.

use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

#[derive(Default)]
struct TokenState {
    cancelled: Mutex<bool>,
    wake: Condvar,
}

/// Cancellation token for cooperative shutdown
///
/// Clones share the same cancellation state.
///
/// # Example
///
/// ```
/// use scrawl_scheduler::CancellationToken;
/// use std::time::Duration;
///
/// let token = CancellationToken::new();
/// let worker_token = token.clone();
///
/// token.cancel();
/// // Returns immediately once cancelled
/// assert!(worker_token.wait_timeout(Duration::from_secs(60)));
/// ```
#[derive(Clone, Default)]
pub struct CancellationToken {
    state: Arc<TokenState>,
}

impl CancellationToken {
    /// Create a new token in the non-cancelled state
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel this token and wake every waiter
    ///
    /// Idempotent.
    pub fn cancel(&self) {
        let mut cancelled = self
            .state
            .cancelled
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        *cancelled = true;
        self.state.wake.notify_all();
    }

    /// Returns `true` if `cancel()` has been called on this token or any clone
    pub fn is_cancelled(&self) -> bool {
        *self
            .state
            .cancelled
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    /// Sleep for up to `timeout`, waking early on cancellation
    ///
    /// Returns `true` if the token is cancelled.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut cancelled = self
            .state
            .cancelled
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        while !*cancelled {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let (guard, _) = self
                .state
                .wake
                .wait_timeout(cancelled, deadline - now)
                .unwrap_or_else(|e| e.into_inner());
            cancelled = guard;
        }
        *cancelled
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
