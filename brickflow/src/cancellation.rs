//! Cooperative cancellation for pipeline runs.
//!
//! A token is created per run and travels with `RunInput`. The executor
//! consults it at its [`checkpoint`](CancellationToken::checkpoint)
//! between steps only: a brick invocation already in flight is never
//! interrupted, its eventual result is discarded. Tokens are single-use;
//! a re-run gets a fresh token.

use crate::errors::BrickflowError;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::warn;

/// Cleanup invoked once when the run is cancelled.
pub type CancelCallback = Box<dyn FnOnce() + Send>;

/// Cancellation signal for one pipeline run.
///
/// Cancellation is idempotent: the first reason wins and cleanup fires
/// exactly once.
#[derive(Default)]
pub struct CancellationToken {
    cancelled: AtomicBool,
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    reason: Option<String>,
    callbacks: Vec<CancelCallback>,
}

impl CancellationToken {
    /// Creates an active token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation (navigation, panel close, user abort).
    ///
    /// Later calls are ignored; registered cleanup runs once, outside
    /// the lock.
    pub fn cancel(&self, reason: impl Into<String>) {
        let callbacks = {
            let mut inner = self.inner.lock();
            if inner.reason.is_some() {
                return;
            }
            inner.reason = Some(reason.into());
            self.cancelled.store(true, Ordering::SeqCst);
            std::mem::take(&mut inner.callbacks)
        };

        for callback in callbacks {
            invoke(callback);
        }
    }

    /// Registers cleanup to run on cancellation (closing message ports,
    /// releasing page resources). Fires immediately if the run is
    /// already cancelled.
    pub fn on_cancel<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        {
            let mut inner = self.inner.lock();
            if inner.reason.is_none() {
                inner.callbacks.push(Box::new(callback));
                return;
            }
        }
        invoke(Box::new(callback));
    }

    /// Returns whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Returns the cancellation reason, if any.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.inner.lock().reason.clone()
    }

    /// The executor's between-steps check.
    ///
    /// Passes while the run is active; yields the cancellation marker
    /// (not an error in the failure taxonomy) once cancelled.
    pub fn checkpoint(&self) -> Result<(), BrickflowError> {
        if !self.is_cancelled() {
            return Ok(());
        }
        let reason = self
            .reason()
            .unwrap_or_else(|| "cancelled".to_string());
        Err(BrickflowError::cancelled(reason))
    }
}

/// Cleanup must not take the run down with it.
fn invoke(callback: CancelCallback) {
    if std::panic::catch_unwind(std::panic::AssertUnwindSafe(callback)).is_err() {
        warn!("cancellation callback panicked");
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .field("reason", &self.reason())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn test_active_token_passes_checkpoint() {
        let token = CancellationToken::new();
        assert!(token.checkpoint().is_ok());
        assert!(!token.is_cancelled());
        assert!(token.reason().is_none());
    }

    #[test]
    fn test_checkpoint_yields_the_cancellation_marker() {
        let token = CancellationToken::new();
        token.cancel("navigation");

        let err = token.checkpoint().unwrap_err();
        assert!(err.is_cancelled());
        assert!(err.to_string().contains("navigation"));
    }

    #[test]
    fn test_first_reason_wins() {
        let token = CancellationToken::new();
        token.cancel("panel closed");
        token.cancel("navigation");

        assert_eq!(token.reason(), Some("panel closed".to_string()));
    }

    #[test]
    fn test_cleanup_fires_exactly_once() {
        let token = CancellationToken::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_clone = fired.clone();

        token.on_cancel(move || {
            fired_clone.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(fired.load(Ordering::SeqCst), 0);
        token.cancel("first");
        token.cancel("second");
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_late_registration_fires_immediately() {
        let token = CancellationToken::new();
        token.cancel("navigation");

        let fired = Arc::new(AtomicUsize::new(0));
        let fired_clone = fired.clone();
        token.on_cancel(move || {
            fired_clone.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cleanup_panic_is_contained() {
        let token = CancellationToken::new();
        token.on_cancel(|| panic!("port already closed"));

        token.cancel("navigation");
        assert!(token.is_cancelled());
        assert!(token.checkpoint().is_err());
    }
}
