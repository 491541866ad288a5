//! Per-job cancellation token.

use crate::errors::DeckflowError;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cooperative cancellation flag checked by the job runner between steps.
///
/// Only the first cancellation reason is kept.
#[derive(Default)]
pub struct CancellationToken {
    cancelled: AtomicBool,
    reason: RwLock<Option<String>>,
}

impl CancellationToken {
    /// Creates a token that is not cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Returns false if the token was already cancelled.
    pub fn cancel(&self, reason: impl Into<String>) -> bool {
        if self
            .cancelled
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        *self.reason.write() = Some(reason.into());
        true
    }

    /// Returns whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Returns the cancellation reason, if any.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.reason.read().clone()
    }

    /// Fails with [`DeckflowError::Cancelled`] once cancellation was requested.
    pub fn check(&self) -> Result<(), DeckflowError> {
        if self.is_cancelled() {
            let reason = self.reason().unwrap_or_else(|| "cancelled".to_string());
            return Err(DeckflowError::Cancelled(reason));
        }
        Ok(())
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

    #[test]
    fn test_new_token_passes_check() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        assert!(token.check().is_ok());
    }

    #[test]
    fn test_first_reason_wins() {
        let token = CancellationToken::new();
        assert!(token.cancel("user requested"));
        assert!(!token.cancel("shutdown"));

        assert_eq!(token.reason().as_deref(), Some("user requested"));
        let err = token.check().unwrap_err();
        assert_eq!(err.kind(), "Cancelled");
        assert!(err.to_string().contains("user requested"));
    }
}
