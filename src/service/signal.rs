//! # One-shot stop signal.
//!
//! [`StopSignal`] pairs a closed flag with a broadcast [`CancellationToken`]:
//! the first [`fire`](StopSignal::fire) wins and cancels the token, every later
//! call is told the signal was already fired. Any number of tasks can wait on
//! [`cancelled`](StopSignal::cancelled); the signal stays readable forever.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio_util::sync::CancellationToken;

/// Close-once broadcast signal.
#[derive(Debug, Default)]
pub struct StopSignal {
    fired: AtomicBool,
    token: CancellationToken,
}

impl StopSignal {
    /// Creates an unfired signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fires the signal. Returns `true` only for the call that actually fired it.
    pub fn fire(&self) -> bool {
        if self.fired.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.token.cancel();
        true
    }

    /// True once the signal has fired.
    #[inline]
    pub fn is_fired(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Completes once the signal has fired.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    /// Returns a token that is cancelled when the signal fires.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fires_once() {
        let sig = StopSignal::new();
        assert!(!sig.is_fired());
        assert!(sig.fire());
        assert!(!sig.fire());
        assert!(sig.is_fired());
        sig.cancelled().await;
        assert!(sig.token().is_cancelled());
    }
}
