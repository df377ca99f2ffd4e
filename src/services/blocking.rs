//! Blocking services that finish after a fixed delay.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time;

use crate::error::ServiceError;
use crate::service::{BlockingService, StopSignal};
use crate::services::critical_error;

/// Returns `Ok(())` after `delay`, or [`ServiceError::Canceled`] if stopped first.
pub struct BlockingDelayedStop {
    delay: Duration,
    signal: StopSignal,
}

impl BlockingDelayedStop {
    /// Creates the service.
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            signal: StopSignal::new(),
        }
    }

    /// Shared handle, ready to hand to a composite.
    pub fn arc(delay: Duration) -> Arc<Self> {
        Arc::new(Self::new(delay))
    }
}

#[async_trait]
impl BlockingService for BlockingDelayedStop {
    fn name(&self) -> &str {
        "blocking-delayed-stop"
    }

    async fn start(&self) -> Result<(), ServiceError> {
        tokio::select! {
            biased;
            _ = self.signal.cancelled() => Err(ServiceError::Canceled),
            _ = time::sleep(self.delay) => Ok(()),
        }
    }

    async fn stop(&self) -> Result<(), ServiceError> {
        if self.signal.fire() {
            Ok(())
        } else {
            Err(ServiceError::AlreadyStopped)
        }
    }
}

/// Returns [`critical_error`] after `delay`, or [`ServiceError::Canceled`] if stopped first.
pub struct BlockingDelayedError {
    delay: Duration,
    signal: StopSignal,
}

impl BlockingDelayedError {
    /// Creates the service.
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            signal: StopSignal::new(),
        }
    }

    /// Shared handle, ready to hand to a composite.
    pub fn arc(delay: Duration) -> Arc<Self> {
        Arc::new(Self::new(delay))
    }
}

#[async_trait]
impl BlockingService for BlockingDelayedError {
    fn name(&self) -> &str {
        "blocking-delayed-error"
    }

    async fn start(&self) -> Result<(), ServiceError> {
        tokio::select! {
            biased;
            _ = self.signal.cancelled() => Err(ServiceError::Canceled),
            _ = time::sleep(self.delay) => Err(critical_error()),
        }
    }

    async fn stop(&self) -> Result<(), ServiceError> {
        if self.signal.fire() {
            Ok(())
        } else {
            Err(ServiceError::AlreadyStopped)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_delayed_stop_runs_to_completion() {
        let svc = BlockingDelayedStop::new(Duration::from_secs(1));
        assert_eq!(svc.start().await, Ok(()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_unblocks_start() {
        let svc = BlockingDelayedStop::arc(Duration::from_secs(60));
        let run = {
            let svc = svc.clone();
            tokio::spawn(async move { svc.start().await })
        };
        time::sleep(Duration::from_millis(1)).await;

        assert_eq!(svc.stop().await, Ok(()));
        assert_eq!(run.await.expect("join"), Err(ServiceError::Canceled));
        assert_eq!(svc.stop().await, Err(ServiceError::AlreadyStopped));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_error_returns_critical() {
        let svc = BlockingDelayedError::new(Duration::from_secs(1));
        assert_eq!(svc.start().await, Err(critical_error()));
    }
}
