//! Services that end themselves after a fixed delay.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time;

use crate::config::Config;
use crate::error::ServiceError;
use crate::service::{BaseService, ErrorReceiver, Service, StopSignal};
use crate::services::critical_error;

/// Stops itself cleanly once `delay` has elapsed.
pub struct DelayedStop {
    base: Arc<BaseService>,
    timer: Arc<StopSignal>,
    delay: Duration,
}

impl DelayedStop {
    /// Creates the service with the default configuration.
    pub fn new(delay: Duration) -> Self {
        Self::with_config(&Config::default(), delay)
    }

    /// Creates the service.
    pub fn with_config(cfg: &Config, delay: Duration) -> Self {
        Self {
            base: Arc::new(BaseService::new(cfg)),
            timer: Arc::new(StopSignal::new()),
            delay,
        }
    }

    /// Shared handle, ready to hand to a composite.
    pub fn arc(delay: Duration) -> Arc<Self> {
        Arc::new(Self::new(delay))
    }
}

#[async_trait]
impl Service for DelayedStop {
    fn name(&self) -> &str {
        "delayed-stop"
    }

    async fn start(&self) -> Result<ErrorReceiver, ServiceError> {
        let rx = self.base.start().await?;
        let base = Arc::clone(&self.base);
        let timer = Arc::clone(&self.timer);
        let delay = self.delay;
        tokio::spawn(async move {
            tokio::select! {
                _ = time::sleep(delay) => {
                    let _ = base.stop().await;
                }
                _ = timer.cancelled() => {}
            }
        });
        Ok(rx)
    }

    async fn stop(&self) -> Result<(), ServiceError> {
        self.timer.fire();
        self.base.stop().await
    }
}

/// Reports [`critical_error`] once `delay` has elapsed, then stops itself.
pub struct DelayedError {
    base: Arc<BaseService>,
    timer: Arc<StopSignal>,
    delay: Duration,
}

impl DelayedError {
    /// Creates the service with the default configuration.
    pub fn new(delay: Duration) -> Self {
        Self::with_config(&Config::default(), delay)
    }

    /// Creates the service.
    pub fn with_config(cfg: &Config, delay: Duration) -> Self {
        Self {
            base: Arc::new(BaseService::new(cfg)),
            timer: Arc::new(StopSignal::new()),
            delay,
        }
    }

    /// Shared handle, ready to hand to a composite.
    pub fn arc(delay: Duration) -> Arc<Self> {
        Arc::new(Self::new(delay))
    }
}

#[async_trait]
impl Service for DelayedError {
    fn name(&self) -> &str {
        "delayed-error"
    }

    async fn start(&self) -> Result<ErrorReceiver, ServiceError> {
        let rx = self.base.start().await?;
        let base = Arc::clone(&self.base);
        let timer = Arc::clone(&self.timer);
        let delay = self.delay;
        tokio::spawn(async move {
            tokio::select! {
                _ = time::sleep(delay) => {
                    base.report(critical_error()).await;
                    let _ = base.stop().await;
                }
                _ = timer.cancelled() => {}
            }
        });
        Ok(rx)
    }

    async fn stop(&self) -> Result<(), ServiceError> {
        self.timer.fire();
        self.base.stop().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_delayed_stop_closes_without_error() {
        let svc = DelayedStop::new(Duration::from_secs(1));
        let mut rx = svc.start().await.expect("start");

        assert!(rx.recv().await.is_none());
        assert_eq!(svc.stop().await, Err(ServiceError::AlreadyStopped));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_error_reports_then_closes() {
        let svc = DelayedError::new(Duration::from_secs(1));
        let mut rx = svc.start().await.expect("start");

        assert_eq!(rx.recv().await, Some(critical_error()));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_early_stop_suppresses_delayed_error() {
        let svc = DelayedError::new(Duration::from_secs(1));
        let mut rx = svc.start().await.expect("start");

        assert_eq!(svc.stop().await, Ok(()));
        assert!(rx.recv().await.is_none());
        assert_eq!(svc.stop().await, Err(ServiceError::AlreadyStopped));
    }
}
