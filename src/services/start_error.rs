use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::ServiceError;
use crate::service::{ErrorReceiver, Service};

/// Fails on `start` after `delay`; never becomes ready.
pub struct StartError {
    delay: Duration,
}

impl StartError {
    /// Creates the service.
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    /// Shared handle, ready to hand to a composite.
    pub fn arc(delay: Duration) -> Arc<Self> {
        Arc::new(Self::new(delay))
    }

    /// The error every `start` call returns.
    pub fn error() -> ServiceError {
        ServiceError::Start {
            error: "fatal start error".to_string(),
        }
    }
}

#[async_trait]
impl Service for StartError {
    fn name(&self) -> &str {
        "start-error"
    }

    async fn start(&self) -> Result<ErrorReceiver, ServiceError> {
        tokio::time::sleep(self.delay).await;
        Err(Self::error())
    }

    async fn stop(&self) -> Result<(), ServiceError> {
        Err(ServiceError::NotStarted)
    }
}
