//! Scriptable children for composite tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time;

use crate::error::ServiceError;
use crate::service::{BaseService, BlockingService, ErrorReceiver, Service, StopSignal};

/// Idles until stopped; counts `stop` calls, optionally stalls in `stop` or fails it.
#[derive(Default)]
pub(crate) struct Scripted {
    pub(crate) base: BaseService,
    pub(crate) stops: AtomicUsize,
    stall: Option<Duration>,
    stop_error: Option<ServiceError>,
}

impl Scripted {
    pub(crate) fn stalling(mut self, d: Duration) -> Self {
        self.stall = Some(d);
        self
    }

    pub(crate) fn failing_stop(mut self, err: ServiceError) -> Self {
        self.stop_error = Some(err);
        self
    }
}

#[async_trait]
impl Service for Scripted {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn start(&self) -> Result<ErrorReceiver, ServiceError> {
        self.base.start().await
    }

    async fn stop(&self) -> Result<(), ServiceError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        if let Some(d) = self.stall {
            time::sleep(d).await;
        }
        self.base.stop().await?;
        match &self.stop_error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

/// Blocking counterpart of [`Scripted`]: `start` runs until stopped.
#[derive(Default)]
pub(crate) struct BlockingScripted {
    signal: StopSignal,
    stall: Option<Duration>,
    stop_error: Option<ServiceError>,
}

impl BlockingScripted {
    pub(crate) fn stalling(mut self, d: Duration) -> Self {
        self.stall = Some(d);
        self
    }

    pub(crate) fn failing_stop(mut self, err: ServiceError) -> Self {
        self.stop_error = Some(err);
        self
    }
}

#[async_trait]
impl BlockingService for BlockingScripted {
    fn name(&self) -> &str {
        "blocking-scripted"
    }

    async fn start(&self) -> Result<(), ServiceError> {
        self.signal.cancelled().await;
        Err(ServiceError::Canceled)
    }

    async fn stop(&self) -> Result<(), ServiceError> {
        if let Some(d) = self.stall {
            time::sleep(d).await;
        }
        if !self.signal.fire() {
            return Err(ServiceError::AlreadyStopped);
        }
        match &self.stop_error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

pub(crate) fn fail(msg: &str) -> ServiceError {
    ServiceError::Fail {
        error: msg.to_string(),
    }
}
