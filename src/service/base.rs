//! # Base reference service.
//!
//! [`BaseService`] owns one error channel and the one-shot stop discipline that
//! leaf services reuse: `start` hands out the receiver, `stop` drops the owned
//! sender and later calls report [`ServiceError::AlreadyStopped`].
//!
//! Reports never race the close: [`BaseService::report`] sends through a clone
//! of the sender, and the channel only closes once the last clone is dropped.

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};

use crate::config::Config;
use crate::error::ServiceError;
use crate::service::{ErrorReceiver, ErrorSender, Service};

/// Minimal service: idles until stopped, reports errors on request.
pub struct BaseService {
    tx: Mutex<Option<ErrorSender>>,
    rx: Mutex<Option<ErrorReceiver>>,
}

impl BaseService {
    /// Creates the service and its error channel.
    pub fn new(cfg: &Config) -> Self {
        let (tx, rx) = mpsc::channel(cfg.error_buffer_clamped());
        Self {
            tx: Mutex::new(Some(tx)),
            rx: Mutex::new(Some(rx)),
        }
    }

    /// Hands out the error channel.
    ///
    /// Returns `AlreadyStopped` after [`stop`](Self::stop), `AlreadyStarted` on a second call.
    pub async fn start(&self) -> Result<ErrorReceiver, ServiceError> {
        if self.is_stopped().await {
            return Err(ServiceError::AlreadyStopped);
        }
        self.rx.lock().await.take().ok_or(ServiceError::AlreadyStarted)
    }

    /// Closes the error channel. The second call returns `AlreadyStopped`.
    pub async fn stop(&self) -> Result<(), ServiceError> {
        match self.tx.lock().await.take() {
            Some(tx) => {
                drop(tx);
                Ok(())
            }
            None => Err(ServiceError::AlreadyStopped),
        }
    }

    /// Delivers a failure to the owner of the error channel.
    ///
    /// Returns `false` if the service already stopped or nobody holds the receiver.
    pub async fn report(&self, err: ServiceError) -> bool {
        let tx = self.tx.lock().await.clone();
        match tx {
            Some(tx) => tx.send(err).await.is_ok(),
            None => false,
        }
    }

    /// True once [`stop`](Self::stop) has run.
    pub async fn is_stopped(&self) -> bool {
        self.tx.lock().await.is_none()
    }
}

impl Default for BaseService {
    fn default() -> Self {
        Self::new(&Config::default())
    }
}

#[async_trait]
impl Service for BaseService {
    fn name(&self) -> &str {
        "base"
    }

    async fn start(&self) -> Result<ErrorReceiver, ServiceError> {
        BaseService::start(self).await
    }

    async fn stop(&self) -> Result<(), ServiceError> {
        BaseService::stop(self).await
    }
}
