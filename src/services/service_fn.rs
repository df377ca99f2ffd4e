//! # Function-backed blocking service (`ServiceFn`)
//!
//! [`ServiceFn`] wraps a closure `F: Fn(CancellationToken) -> Fut`. `start`
//! runs the future the closure produces; `stop` cancels the token it was given.
//! Round factories build a fresh `ServiceFn` per round, so no state leaks
//! between rounds.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//! use roundvisor::{BlockingService, ServiceError, ServiceFn};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let svc = ServiceFn::arc("sleeper", |ctx: CancellationToken| async move {
//!     tokio::select! {
//!         _ = ctx.cancelled() => Err(ServiceError::Canceled),
//!         _ = tokio::time::sleep(Duration::from_millis(5)) => Ok(()),
//!     }
//! });
//! assert_eq!(svc.name(), "sleeper");
//! assert_eq!(svc.start().await, Ok(()));
//! # }
//! ```

use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::ServiceError;
use crate::service::{BlockingService, StopSignal};

/// Closure-backed [`BlockingService`].
pub struct ServiceFn<F> {
    name: Cow<'static, str>,
    f: F,
    signal: StopSignal,
}

impl<F> ServiceFn<F> {
    /// Creates a new function-backed service.
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
            signal: StopSignal::new(),
        }
    }

    /// Creates the service and returns it as a shared handle.
    pub fn arc(name: impl Into<Cow<'static, str>>, f: F) -> Arc<Self> {
        Arc::new(Self::new(name, f))
    }
}

#[async_trait]
impl<F, Fut> BlockingService for ServiceFn<F>
where
    F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), ServiceError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self) -> Result<(), ServiceError> {
        (self.f)(self.signal.token()).await
    }

    async fn stop(&self) -> Result<(), ServiceError> {
        if self.signal.fire() {
            Ok(())
        } else {
            Err(ServiceError::AlreadyStopped)
        }
    }
}
