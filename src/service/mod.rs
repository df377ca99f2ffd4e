//! # Service contract.
//!
//! Two capability variants of a long-running unit of work:
//!
//! - [`Service`]: **non-blocking**: `start` returns as soon as the service is
//!   ready, handing the caller an [`ErrorReceiver`]. The channel carries genuine
//!   failures only and is closed (`recv()` yields `None`) once the service has
//!   fully stopped.
//! - [`BlockingService`]: **blocking**: `start` resolves only when the service
//!   terminates, with its terminal error or `Ok(())`.
//!
//! A composite is built over exactly one variant.
//!
//! ## Rules
//! - `start` returning `Err` means the service never started; composites do not
//!   call `stop` on it.
//! - `stop` is idempotent: later calls return [`ServiceError::AlreadyStopped`].
//! - `stop` must bound its own wait; it must not hang forever.
//!
//! ## Example
//! ```rust
//! use async_trait::async_trait;
//! use roundvisor::{BaseService, Config, ErrorReceiver, Service, ServiceError};
//!
//! struct Idle {
//!     base: BaseService,
//! }
//!
//! #[async_trait]
//! impl Service for Idle {
//!     fn name(&self) -> &str { "idle" }
//!
//!     async fn start(&self) -> Result<ErrorReceiver, ServiceError> {
//!         self.base.start().await
//!     }
//!
//!     async fn stop(&self) -> Result<(), ServiceError> {
//!         self.base.stop().await
//!     }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let idle = Idle { base: BaseService::new(&Config::default()) };
//! let mut errors = idle.start().await.unwrap();
//! idle.stop().await.unwrap();
//! assert!(errors.recv().await.is_none());
//! assert!(idle.stop().await.unwrap_err().is_already_stopped());
//! # }
//! ```

mod base;
mod signal;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::ServiceError;

pub use base::BaseService;
pub use signal::StopSignal;

/// Receiving end of a service's error-reporting channel.
pub type ErrorReceiver = mpsc::Receiver<ServiceError>;

/// Sending end of an error-reporting channel.
pub type ErrorSender = mpsc::Sender<ServiceError>;

/// Shared handle to a non-blocking service.
pub type ServiceRef = Arc<dyn Service>;

/// Shared handle to a blocking service.
pub type BlockingServiceRef = Arc<dyn BlockingService>;

/// # Non-blocking long-running service.
///
/// The caller owns the returned [`ErrorReceiver`] and must keep reading it to
/// observe both failures and the close that signals the service has stopped.
#[async_trait]
pub trait Service: Send + Sync + 'static {
    /// Returns a stable, human-readable service name.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Starts the service. `Ok` implies the service is ready.
    async fn start(&self) -> Result<ErrorReceiver, ServiceError>;

    /// Stops the service and waits for cleanup, including closing the channel
    /// returned by [`start`](Service::start).
    async fn stop(&self) -> Result<(), ServiceError>;
}

/// # Blocking long-running service.
///
/// `start` runs until the service terminates or is told to stop.
#[async_trait]
pub trait BlockingService: Send + Sync + 'static {
    /// Returns a stable, human-readable service name.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Runs the service to completion. `Ok(())` means it terminated cleanly.
    async fn start(&self) -> Result<(), ServiceError>;

    /// Makes an in-flight [`start`](BlockingService::start) return.
    async fn stop(&self) -> Result<(), ServiceError>;
}
