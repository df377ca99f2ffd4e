//! # Leaf services.
//!
//! Single-purpose units used to exercise and demonstrate composites:
//!
//! | Service                  | Variant      | Behaviour                                            |
//! |--------------------------|--------------|------------------------------------------------------|
//! | [`DelayedStop`]          | non-blocking | stops itself cleanly after a delay                   |
//! | [`DelayedError`]         | non-blocking | reports a critical error after a delay, then stops   |
//! | [`StartError`]           | non-blocking | fails on `start` after a delay                       |
//! | [`Ticker`]               | non-blocking | counts ticks every period until stopped              |
//! | [`BlockingDelayedStop`]  | blocking     | returns `Ok` after a delay                           |
//! | [`BlockingDelayedError`] | blocking     | returns a critical error after a delay               |
//! | [`ServiceFn`]            | blocking     | runs a closure that receives a cancellation token    |

mod blocking;
mod delayed;
mod service_fn;
mod start_error;
mod ticker;

pub use blocking::{BlockingDelayedError, BlockingDelayedStop};
pub use delayed::{DelayedError, DelayedStop};
pub use service_fn::ServiceFn;
pub use start_error::StartError;
pub use ticker::Ticker;

use crate::error::ServiceError;

/// Message carried by the critical error of [`DelayedError`] and [`BlockingDelayedError`].
pub const CRITICAL_ERROR: &str = "critical error, shutting down";

/// The critical error reported by the delayed-error services.
pub fn critical_error() -> ServiceError {
    ServiceError::Fatal {
        error: CRITICAL_ERROR.to_string(),
    }
}
