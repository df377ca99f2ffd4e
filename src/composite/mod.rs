//! # Composites: services built from other services.
//!
//! | Composite          | Children     | Shape                                            |
//! |--------------------|--------------|--------------------------------------------------|
//! | [`FanOut`]         | non-blocking | run N children concurrently, stop them together  |
//! | [`Round`]          | non-blocking | run a pair, replace it with a fresh pair on exit |
//! | [`BlockingRound`]  | blocking     | same as `Round`, rounds end when `start` returns |
//!
//! Every composite implements [`Service`](crate::Service) itself, so they nest.

mod blocking_round;
mod fan_out;
mod round;
#[cfg(test)]
mod testing;

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;

use crate::error::ServiceError;
use crate::service::{BlockingServiceRef, ServiceRef};
use crate::subscribers::panic_message;

pub use blocking_round::{BlockingRound, BlockingRoundBuilder};
pub use fan_out::FanOut;
pub use round::{Round, RoundBuilder};

/// Builds the pair for the next round.
pub(crate) type PairFactory = Box<dyn Fn() -> (ServiceRef, ServiceRef) + Send + Sync>;

/// Builds the blocking pair for the next round.
pub(crate) type BlockingPairFactory =
    Box<dyn Fn() -> (BlockingServiceRef, BlockingServiceRef) + Send + Sync>;

/// Called between two clean rounds.
pub(crate) type RoundHook = Arc<dyn Fn() + Send + Sync>;

/// Turns a failed join of a child task into [`ServiceError::Panicked`].
pub(crate) fn join_failure(service: &str, err: JoinError) -> ServiceError {
    ServiceError::Panicked {
        service: service.to_string(),
        info: err
            .try_into_panic()
            .map(|p| panic_message(&*p))
            .unwrap_or_else(|_| "task cancelled".to_string()),
    }
}

/// Runs a composite's teardown on its own task and cancels `stopped` when it ends.
///
/// The teardown finishes even if the caller's future is dropped, so later
/// `stop` calls waiting on `stopped` always return.
pub(crate) async fn run_teardown<F>(
    service: &'static str,
    stopped: CancellationToken,
    teardown: F,
) -> Result<(), ServiceError>
where
    F: Future<Output = Result<(), ServiceError>> + Send + 'static,
{
    let handle = tokio::spawn(async move {
        let res = AssertUnwindSafe(teardown)
            .catch_unwind()
            .await
            .unwrap_or_else(|p| {
                Err(ServiceError::Panicked {
                    service: service.to_string(),
                    info: panic_message(&*p),
                })
            });
        stopped.cancel();
        res
    });
    handle.await.unwrap_or_else(|err| Err(join_failure(service, err)))
}
