//! Error type shared by services and composites.
//!
//! [`ServiceError`] is a closed set of kinds. Sentinel conditions such as
//! [`ServiceError::AlreadyStopped`] are checked by matching, never by identity.
//!
//! Composites wrap child errors (`Child`, `Round`, `StartAborted`, `NextRound`)
//! so the origin stays attributable; [`ServiceError::root_cause`] walks back to
//! the error the leaf actually produced.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Position of a child inside a round pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    /// First service returned by the factory.
    A,
    /// Second service returned by the factory.
    B,
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::A => f.write_str("serviceA"),
            Slot::B => f.write_str("serviceB"),
        }
    }
}

/// # Errors produced by services and composites.
///
/// Leaf kinds (`Start`, `Fatal`, `Fail`, `Canceled`) come from the units doing
/// work. Lifecycle kinds (`AlreadyStopped`, `AlreadyStarted`, `NotStarted`,
/// `StopTimeout`) come from the start/stop discipline itself. Wrapping kinds
/// carry the child error as their [`source`](std::error::Error::source).
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// `stop` was called on a service that has already stopped.
    #[error("service already stopped")]
    AlreadyStopped,

    /// `start` was called on a service that is already running.
    #[error("service already started")]
    AlreadyStarted,

    /// `stop` was called on a service that never became ready.
    #[error("service was never started")]
    NotStarted,

    /// Children did not finish stopping within the configured timeout.
    #[error("timed out after {timeout:?} trying to stop running services")]
    StopTimeout {
        /// The timeout that elapsed.
        timeout: Duration,
    },

    /// Service failed before becoming ready.
    #[error("start failed: {error}")]
    Start {
        /// The underlying error message.
        error: String,
    },

    /// Critical runtime failure after a successful start.
    #[error("fatal error: {error}")]
    Fatal {
        /// The underlying error message.
        error: String,
    },

    /// Non-critical runtime failure.
    #[error("execution failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// A blocking service was told to stop before it finished its work.
    #[error("stopped before completion")]
    Canceled,

    /// A spawned service task panicked.
    #[error("service {service:?} panicked: {info}")]
    Panicked {
        /// Name of the service whose task panicked.
        service: String,
        /// Panic payload, if it was a string.
        info: String,
    },

    /// Error forwarded from a fan-out child.
    #[error("service {index} error: {source}")]
    Child {
        /// Index of the child in the fan-out.
        index: usize,
        /// The child's error.
        #[source]
        source: Box<ServiceError>,
    },

    /// Fan-out start was aborted because a child failed to start.
    #[error("received an error when starting services: {source}")]
    StartAborted {
        /// First start error, by child index.
        #[source]
        source: Box<ServiceError>,
    },

    /// Error forwarded from one side of a round; the round composite stops.
    #[error("error from {slot}: {source}, stopping round")]
    Round {
        /// Which child of the pair failed.
        slot: Slot,
        /// The child's error.
        #[source]
        source: Box<ServiceError>,
    },

    /// The next round could not be started; the round composite stops.
    #[error("error starting next round: {source}, stopping round")]
    NextRound {
        /// The start error of the new pair.
        #[source]
        source: Box<ServiceError>,
    },
}

impl ServiceError {
    /// Tags `source` as coming from fan-out child `index`.
    pub fn child(index: usize, source: ServiceError) -> Self {
        ServiceError::Child {
            index,
            source: Box::new(source),
        }
    }

    /// Tags `source` as coming from round slot `slot`.
    pub fn round(slot: Slot, source: ServiceError) -> Self {
        ServiceError::Round {
            slot,
            source: Box::new(source),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use roundvisor::ServiceError;
    ///
    /// let err = ServiceError::child(1, ServiceError::Canceled);
    /// assert_eq!(err.as_label(), "child_error");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            ServiceError::AlreadyStopped => "already_stopped",
            ServiceError::AlreadyStarted => "already_started",
            ServiceError::NotStarted => "not_started",
            ServiceError::StopTimeout { .. } => "stop_timeout",
            ServiceError::Start { .. } => "start_failed",
            ServiceError::Fatal { .. } => "fatal",
            ServiceError::Fail { .. } => "failed",
            ServiceError::Canceled => "canceled",
            ServiceError::Panicked { .. } => "panicked",
            ServiceError::Child { .. } => "child_error",
            ServiceError::StartAborted { .. } => "start_aborted",
            ServiceError::Round { .. } => "round_error",
            ServiceError::NextRound { .. } => "next_round_failed",
        }
    }

    /// Follows wrapping kinds down to the error the leaf produced.
    ///
    /// # Example
    /// ```
    /// use roundvisor::{ServiceError, Slot};
    ///
    /// let leaf = ServiceError::Fatal { error: "disk gone".into() };
    /// let err = ServiceError::round(Slot::B, ServiceError::child(3, leaf.clone()));
    /// assert_eq!(err.root_cause(), &leaf);
    /// ```
    pub fn root_cause(&self) -> &ServiceError {
        let mut cur = self;
        loop {
            match cur {
                ServiceError::Child { source, .. }
                | ServiceError::StartAborted { source }
                | ServiceError::Round { source, .. }
                | ServiceError::NextRound { source } => cur = &**source,
                _ => return cur,
            }
        }
    }

    /// True for the idempotent-stop sentinel.
    #[inline]
    pub fn is_already_stopped(&self) -> bool {
        matches!(self, ServiceError::AlreadyStopped)
    }
}

/// Keeps the first error that is not [`ServiceError::AlreadyStopped`].
pub(crate) fn first_real_error<I>(results: I) -> Result<(), ServiceError>
where
    I: IntoIterator<Item = Result<(), ServiceError>>,
{
    results
        .into_iter()
        .filter_map(Result::err)
        .find(|e| !e.is_already_stopped())
        .map_or(Ok(()), Err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_child_display_is_tagged_with_index() {
        let err = ServiceError::child(
            1,
            ServiceError::Fatal {
                error: "boom".into(),
            },
        );
        assert_eq!(err.to_string(), "service 1 error: fatal error: boom");
    }

    #[test]
    fn test_round_display_names_slot() {
        let err = ServiceError::round(Slot::B, ServiceError::Canceled);
        assert_eq!(
            err.to_string(),
            "error from serviceB: stopped before completion, stopping round"
        );
    }

    #[test]
    fn test_source_chain() {
        let err = ServiceError::StartAborted {
            source: Box::new(ServiceError::Start {
                error: "nope".into(),
            }),
        };
        let src = err.source().expect("wrapping kinds expose a source");
        assert_eq!(src.to_string(), "start failed: nope");
        assert!(ServiceError::AlreadyStopped.source().is_none());
    }

    #[test]
    fn test_root_cause_of_leaf_is_itself() {
        let err = ServiceError::Canceled;
        assert_eq!(err.root_cause(), &ServiceError::Canceled);
    }

    #[test]
    fn test_first_real_error_skips_already_stopped() {
        let res = first_real_error([
            Ok(()),
            Err(ServiceError::AlreadyStopped),
            Err(ServiceError::NotStarted),
            Err(ServiceError::Canceled),
        ]);
        assert_eq!(res, Err(ServiceError::NotStarted));

        let res = first_real_error([Err(ServiceError::AlreadyStopped), Ok(())]);
        assert_eq!(res, Ok(()));
    }
}
