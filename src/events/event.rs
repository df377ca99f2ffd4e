//! # Lifecycle events emitted by services and composites.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Lifecycle events**: start/stop flow of a service or composite
//! - **Failure events**: forwarded errors, failed stops, stop timeouts
//! - **Round events**: round boundaries of round composites
//! - **Subscriber events**: overflow/panic reports from subscriber workers
//!
//! The [`Event`] struct carries additional metadata such as timestamps, service
//! name, child index, round number and error text.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Use `seq` to restore the exact order when events are delivered out of order.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use roundvisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::StopTimedOut)
//!     .with_service("fan-out")
//!     .with_error("children still stopping")
//!     .with_timeout(Duration::from_secs(5));
//!
//! assert_eq!(ev.kind, EventKind::StopTimedOut);
//! assert_eq!(ev.service.as_deref(), Some("fan-out"));
//! assert_eq!(ev.timeout_ms, Some(5_000));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

use crate::error::ServiceError;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets:
    /// - `service`: subscriber name
    /// - `error`: panic info/message
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets:
    /// - `service`: subscriber name
    /// - `error`: reason string (e.g., "full", "closed")
    SubscriberOverflow,

    // === Lifecycle events ===
    /// A service is being started.
    ///
    /// Sets:
    /// - `service`: service name
    /// - `index`: child index (fan-out children only)
    ServiceStarting,

    /// A service returned from `start` without error.
    ///
    /// Sets:
    /// - `service`: service name
    /// - `index`: child index (fan-out children only)
    ServiceStarted,

    /// A service failed to start.
    ///
    /// Sets:
    /// - `service`: service name
    /// - `index`: child index (fan-out children only)
    /// - `error`: start error
    StartFailed,

    /// Stop was requested.
    ///
    /// Sets:
    /// - `service`: service name
    ServiceStopping,

    /// A service finished stopping.
    ///
    /// Sets:
    /// - `service`: service name
    /// - `index`: child index (fan-out children only)
    ServiceStopped,

    // === Failure events ===
    /// A stop returned an error that the caller did not receive
    /// (superseded by an earlier error, or raised during rollback).
    ///
    /// Sets:
    /// - `service`: service name
    /// - `index`: child index (fan-out children only)
    /// - `error`: stop error
    StopFailed,

    /// Waiting for children to stop exceeded the configured timeout.
    ///
    /// Sets:
    /// - `service`: composite name
    /// - `timeout_ms`: configured timeout (ms)
    /// - `error`: indices of children still stopping
    StopTimedOut,

    /// An error was forwarded onto a composite's error channel.
    ///
    /// Sets:
    /// - `service`: composite name
    /// - `error`: forwarded error
    ErrorForwarded,

    // === Round events ===
    /// A new round pair was started.
    ///
    /// Sets:
    /// - `service`: composite name
    /// - `round`: round number (1-based)
    RoundStarted,

    /// Both services of a round finished cleanly.
    ///
    /// Sets:
    /// - `service`: composite name
    /// - `round`: round number (1-based)
    RoundCompleted,

    // === Leaf events ===
    /// A periodic leaf service performed its action.
    ///
    /// Sets:
    /// - `service`: service name
    /// - `index`: leaf index
    /// - `round`: run count
    Tick,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Name of the service, if applicable.
    pub service: Option<Arc<str>>,
    /// Child index inside a fan-out (or leaf index).
    pub index: Option<usize>,
    /// Round number (or run count for leaf ticks).
    pub round: Option<u64>,
    /// Timeout in milliseconds (compact).
    pub timeout_ms: Option<u32>,
    /// Human-readable error or detail.
    pub error: Option<Arc<str>>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            service: None,
            index: None,
            round: None,
            timeout_ms: None,
            error: None,
        }
    }

    /// Attaches a service name.
    #[inline]
    pub fn with_service(mut self, service: impl Into<Arc<str>>) -> Self {
        self.service = Some(service.into());
        self
    }

    /// Attaches a child index.
    #[inline]
    pub fn with_index(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }

    /// Attaches a round number.
    #[inline]
    pub fn with_round(mut self, round: u64) -> Self {
        self.round = Some(round);
        self
    }

    /// Attaches a timeout duration (stored as milliseconds).
    #[inline]
    pub fn with_timeout(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as u32;
        self.timeout_ms = Some(ms);
        self
    }

    /// Attaches an error message.
    #[inline]
    pub fn with_error(mut self, error: impl Into<Arc<str>>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Attaches a [`ServiceError`] rendered with `Display`.
    #[inline]
    pub fn with_service_error(self, err: &ServiceError) -> Self {
        self.with_error(err.to_string())
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_service(subscriber)
            .with_error(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_service(subscriber)
            .with_error(info)
    }

    /// True for [`EventKind::SubscriberOverflow`]; such events are never re-reported on overflow.
    #[inline]
    pub fn is_subscriber_overflow(&self) -> bool {
        matches!(self.kind, EventKind::SubscriberOverflow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seq_is_monotonic() {
        let a = Event::new(EventKind::ServiceStarting);
        let b = Event::new(EventKind::ServiceStarted);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn test_timeout_clamped_to_u32() {
        let ev = Event::new(EventKind::StopTimedOut).with_timeout(Duration::from_secs(u64::MAX));
        assert_eq!(ev.timeout_ms, Some(u32::MAX));
    }

    #[test]
    fn test_with_service_error_renders_display() {
        let ev = Event::new(EventKind::ErrorForwarded)
            .with_service_error(&ServiceError::child(2, ServiceError::Canceled));
        assert_eq!(
            ev.error.as_deref(),
            Some("service 2 error: stopped before completion")
        );
    }

    #[test]
    fn test_only_overflow_events_are_flagged() {
        assert!(Event::subscriber_overflow("log", "full").is_subscriber_overflow());
        assert!(!Event::subscriber_panicked("log", "boom".into()).is_subscriber_overflow());
    }
}
