//! # Runtime configuration.
//!
//! Provides [`Config`] centralized settings shared by composites, leaf services
//! and the [`Monitor`](crate::Monitor).
//!
//! The per-round factory of a round composite is behavioural configuration and
//! is passed to its constructor directly; everything here is tuning.
//!
//! ## Sentinel values
//! - `bus_capacity = 0` → clamped to 1
//! - `error_buffer = 0` → clamped to 1 (tokio mpsc channels cannot be zero-sized)

use std::time::Duration;

/// Global configuration for services and composites.
///
/// ## Field semantics
/// - `stop_timeout`: how long a fan-out waits for its children to stop; also bounds
///   the internal wait of leaf services that join a worker on stop
/// - `bus_capacity`: event bus ring buffer size (min 1)
/// - `error_buffer`: capacity of every error channel created by this crate (min 1)
#[derive(Clone, Debug)]
pub struct Config {
    /// Maximum time to wait for children to finish stopping.
    ///
    /// When it elapses, the fan-out returns `ServiceError::StopTimeout`; the
    /// outstanding child stops keep running in the background.
    pub stop_timeout: Duration,

    /// Capacity of the event bus broadcast channel ring buffer.
    pub bus_capacity: usize,

    /// Capacity of error-reporting channels.
    ///
    /// Kept minimal: a producer waits until its owner has read the previous error.
    pub error_buffer: usize,
}

impl Config {
    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// Returns an error channel capacity clamped to a minimum of 1.
    #[inline]
    pub fn error_buffer_clamped(&self) -> usize {
        self.error_buffer.max(1)
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `stop_timeout = 5s`
    /// - `bus_capacity = 1024`
    /// - `error_buffer = 1`
    fn default() -> Self {
        Self {
            stop_timeout: Duration::from_secs(5),
            bus_capacity: 1024,
            error_buffer: 1,
        }
    }
}
