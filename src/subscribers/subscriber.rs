//! # Event subscriber trait.
//!
//! A [`Subscribe`] implementation receives every lifecycle event a
//! [`Monitor`](crate::Monitor) sees: starts, stops, forwarded errors, round
//! boundaries. It runs on its own worker behind its own bounded queue, and a
//! panic in `on_event` is turned into `EventKind::SubscriberPanicked`.
//!
//! ## Example
//! Count clean rounds and remember the last forwarded error:
//! ```rust
//! use std::sync::Mutex;
//! use std::sync::atomic::{AtomicU64, Ordering};
//! use async_trait::async_trait;
//! use roundvisor::{Event, EventKind, Subscribe};
//!
//! #[derive(Default)]
//! struct RoundStats {
//!     completed: AtomicU64,
//!     last_error: Mutex<Option<String>>,
//! }
//!
//! #[async_trait]
//! impl Subscribe for RoundStats {
//!     async fn on_event(&self, ev: &Event) {
//!         match ev.kind {
//!             EventKind::RoundCompleted => {
//!                 self.completed.fetch_add(1, Ordering::Relaxed);
//!             }
//!             EventKind::ErrorForwarded => {
//!                 if let Ok(mut last) = self.last_error.lock() {
//!                     *last = ev.error.as_deref().map(str::to_owned);
//!                 }
//!             }
//!             _ => {}
//!         }
//!     }
//!
//!     fn name(&self) -> &'static str { "round-stats" }
//!     fn queue_capacity(&self) -> usize { 256 }
//! }
//! ```

use async_trait::async_trait;

use crate::events::Event;

/// Event subscriber for lifecycle observability.
///
/// ### Implementation requirements
/// - Use async I/O; avoid blocking the executor.
/// - Handle errors internally; do not panic.
/// - Slow processing affects only this subscriber's queue.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Processes a single event.
    ///
    /// Called from a dedicated worker task, in FIFO order per subscriber.
    async fn on_event(&self, event: &Event);

    /// Returns the subscriber name used in overflow/panic events.
    ///
    /// The default uses `type_name::<Self>()`, which can be verbose - override it when possible.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Returns the preferred queue capacity for this subscriber (clamped to 1).
    ///
    /// Default: 1024.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
