//! Lifecycle events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish/subscribe to events emitted by composites and leaf services.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `FanOut`, `Round`, `BlockingRound`, leaf services,
//!   `run_until_shutdown`, `SubscriberSet` workers (overflow/panic).
//! - **Consumers**: [`Monitor`](crate::Monitor), which fans out to a `SubscriberSet`.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
