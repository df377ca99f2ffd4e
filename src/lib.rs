//! # roundvisor
//!
//! **Roundvisor** composes long-running async services into larger services.
//!
//! A service is started once and stopped once. Non-blocking services hand back
//! an error channel on `start`; blocking services resolve `start` when they
//! finish. Composites are services themselves, so trees of any depth stop
//! together and report failures upward with the path they came from.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!                      ┌───────────────────────────────┐
//!                      │  run_until_shutdown(service)  │
//!                      │  (OS signal or channel close) │
//!                      └───────────────┬───────────────┘
//!                                      ▼
//!                      ┌───────────────────────────────┐
//!                      │            FanOut             │
//!                      │ start all ─ rollback on error │
//!                      │ forward "service i error: …"  │
//!                      └──────┬─────────────────┬──────┘
//!                             ▼                 ▼
//!               ┌──────────────────┐   ┌──────────────────────┐
//!               │      Round       │   │    BlockingRound     │
//!               │ pair (A, B) per  │   │ pair (A, B) per      │
//!               │ round, factory   │   │ round, ends when     │
//!               │ builds the next  │   │ both starts return   │
//!               └───┬──────────┬───┘   └───┬──────────────┬───┘
//!                   ▼          ▼           ▼              ▼
//!               Service    Service   BlockingService  BlockingService
//!
//!  every composite ──► Bus (broadcast events) ──► Monitor ──► SubscriberSet
//!                                                  ┌──────────┼──────────┐
//!                                                  ▼          ▼          ▼
//!                                               worker1    worker2    workerN
//! ```
//!
//! ### Error flow
//! ```text
//! leaf error ─► Round:  "error from serviceB: …, stopping round"
//!            ─► FanOut: "service 1 error: error from serviceB: …"
//!            ─► caller's ErrorReceiver
//! ```
//!
//! ## Features
//! | Area              | Description                                                   | Key types / traits                              |
//! |-------------------|---------------------------------------------------------------|-------------------------------------------------|
//! | **Services**      | Start/stop contract, non-blocking and blocking variants.      | [`Service`], [`BlockingService`], [`BaseService`] |
//! | **Composites**    | Fan-out and alternating rounds.                               | [`FanOut`], [`Round`], [`BlockingRound`]        |
//! | **Leaf services** | Ready-made units for tests and demos.                         | [`DelayedStop`], [`Ticker`], [`ServiceFn`]      |
//! | **Subscriber API**| Hook into lifecycle events.                                   | [`Subscribe`], [`Monitor`]                      |
//! | **Errors**        | Typed, attributable errors.                                   | [`ServiceError`]                                |
//! | **Configuration** | Centralize stop timeouts and buffer sizes.                    | [`Config`]                                      |
//!
//! ## Optional features
//! - `logging`: exports a simple built-in [`LogWriter`] _(demo/reference only)_.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use roundvisor::{
//!     Config, DelayedError, DelayedStop, FanOut, Monitor, Round, Service, ServiceRef, Subscribe,
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cfg = Config::default();
//!
//!     #[cfg(feature = "logging")]
//!     let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(roundvisor::LogWriter::new())];
//!     #[cfg(not(feature = "logging"))]
//!     let subs: Vec<Arc<dyn Subscribe>> = Vec::new();
//!     let monitor = Monitor::builder(cfg.clone()).with_subscribers(subs).build();
//!
//!     let round = Round::builder(&cfg, || {
//!         let a: ServiceRef = DelayedStop::arc(Duration::from_millis(20));
//!         let b: ServiceRef = DelayedError::arc(Duration::from_millis(10));
//!         (a, b)
//!     })
//!     .with_bus(monitor.bus())
//!     .build();
//!
//!     let children: Vec<ServiceRef> = vec![Arc::new(round)];
//!     let fan_out = FanOut::new(&cfg, children).with_bus(monitor.bus());
//!
//!     let mut errors = fan_out.start().await?;
//!     let err = errors.recv().await.expect("round reports its child error");
//!     println!("{err}");
//!
//!     fan_out.stop().await?;
//!     monitor.shutdown().await;
//!     Ok(())
//! }
//! ```
mod composite;
mod config;
mod error;
mod events;
mod monitor;
mod service;
mod services;
mod shutdown;
mod subscribers;

// ---- Public re-exports ----

pub use composite::{BlockingRound, BlockingRoundBuilder, FanOut, Round, RoundBuilder};
pub use config::Config;
pub use error::{ServiceError, Slot};
pub use events::{Bus, Event, EventKind};
pub use monitor::{Monitor, MonitorBuilder};
pub use service::{
    BaseService, BlockingService, BlockingServiceRef, ErrorReceiver, ErrorSender, Service,
    ServiceRef, StopSignal,
};
pub use services::{
    BlockingDelayedError, BlockingDelayedStop, CRITICAL_ERROR, DelayedError, DelayedStop,
    ServiceFn, StartError, Ticker, critical_error,
};
pub use shutdown::{run_until, run_until_shutdown, wait_for_shutdown_signal};
pub use subscribers::{Subscribe, SubscriberSet};

// Optional: expose a simple built-in logger subscriber (demo/reference).
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
