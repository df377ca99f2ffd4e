//! # Monitor: wires a [`Bus`] to a set of subscribers.
//!
//! Composites and leaf services only publish. A [`Monitor`] owns the listening
//! side: it subscribes to the bus and fans each event out through a
//! [`SubscriberSet`] (fire-and-forget).
//!
//! ```text
//! FanOut / Round / leaf ── publish ──► Bus ──► listener ──► SubscriberSet::emit
//! ```
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use roundvisor::{Config, Monitor, Subscribe};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let subs: Vec<Arc<dyn Subscribe>> = Vec::new();
//! let monitor = Monitor::builder(Config::default()).with_subscribers(subs).build();
//! let bus = monitor.bus();
//! // hand `bus` to composites via `with_bus(...)`
//! # drop(bus);
//! monitor.shutdown().await;
//! # }
//! ```

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::events::Bus;
use crate::subscribers::{Subscribe, SubscriberSet};

/// Builder for constructing a [`Monitor`].
pub struct MonitorBuilder {
    cfg: Config,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl MonitorBuilder {
    /// Sets event subscribers.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Builds the monitor and spawns its listener. Must be called inside a tokio runtime.
    pub fn build(self) -> Monitor {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let subs = SubscriberSet::new(self.subscribers, bus.clone());
        let token = CancellationToken::new();

        let mut rx = bus.subscribe();
        let stop = token.clone();
        let listener = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    msg = rx.recv() => match msg {
                        Ok(ev) => subs.emit(ev),
                        Err(RecvError::Lagged(_)) => continue,
                        Err(RecvError::Closed) => break,
                    },
                    _ = stop.cancelled() => break,
                }
            }
            subs.shutdown().await;
        });

        Monitor {
            bus,
            token,
            listener,
        }
    }
}

/// Owns the event bus and the subscriber workers attached to it.
pub struct Monitor {
    bus: Bus,
    token: CancellationToken,
    listener: JoinHandle<()>,
}

impl Monitor {
    /// Starts building a monitor with the given configuration.
    pub fn builder(cfg: Config) -> MonitorBuilder {
        MonitorBuilder {
            cfg,
            subscribers: Vec::new(),
        }
    }

    /// Returns a handle to the bus publishers should use.
    pub fn bus(&self) -> Bus {
        self.bus.clone()
    }

    /// Stops listening and waits for subscriber workers to drain their queues.
    ///
    /// Events already received by the listener are delivered; events still in the
    /// broadcast ring are not.
    pub async fn shutdown(self) {
        self.token.cancel();
        let _ = self.listener.await;
    }
}
