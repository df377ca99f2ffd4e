//! # Ticker: periodic trivial work.
//!
//! Every `period` the ticker bumps its run count and publishes
//! [`EventKind::Tick`]. It never reports an error; `stop` cancels the loop and
//! waits for it at most [`Config::stop_timeout`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::task::TaskTracker;

use crate::config::Config;
use crate::error::ServiceError;
use crate::events::{Bus, Event, EventKind};
use crate::service::{BaseService, ErrorReceiver, Service, StopSignal};

/// Periodic leaf service.
pub struct Ticker {
    index: usize,
    period: Duration,
    stop_timeout: Duration,
    runs: Arc<AtomicU64>,
    base: BaseService,
    signal: StopSignal,
    worker: TaskTracker,
    bus: Bus,
}

impl Ticker {
    /// Creates a ticker identified by `index` that fires every `period`.
    pub fn new(cfg: &Config, index: usize, period: Duration) -> Self {
        Self {
            index,
            period,
            stop_timeout: cfg.stop_timeout,
            runs: Arc::new(AtomicU64::new(0)),
            base: BaseService::new(cfg),
            signal: StopSignal::new(),
            worker: TaskTracker::new(),
            bus: Bus::new(cfg.bus_capacity_clamped()),
        }
    }

    /// Publishes tick events on `bus`.
    pub fn with_bus(mut self, bus: Bus) -> Self {
        self.bus = bus;
        self
    }

    /// Number of ticks so far.
    pub fn run_count(&self) -> u64 {
        self.runs.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Service for Ticker {
    fn name(&self) -> &str {
        "ticker"
    }

    async fn start(&self) -> Result<ErrorReceiver, ServiceError> {
        let rx = self.base.start().await?;

        let token = self.signal.token();
        let runs = Arc::clone(&self.runs);
        let bus = self.bus.clone();
        let index = self.index;
        let period = self.period.max(Duration::from_nanos(1));
        self.worker.spawn(async move {
            let mut interval = time::interval_at(time::Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => return,
                    _ = interval.tick() => {
                        let n = runs.fetch_add(1, Ordering::Relaxed) + 1;
                        bus.publish(
                            Event::new(EventKind::Tick)
                                .with_service("ticker")
                                .with_index(index)
                                .with_round(n),
                        );
                    }
                }
            }
        });
        Ok(rx)
    }

    async fn stop(&self) -> Result<(), ServiceError> {
        if !self.signal.fire() {
            return Err(ServiceError::AlreadyStopped);
        }
        self.worker.close();
        let joined = time::timeout(self.stop_timeout, self.worker.wait()).await;

        // Close the channel even if the loop is stuck, to unblock the owner.
        self.base.stop().await?;
        joined.map_err(|_| ServiceError::StopTimeout {
            timeout: self.stop_timeout,
        })
    }
}
