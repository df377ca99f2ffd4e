//! # Round: a pair of services replaced by a fresh pair every round.
//!
//! A round ends cleanly when both children close their error channels without
//! reporting anything; the factory then builds the next pair. Any error, or an
//! external stop, tears the composite down.
//!
//! ```text
//! start():  factory() ─► A.start() ─► B.start() ──(B fails: A.stop())──► Err
//!                                        │
//!                                        ▼
//!                         manager task (one per composite)
//! loop {
//!   ├─► select { stop signal, A errors, B errors }
//!   │     ├─ error ─► forward "error from serviceX: …" ─► spawn stop()
//!   │     └─ both closed, no error ─► round is clean
//!   ├─► stop requested? ─► exit
//!   ├─► round hook, RoundCompleted
//!   └─► factory() ─► start pair ──(fails)──► forward NextRound ─► spawn stop(), exit
//! }
//! exit ─► composite channel closed
//! ```
//!
//! ## Rules
//! - `start` may be called once; later calls are rejected.
//! - The manager never calls `stop` inline: `stop` joins the manager.
//! - A pair built after the stop signal fired is stopped by the manager itself.
//! - Teardown runs on its own task; dropping a `stop` future does not interrupt it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::composite::{PairFactory, RoundHook, run_teardown};
use crate::config::Config;
use crate::error::{ServiceError, Slot, first_real_error};
use crate::events::{Bus, Event, EventKind};
use crate::service::{ErrorReceiver, ErrorSender, Service, ServiceRef, StopSignal};

const NAME: &str = "round";

/// How a round ended.
enum RoundEnd {
    /// Both channels closed without an error.
    Clean,
    /// A child reported an error; the composite is stopping.
    Failed,
    /// The stop signal fired.
    Stopped,
}

/// Builder for [`Round`].
pub struct RoundBuilder {
    factory: PairFactory,
    hook: Option<RoundHook>,
    error_buffer: usize,
    bus: Bus,
}

impl RoundBuilder {
    /// Publishes lifecycle events on `bus`.
    pub fn with_bus(mut self, bus: Bus) -> Self {
        self.bus = bus;
        self
    }

    /// Runs `hook` after a clean round, before the next pair is built.
    pub fn with_round_hook(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.hook = Some(Arc::new(hook));
        self
    }

    /// Builds the composite.
    pub fn build(self) -> Round {
        Round {
            inner: Arc::new(Inner {
                factory: self.factory,
                hook: self.hook,
                pair: Mutex::new(None),
                started: AtomicBool::new(false),
                closing: StopSignal::new(),
                stopped: CancellationToken::new(),
                manager: TaskTracker::new(),
                rounds: AtomicU64::new(0),
                error_buffer: self.error_buffer,
                bus: self.bus,
            }),
        }
    }
}

/// Alternating round composition over non-blocking services.
///
/// ## Example
/// ```rust
/// use std::time::Duration;
/// use roundvisor::{Config, DelayedStop, Round, Service, ServiceRef};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let round = Round::new(&Config::default(), || {
///     let a: ServiceRef = DelayedStop::arc(Duration::from_millis(2));
///     let b: ServiceRef = DelayedStop::arc(Duration::from_millis(2));
///     (a, b)
/// });
///
/// let mut errors = round.start().await.unwrap();
/// tokio::time::sleep(Duration::from_millis(5)).await;
/// round.stop().await.unwrap();
/// assert!(errors.recv().await.is_none());
/// # }
/// ```
pub struct Round {
    inner: Arc<Inner>,
}

struct Inner {
    factory: PairFactory,
    hook: Option<RoundHook>,
    pair: Mutex<Option<(ServiceRef, ServiceRef)>>,
    started: AtomicBool,
    closing: StopSignal,
    stopped: CancellationToken,
    manager: TaskTracker,
    rounds: AtomicU64,
    error_buffer: usize,
    bus: Bus,
}

impl Round {
    /// Creates a round composite; `factory` builds the pair for every round.
    pub fn new<F>(cfg: &Config, factory: F) -> Self
    where
        F: Fn() -> (ServiceRef, ServiceRef) + Send + Sync + 'static,
    {
        Self::builder(cfg, factory).build()
    }

    /// Starts building a round composite.
    pub fn builder<F>(cfg: &Config, factory: F) -> RoundBuilder
    where
        F: Fn() -> (ServiceRef, ServiceRef) + Send + Sync + 'static,
    {
        RoundBuilder {
            factory: Box::new(factory),
            hook: None,
            error_buffer: cfg.error_buffer_clamped(),
            bus: Bus::new(cfg.bus_capacity_clamped()),
        }
    }

    /// Number of rounds started so far.
    pub fn rounds(&self) -> u64 {
        self.inner.rounds.load(Ordering::Relaxed)
    }
}

impl Inner {
    fn event(&self, kind: EventKind) -> Event {
        Event::new(kind).with_service(NAME)
    }

    fn log_stop_error(&self, svc: &ServiceRef, res: &Result<(), ServiceError>) {
        if let Err(err) = res {
            if !err.is_already_stopped() {
                self.bus.publish(
                    Event::new(EventKind::StopFailed)
                        .with_service(svc.name())
                        .with_service_error(err),
                );
            }
        }
    }

    async fn stop_pair(&self, a: &ServiceRef, b: &ServiceRef) -> Result<(), ServiceError> {
        let (ra, rb) = tokio::join!(a.stop(), b.stop());
        self.log_stop_error(a, &ra);
        self.log_stop_error(b, &rb);
        first_real_error([ra, rb])
    }

    /// Builds and starts the next pair and installs it as the active pair.
    async fn new_round(&self) -> Result<(ErrorReceiver, ErrorReceiver), ServiceError> {
        let (a, b) = (self.factory)();

        let rx_a = a.start().await.inspect_err(|err| {
            self.bus.publish(
                Event::new(EventKind::StartFailed)
                    .with_service(a.name())
                    .with_service_error(err),
            );
        })?;
        let rx_b = match b.start().await {
            Ok(rx) => rx,
            Err(err) => {
                self.bus.publish(
                    Event::new(EventKind::StartFailed)
                        .with_service(b.name())
                        .with_service_error(&err),
                );
                let res = a.stop().await;
                self.log_stop_error(&a, &res);
                return Err(err);
            }
        };

        let mut pair = self.pair.lock().await;
        if self.closing.is_fired() {
            drop(pair);
            let _ = self.stop_pair(&a, &b).await;
            return Err(ServiceError::AlreadyStopped);
        }
        *pair = Some((a, b));
        drop(pair);

        let round = self.rounds.fetch_add(1, Ordering::Relaxed) + 1;
        self.bus
            .publish(self.event(EventKind::RoundStarted).with_round(round));
        Ok((rx_a, rx_b))
    }

    /// Delivers `err` to the composite channel unless the composite is stopping.
    async fn forward(&self, tx: &ErrorSender, err: ServiceError) {
        self.bus
            .publish(self.event(EventKind::ErrorForwarded).with_service_error(&err));
        tokio::select! {
            biased;
            _ = tx.send(err) => {}
            _ = self.closing.cancelled() => {}
        }
    }

    /// Stops the composite from a task it is about to join.
    fn spawn_stop(self: &Arc<Self>) {
        let me = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(err) = me.stop().await {
                if !err.is_already_stopped() {
                    me.bus
                        .publish(me.event(EventKind::StopFailed).with_service_error(&err));
                }
            }
        });
    }

    /// Waits until both children closed their channels, an error arrived, or stop fired.
    async fn drain(
        self: &Arc<Self>,
        tx: &ErrorSender,
        mut rx_a: ErrorReceiver,
        mut rx_b: ErrorReceiver,
    ) -> RoundEnd {
        let (mut open_a, mut open_b) = (true, true);
        let mut failed = false;

        while open_a || open_b {
            let (slot, msg) = tokio::select! {
                biased;
                _ = self.closing.cancelled() => return RoundEnd::Stopped,
                msg = rx_a.recv(), if open_a => (Slot::A, msg),
                msg = rx_b.recv(), if open_b => (Slot::B, msg),
            };
            match msg {
                Some(err) => {
                    self.forward(tx, ServiceError::round(slot, err)).await;
                    if !failed {
                        failed = true;
                        self.spawn_stop();
                    }
                }
                None if slot == Slot::A => open_a = false,
                None => open_b = false,
            }
        }

        if failed { RoundEnd::Failed } else { RoundEnd::Clean }
    }

    /// Round manager: owns the composite sender until it exits.
    async fn manage(
        self: Arc<Self>,
        tx: ErrorSender,
        mut rx_a: ErrorReceiver,
        mut rx_b: ErrorReceiver,
    ) {
        loop {
            match self.drain(&tx, rx_a, rx_b).await {
                RoundEnd::Clean => {}
                RoundEnd::Failed | RoundEnd::Stopped => return,
            }
            if self.closing.is_fired() {
                return;
            }

            if let Some(hook) = &self.hook {
                hook();
            }
            self.bus.publish(
                self.event(EventKind::RoundCompleted)
                    .with_round(self.rounds.load(Ordering::Relaxed)),
            );

            match self.new_round().await {
                Ok((a, b)) => {
                    rx_a = a;
                    rx_b = b;
                }
                Err(_) if self.closing.is_fired() => return,
                Err(err) => {
                    let err = ServiceError::NextRound {
                        source: Box::new(err),
                    };
                    self.forward(&tx, err).await;
                    self.spawn_stop();
                    return;
                }
            }
        }
    }

    async fn start(self: &Arc<Self>) -> Result<ErrorReceiver, ServiceError> {
        if self.closing.is_fired() {
            return Err(ServiceError::AlreadyStopped);
        }
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(ServiceError::AlreadyStarted);
        }

        self.bus.publish(self.event(EventKind::ServiceStarting));
        let (rx_a, rx_b) = self.new_round().await.inspect_err(|err| {
            self.bus
                .publish(self.event(EventKind::StartFailed).with_service_error(err));
        })?;

        let (tx, rx) = mpsc::channel(self.error_buffer);
        self.manager
            .spawn(Arc::clone(self).manage(tx, rx_a, rx_b));
        self.bus.publish(self.event(EventKind::ServiceStarted));
        Ok(rx)
    }

    async fn stop(self: &Arc<Self>) -> Result<(), ServiceError> {
        if !self.closing.fire() {
            self.stopped.cancelled().await;
            return Err(ServiceError::AlreadyStopped);
        }
        let me = Arc::clone(self);
        run_teardown(NAME, self.stopped.clone(), async move { me.teardown().await }).await
    }

    async fn teardown(&self) -> Result<(), ServiceError> {
        self.bus.publish(self.event(EventKind::ServiceStopping));

        let pair = self.pair.lock().await.take();
        let result = match pair {
            Some((a, b)) => self.stop_pair(&a, &b).await,
            None => Ok(()),
        };

        self.manager.close();
        self.manager.wait().await;

        self.bus.publish(self.event(EventKind::ServiceStopped));
        result
    }
}

#[async_trait]
impl Service for Round {
    fn name(&self) -> &str {
        NAME
    }

    async fn start(&self) -> Result<ErrorReceiver, ServiceError> {
        self.inner.start().await
    }

    async fn stop(&self) -> Result<(), ServiceError> {
        self.inner.stop().await
    }
}
