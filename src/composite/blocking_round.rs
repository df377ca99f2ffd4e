//! # BlockingRound: round composition over blocking services.
//!
//! Same contract as [`Round`](crate::Round), but children are
//! [`BlockingService`]s: a child's round ends when its `start` returns. The
//! composite itself is non-blocking, so it can be nested in a
//! [`FanOut`](crate::FanOut) or another round.
//!
//! ```text
//! start() ─► manager task ─► loop {
//!     factory() ─► spawn A.start(), spawn B.start()
//!     select { stop signal, A returned, B returned }
//!       ├─ Err / panic ─► forward "error from serviceX: …" ─► spawn stop()
//!       └─ both Ok ─► round hook, RoundCompleted, next round
//! }
//! ```
//!
//! ## Rules
//! - Both children of round `n` have returned before the hook runs and before
//!   any child of round `n + 1` starts.
//! - A panic inside a child's `start` is reported as [`ServiceError::Panicked`].
//! - Results that arrive after the stop signal fired are not forwarded.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::composite::{BlockingPairFactory, RoundHook, join_failure, run_teardown};
use crate::config::Config;
use crate::error::{ServiceError, Slot, first_real_error};
use crate::events::{Bus, Event, EventKind};
use crate::service::{
    BlockingService, BlockingServiceRef, ErrorReceiver, ErrorSender, Service, StopSignal,
};

const NAME: &str = "blocking-round";

/// Builder for [`BlockingRound`].
pub struct BlockingRoundBuilder {
    factory: BlockingPairFactory,
    hook: Option<RoundHook>,
    error_buffer: usize,
    bus: Bus,
}

impl BlockingRoundBuilder {
    /// Publishes lifecycle events on `bus`.
    pub fn with_bus(mut self, bus: Bus) -> Self {
        self.bus = bus;
        self
    }

    /// Runs `hook` after both children of a round returned `Ok`.
    pub fn with_round_hook(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.hook = Some(Arc::new(hook));
        self
    }

    /// Builds the composite.
    pub fn build(self) -> BlockingRound {
        BlockingRound {
            inner: Arc::new(Inner {
                factory: self.factory,
                hook: self.hook,
                pair: Mutex::new(None),
                started: AtomicBool::new(false),
                closing: StopSignal::new(),
                stopped: CancellationToken::new(),
                tasks: TaskTracker::new(),
                rounds: AtomicU64::new(0),
                error_buffer: self.error_buffer,
                bus: self.bus,
            }),
        }
    }
}

/// Alternating round composition over blocking services.
pub struct BlockingRound {
    inner: Arc<Inner>,
}

struct Inner {
    factory: BlockingPairFactory,
    hook: Option<RoundHook>,
    pair: Mutex<Option<(BlockingServiceRef, BlockingServiceRef)>>,
    started: AtomicBool,
    closing: StopSignal,
    stopped: CancellationToken,
    /// Manager plus the `start` calls of the current pair.
    tasks: TaskTracker,
    rounds: AtomicU64,
    error_buffer: usize,
    bus: Bus,
}

impl BlockingRound {
    /// Creates a blocking round composite; `factory` builds the pair for every round.
    pub fn new<F>(cfg: &Config, factory: F) -> Self
    where
        F: Fn() -> (BlockingServiceRef, BlockingServiceRef) + Send + Sync + 'static,
    {
        Self::builder(cfg, factory).build()
    }

    /// Starts building a blocking round composite.
    pub fn builder<F>(cfg: &Config, factory: F) -> BlockingRoundBuilder
    where
        F: Fn() -> (BlockingServiceRef, BlockingServiceRef) + Send + Sync + 'static,
    {
        BlockingRoundBuilder {
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

    async fn forward(&self, tx: &ErrorSender, err: ServiceError) {
        self.bus
            .publish(self.event(EventKind::ErrorForwarded).with_service_error(&err));
        tokio::select! {
            biased;
            _ = tx.send(err) => {}
            _ = self.closing.cancelled() => {}
        }
    }

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

    /// Installs a fresh pair unless the stop signal already fired.
    async fn next_pair(&self) -> Option<(BlockingServiceRef, BlockingServiceRef)> {
        if self.closing.is_fired() {
            return None;
        }
        let (a, b) = (self.factory)();

        let mut pair = self.pair.lock().await;
        if self.closing.is_fired() {
            return None;
        }
        *pair = Some((Arc::clone(&a), Arc::clone(&b)));
        drop(pair);

        let round = self.rounds.fetch_add(1, Ordering::Relaxed) + 1;
        self.bus
            .publish(self.event(EventKind::RoundStarted).with_round(round));
        Some((a, b))
    }

    /// Round manager: owns the composite sender until it exits.
    async fn manage(self: Arc<Self>, tx: ErrorSender) {
        while let Some((a, b)) = self.next_pair().await {
            let mut run_a = self.tasks.spawn({
                let a = Arc::clone(&a);
                async move { a.start().await }
            });
            let mut run_b = self.tasks.spawn({
                let b = Arc::clone(&b);
                async move { b.start().await }
            });

            let (mut done_a, mut done_b) = (false, false);
            let mut failed = false;
            while !(done_a && done_b) {
                let (slot, res) = tokio::select! {
                    biased;
                    _ = self.closing.cancelled() => return,
                    joined = &mut run_a, if !done_a => {
                        done_a = true;
                        (Slot::A, joined.unwrap_or_else(|e| Err(join_failure(a.name(), e))))
                    }
                    joined = &mut run_b, if !done_b => {
                        done_b = true;
                        (Slot::B, joined.unwrap_or_else(|e| Err(join_failure(b.name(), e))))
                    }
                };
                if let Err(err) = res {
                    self.forward(&tx, ServiceError::round(slot, err)).await;
                    if !failed {
                        failed = true;
                        self.spawn_stop();
                    }
                }
            }

            if failed || self.closing.is_fired() {
                return;
            }
            if let Some(hook) = &self.hook {
                hook();
            }
            self.bus.publish(
                self.event(EventKind::RoundCompleted)
                    .with_round(self.rounds.load(Ordering::Relaxed)),
            );
        }
    }

    fn start(self: &Arc<Self>) -> Result<ErrorReceiver, ServiceError> {
        if self.closing.is_fired() {
            return Err(ServiceError::AlreadyStopped);
        }
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(ServiceError::AlreadyStarted);
        }

        let (tx, rx) = mpsc::channel(self.error_buffer);
        self.tasks.spawn(Arc::clone(self).manage(tx));
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
            Some((a, b)) => {
                let (ra, rb) = tokio::join!(a.stop(), b.stop());
                for (svc, res) in [(&a, &ra), (&b, &rb)] {
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
                first_real_error([ra, rb])
            }
            None => Ok(()),
        };

        self.tasks.close();
        self.tasks.wait().await;

        self.bus.publish(self.event(EventKind::ServiceStopped));
        result
    }
}

#[async_trait]
impl Service for BlockingRound {
    fn name(&self) -> &str {
        NAME
    }

    async fn start(&self) -> Result<ErrorReceiver, ServiceError> {
        self.inner.start()
    }

    async fn stop(&self) -> Result<(), ServiceError> {
        self.inner.stop().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composite::testing::{BlockingScripted, fail};
    use crate::services::{BlockingDelayedError, BlockingDelayedStop, ServiceFn, critical_error};
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::time;

    fn clean_pair() -> (BlockingServiceRef, BlockingServiceRef) {
        (
            BlockingDelayedStop::arc(Duration::from_secs(1)),
            BlockingDelayedStop::arc(Duration::from_secs(1)),
        )
    }

    /// Tracks how many children are inside `start` right now.
    fn counted(active: Arc<AtomicUsize>, delay: Duration) -> BlockingServiceRef {
        ServiceFn::arc("counted", move |ctx: CancellationToken| {
            let active = Arc::clone(&active);
            async move {
                active.fetch_add(1, Ordering::SeqCst);
                let res = tokio::select! {
                    biased;
                    _ = ctx.cancelled() => Err(ServiceError::Canceled),
                    _ = time::sleep(delay) => Ok(()),
                };
                active.fetch_sub(1, Ordering::SeqCst);
                res
            }
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_clean_rounds_repeat_until_stopped() {
        let round = Arc::new(BlockingRound::new(&Config::default(), clean_pair));
        let mut errors = round.start().await.expect("start");

        let stopper = {
            let round = round.clone();
            tokio::spawn(async move {
                time::sleep(Duration::from_millis(3500)).await;
                (round.stop().await, round.stop().await)
            })
        };

        while let Some(err) = errors.recv().await {
            panic!("unexpected round error: {err}");
        }
        let (first, second) = stopper.await.expect("join");
        assert_eq!(first, Ok(()));
        assert_eq!(second, Err(ServiceError::AlreadyStopped));
        assert!(round.rounds() >= 3, "rounds = {}", round.rounds());
    }

    #[tokio::test(start_paused = true)]
    async fn test_child_error_is_forwarded_once_then_closes() {
        for error_first in [false, true] {
            let round = BlockingRound::new(&Config::default(), move || {
                let ok: BlockingServiceRef = BlockingDelayedStop::arc(Duration::from_secs(2));
                let fail: BlockingServiceRef = BlockingDelayedError::arc(Duration::from_secs(1));
                if error_first { (fail, ok) } else { (ok, fail) }
            });
            let mut errors = round.start().await.expect("start");

            let mut seen = Vec::new();
            while let Some(err) = errors.recv().await {
                seen.push(err);
            }
            let slot = if error_first { Slot::A } else { Slot::B };
            assert_eq!(seen, vec![ServiceError::round(slot, critical_error())]);
            assert_eq!(round.stop().await, Err(ServiceError::AlreadyStopped));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_hook_runs_after_both_children_returned() {
        let active = Arc::new(AtomicUsize::new(0));
        let built = Arc::new(AtomicUsize::new(0));
        let hooks = Arc::new(AtomicUsize::new(0));
        let violated = Arc::new(AtomicBool::new(false));

        let factory = {
            let (active, built) = (active.clone(), built.clone());
            move || {
                built.fetch_add(1, Ordering::SeqCst);
                (
                    counted(active.clone(), Duration::from_secs(1)),
                    counted(active.clone(), Duration::from_secs(2)),
                )
            }
        };
        let round = BlockingRound::builder(&Config::default(), factory)
            .with_round_hook({
                let (active, built, hooks, violated) =
                    (active.clone(), built.clone(), hooks.clone(), violated.clone());
                move || {
                    let n = hooks.fetch_add(1, Ordering::SeqCst) + 1;
                    // Both children of round `n` returned, round `n + 1` not built yet.
                    if active.load(Ordering::SeqCst) != 0 || built.load(Ordering::SeqCst) != n {
                        violated.store(true, Ordering::SeqCst);
                    }
                }
            })
            .build();
        let mut errors = round.start().await.expect("start");

        time::sleep(Duration::from_millis(5500)).await;
        assert_eq!(round.stop().await, Ok(()));
        assert!(errors.recv().await.is_none());

        assert_eq!(hooks.load(Ordering::SeqCst), 2);
        assert_eq!(round.rounds(), 3);
        assert!(!violated.load(Ordering::SeqCst));
        assert_eq!(active.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_mid_round_is_not_an_error() {
        let round = BlockingRound::new(&Config::default(), clean_pair);
        let mut errors = round.start().await.expect("start");
        time::sleep(Duration::from_millis(300)).await;

        assert_eq!(round.stop().await, Ok(()));
        assert!(errors.recv().await.is_none());
        assert_eq!(round.start().await.unwrap_err(), ServiceError::AlreadyStopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_child_panic_is_reported() {
        let round = BlockingRound::new(&Config::default(), || {
            let boom: BlockingServiceRef = ServiceFn::arc("boom", |_ctx: CancellationToken| async {
                let explode = true;
                if explode {
                    panic!("kaboom");
                }
                Ok::<(), ServiceError>(())
            });
            let ok: BlockingServiceRef = BlockingDelayedStop::arc(Duration::from_secs(1));
            (boom, ok)
        });
        let mut errors = round.start().await.expect("start");

        let err = errors.recv().await.expect("panic error");
        assert_eq!(
            err,
            ServiceError::round(
                Slot::A,
                ServiceError::Panicked {
                    service: "boom".into(),
                    info: "kaboom".into(),
                }
            )
        );
        assert!(errors.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_start_twice_is_rejected() {
        let round = BlockingRound::new(&Config::default(), clean_pair);
        let _errors = round.start().await.expect("start");
        assert_eq!(round.start().await.unwrap_err(), ServiceError::AlreadyStarted);
        assert_eq!(round.stop().await, Ok(()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_child_stop_errors_first_returned_all_published() {
        let bus = Bus::new(64);
        let mut events = bus.subscribe();
        let round = BlockingRound::builder(&Config::default(), || {
            let a: BlockingServiceRef = Arc::new(BlockingScripted::default().failing_stop(fail("a")));
            let b: BlockingServiceRef = Arc::new(BlockingScripted::default().failing_stop(fail("b")));
            (a, b)
        })
        .with_bus(bus)
        .build();
        let mut errors = round.start().await.expect("start");
        time::sleep(Duration::from_millis(1)).await;

        assert_eq!(round.stop().await, Err(fail("a")));
        assert!(errors.recv().await.is_none());

        let mut failed: Vec<String> = std::iter::from_fn(|| events.try_recv().ok())
            .filter(|ev| ev.kind == EventKind::StopFailed)
            .filter_map(|ev| ev.error.as_deref().map(str::to_owned))
            .collect();
        failed.sort();
        assert_eq!(failed, vec![fail("a").to_string(), fail("b").to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_stop_still_tears_down() {
        let round = BlockingRound::new(&Config::default(), || {
            let slow: BlockingServiceRef =
                Arc::new(BlockingScripted::default().stalling(Duration::from_secs(1)));
            let quick: BlockingServiceRef = Arc::new(BlockingScripted::default());
            (slow, quick)
        });
        let mut errors = round.start().await.expect("start");
        time::sleep(Duration::from_millis(1)).await;

        let first = time::timeout(Duration::from_millis(10), round.stop()).await;
        assert!(first.is_err());

        assert_eq!(round.stop().await, Err(ServiceError::AlreadyStopped));
        assert!(errors.recv().await.is_none());
    }
}
