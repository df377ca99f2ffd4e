//! # FanOut: N independent services started and stopped in parallel.
//!
//! ```text
//! start():
//!   child[0].start() ─┐            Ok(rx) ─► running.insert(i) ─► forwarder(i)
//!   child[1].start() ─┼─ spawned ─►                                  │
//!   child[N].start() ─┘            Err(e) ─► collected               ▼
//!                                          "service <i> error: <cause>" ─► composite channel
//!   any Err ─► stop every started child (rollback) ─► Err(StartAborted(first))
//!
//! stop():
//!   closed flag ─► stop(running…) in parallel ─► join or stop_timeout
//!              ─► abandon forwarders ─► join forwarders ─► close composite channel
//! ```
//!
//! ## Rules
//! - The running registry is the only shared mutable state; every access holds its lock.
//! - A forwarder removes its child from the registry once the child's channel closes.
//! - On timeout the outstanding child stops keep running detached; each one still
//!   publishes `ServiceStopped`/`StopFailed` when it completes.
//! - Secondary stop errors are published as `StopFailed`; only the first is returned.
//! - Teardown runs on its own task; dropping a `stop` future does not interrupt it.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{FutureExt, StreamExt, stream::FuturesUnordered};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::composite::{join_failure, run_teardown};
use crate::config::Config;
use crate::error::{ServiceError, first_real_error};
use crate::events::{Bus, Event, EventKind};
use crate::service::{ErrorReceiver, ErrorSender, Service, ServiceRef, StopSignal};
use crate::subscribers::panic_message;

const NAME: &str = "fan-out";

type Registry = Arc<Mutex<HashMap<usize, ServiceRef>>>;

/// Parallel composition of an arbitrary number of independent services.
///
/// ## Example
/// ```rust
/// use std::time::Duration;
/// use roundvisor::{Config, FanOut, Service, ServiceRef, Ticker};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let cfg = Config::default();
/// let children: Vec<ServiceRef> = vec![
///     std::sync::Arc::new(Ticker::new(&cfg, 0, Duration::from_millis(1))),
///     std::sync::Arc::new(Ticker::new(&cfg, 1, Duration::from_millis(2))),
/// ];
/// let fan_out = FanOut::new(&cfg, children);
///
/// let mut errors = fan_out.start().await.unwrap();
/// fan_out.stop().await.unwrap();
/// assert!(errors.recv().await.is_none());
/// # }
/// ```
pub struct FanOut {
    inner: Arc<Inner>,
}

struct Inner {
    services: Vec<ServiceRef>,
    running: Registry,
    tx: Mutex<Option<ErrorSender>>,
    rx: Mutex<Option<ErrorReceiver>>,
    forwarders: TaskTracker,
    closing: StopSignal,
    abandon: CancellationToken,
    stopped: CancellationToken,
    stop_timeout: Duration,
    bus: Bus,
}

impl FanOut {
    /// Creates a fan-out over `services`; child `i` is tagged with index `i`.
    pub fn new(cfg: &Config, services: Vec<ServiceRef>) -> Self {
        let (tx, rx) = mpsc::channel(cfg.error_buffer_clamped());
        let inner = Inner {
            services,
            running: Arc::new(Mutex::new(HashMap::new())),
            tx: Mutex::new(Some(tx)),
            rx: Mutex::new(Some(rx)),
            forwarders: TaskTracker::new(),
            closing: StopSignal::new(),
            abandon: CancellationToken::new(),
            stopped: CancellationToken::new(),
            stop_timeout: cfg.stop_timeout,
            bus: Bus::new(cfg.bus_capacity_clamped()),
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Publishes lifecycle events on `bus`. Has no effect once started.
    pub fn with_bus(mut self, bus: Bus) -> Self {
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.bus = bus;
        }
        self
    }

    /// Indices of children currently registered as running.
    pub async fn running(&self) -> Vec<usize> {
        let mut indices: Vec<usize> = self.inner.running.lock().await.keys().copied().collect();
        indices.sort_unstable();
        indices
    }
}

impl Inner {
    fn event(&self, kind: EventKind) -> Event {
        Event::new(kind).with_service(NAME)
    }

    /// Starts child `index` on its own task; registers it and spawns its forwarder on success.
    fn launch(
        &self,
        index: usize,
        svc: ServiceRef,
        tx: ErrorSender,
    ) -> JoinHandle<Result<(), ServiceError>> {
        let running = Arc::clone(&self.running);
        let forwarders = self.forwarders.clone();
        let abandon = self.abandon.clone();
        let bus = self.bus.clone();

        tokio::spawn(async move {
            bus.publish(
                Event::new(EventKind::ServiceStarting)
                    .with_service(svc.name())
                    .with_index(index),
            );
            let child_rx = match svc.start().await {
                Ok(rx) => rx,
                Err(err) => {
                    bus.publish(
                        Event::new(EventKind::StartFailed)
                            .with_service(svc.name())
                            .with_index(index)
                            .with_service_error(&err),
                    );
                    return Err(err);
                }
            };
            running.lock().await.insert(index, Arc::clone(&svc));
            bus.publish(
                Event::new(EventKind::ServiceStarted)
                    .with_service(svc.name())
                    .with_index(index),
            );
            forwarders.spawn(forward(index, child_rx, tx, abandon, running, bus));
            Ok(())
        })
    }

    /// Stops every registered child in parallel, bounded by `stop_timeout`.
    async fn stop_children(&self) -> Result<(), ServiceError> {
        let running: Vec<(usize, ServiceRef)> = {
            let running = self.running.lock().await;
            running.iter().map(|(i, s)| (*i, Arc::clone(s))).collect()
        };

        let mut outstanding: BTreeSet<usize> = running.iter().map(|(i, _)| *i).collect();
        let mut pending: FuturesUnordered<_> = running
            .into_iter()
            .map(|(index, svc)| {
                let bus = self.bus.clone();
                tokio::spawn(async move {
                    let stopping = std::panic::AssertUnwindSafe(svc.stop()).catch_unwind();
                    let res = match stopping.await {
                        Ok(res) => res,
                        Err(panic_err) => Err(ServiceError::Panicked {
                            service: svc.name().to_string(),
                            info: panic_message(&*panic_err),
                        }),
                    };
                    let ev = match &res {
                        Ok(()) | Err(ServiceError::AlreadyStopped) => {
                            Event::new(EventKind::ServiceStopped)
                        }
                        Err(err) => Event::new(EventKind::StopFailed).with_service_error(err),
                    };
                    bus.publish(ev.with_service(svc.name()).with_index(index));
                    (index, res)
                })
            })
            .collect();

        let deadline = time::sleep(self.stop_timeout);
        tokio::pin!(deadline);

        let mut results = Vec::with_capacity(outstanding.len());
        let mut timed_out = false;
        loop {
            tokio::select! {
                joined = pending.next() => match joined {
                    Some(Ok((index, res))) => {
                        outstanding.remove(&index);
                        results.push(res);
                    }
                    // Stop tasks are never aborted, and panics are caught inside them.
                    Some(Err(_)) => {}
                    None => break,
                },
                _ = &mut deadline => {
                    timed_out = true;
                    break;
                }
            }
        }

        if timed_out {
            self.bus.publish(
                self.event(EventKind::StopTimedOut)
                    .with_timeout(self.stop_timeout)
                    .with_error(format!("{outstanding:?}")),
            );
        }

        match first_real_error(results) {
            Ok(()) if timed_out => Err(ServiceError::StopTimeout {
                timeout: self.stop_timeout,
            }),
            other => other,
        }
    }

    async fn start(self: &Arc<Self>) -> Result<ErrorReceiver, ServiceError> {
        if self.closing.is_fired() {
            return Err(ServiceError::AlreadyStopped);
        }
        let rx = self.rx.lock().await.take().ok_or(ServiceError::AlreadyStarted)?;
        let tx = self.tx.lock().await.clone().ok_or(ServiceError::AlreadyStopped)?;

        self.bus.publish(self.event(EventKind::ServiceStarting));
        let handles: Vec<_> = self
            .services
            .iter()
            .enumerate()
            .map(|(index, svc)| {
                let handle = self.launch(index, Arc::clone(svc), tx.clone());
                (svc.name().to_string(), handle)
            })
            .collect();
        drop(tx);

        let mut start_errs = Vec::new();
        for (name, handle) in handles {
            let res = handle
                .await
                .unwrap_or_else(|err| Err(join_failure(&name, err)));
            if let Err(err) = res {
                start_errs.push(err);
            }
        }

        if let Some(first) = start_errs.into_iter().next() {
            // `rx` stays alive until rollback is done so forwarders keep their receiver.
            if let Err(err) = self.stop().await {
                self.bus
                    .publish(self.event(EventKind::StopFailed).with_service_error(&err));
            }
            drop(rx);
            let err = ServiceError::StartAborted {
                source: Box::new(first),
            };
            self.bus
                .publish(self.event(EventKind::StartFailed).with_service_error(&err));
            return Err(err);
        }

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
        let result = self.stop_children().await;

        self.abandon.cancel();
        self.forwarders.close();
        self.forwarders.wait().await;
        self.tx.lock().await.take();

        self.bus.publish(self.event(EventKind::ServiceStopped));
        result
    }
}

#[async_trait]
impl Service for FanOut {
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

/// Relays every error from child `index` onto the composite channel, tagged with the index.
async fn forward(
    index: usize,
    mut child_rx: ErrorReceiver,
    tx: ErrorSender,
    abandon: CancellationToken,
    running: Registry,
    bus: Bus,
) {
    loop {
        let err = tokio::select! {
            biased;
            msg = child_rx.recv() => match msg {
                Some(err) => ServiceError::child(index, err),
                None => break,
            },
            _ = abandon.cancelled() => break,
        };
        bus.publish(
            Event::new(EventKind::ErrorForwarded)
                .with_service(NAME)
                .with_index(index)
                .with_service_error(&err),
        );
        tokio::select! {
            biased;
            sent = tx.send(err) => if sent.is_err() { break },
            _ = abandon.cancelled() => break,
        }
    }
    running.lock().await.remove(&index);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composite::testing::{Scripted, fail};
    use crate::services::{DelayedError, StartError, Ticker, critical_error};
    use std::sync::atomic::Ordering;

    fn cfg(stop_timeout: Duration) -> Config {
        Config {
            stop_timeout,
            ..Config::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_stop_closes_channel() {
        let cfg = cfg(Duration::from_millis(5));
        let fan_out = FanOut::new(
            &cfg,
            vec![
                Arc::new(Ticker::new(&cfg, 1, Duration::from_millis(1))),
                Arc::new(Ticker::new(&cfg, 2, Duration::from_micros(500))),
            ],
        );
        let mut errors = fan_out.start().await.expect("start");
        assert_eq!(fan_out.running().await, vec![0, 1]);

        time::sleep(Duration::from_millis(2)).await;
        assert_eq!(fan_out.stop().await, Ok(()));
        assert!(errors.recv().await.is_none());
        assert_eq!(fan_out.stop().await, Err(ServiceError::AlreadyStopped));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_error_rolls_back_started_children() {
        let a = Arc::new(Scripted::default());
        let b = Arc::new(Scripted::default());
        let fan_out = FanOut::new(
            &cfg(Duration::from_millis(50)),
            vec![a.clone(), StartError::arc(Duration::from_millis(5)), b.clone()],
        );

        let err = fan_out.start().await.unwrap_err();
        assert!(matches!(err, ServiceError::StartAborted { .. }));
        assert_eq!(err.root_cause(), &StartError::error());

        assert_eq!(a.stops.load(Ordering::SeqCst), 1);
        assert_eq!(b.stops.load(Ordering::SeqCst), 1);
        assert!(fan_out.running().await.is_empty());
        assert_eq!(fan_out.stop().await, Err(ServiceError::AlreadyStopped));
    }

    #[tokio::test(start_paused = true)]
    async fn test_forwarded_error_is_tagged_with_index() {
        let cfg = cfg(Duration::from_millis(5));
        let fan_out = FanOut::new(
            &cfg,
            vec![
                Arc::new(Ticker::new(&cfg, 1, Duration::from_millis(1))),
                DelayedError::arc(Duration::from_millis(5)),
            ],
        );
        let mut errors = fan_out.start().await.expect("start");

        let mut count = 0;
        while let Some(err) = errors.recv().await {
            count += 1;
            assert_eq!(err, ServiceError::child(1, critical_error()));
            assert_eq!(
                err.to_string(),
                format!("service 1 error: {}", critical_error())
            );
            // The ticker is still running and stops cleanly.
            assert_eq!(fan_out.stop().await, Ok(()));
        }
        assert_eq!(count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_timeout_still_closes_channel() {
        let slow = Arc::new(Scripted::default().stalling(Duration::from_secs(10)));
        let bus = Bus::new(64);
        let mut events = bus.subscribe();
        let fan_out = FanOut::new(
            &cfg(Duration::from_millis(100)),
            vec![Arc::new(Scripted::default()), slow.clone()],
        )
        .with_bus(bus);

        let mut errors = fan_out.start().await.expect("start");
        assert_eq!(
            fan_out.stop().await,
            Err(ServiceError::StopTimeout {
                timeout: Duration::from_millis(100)
            })
        );
        assert!(errors.recv().await.is_none());

        let mut saw_timeout = false;
        while let Ok(ev) = events.try_recv() {
            if ev.kind == EventKind::StopTimedOut {
                assert_eq!(ev.error.as_deref(), Some("{1}"));
                saw_timeout = true;
            }
        }
        assert!(saw_timeout);

        // The detached stop finishes on its own.
        time::sleep(Duration::from_secs(11)).await;
        assert_eq!(slow.stops.load(Ordering::SeqCst), 1);
        assert!(slow.base.is_stopped().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_child_stop_errors_first_returned_all_published() {
        let bus = Bus::new(64);
        let mut events = bus.subscribe();
        let fan_out = FanOut::new(
            &Config::default(),
            vec![
                Arc::new(Scripted::default().failing_stop(fail("a"))),
                Arc::new(Scripted::default().failing_stop(fail("b"))),
            ],
        )
        .with_bus(bus);
        let mut errors = fan_out.start().await.expect("start");

        let err = fan_out.stop().await.unwrap_err();
        assert!(err == fail("a") || err == fail("b"), "unexpected: {err}");
        assert!(errors.recv().await.is_none());

        let mut failed: Vec<usize> = std::iter::from_fn(|| events.try_recv().ok())
            .filter(|ev| ev.kind == EventKind::StopFailed)
            .filter_map(|ev| ev.index)
            .collect();
        failed.sort_unstable();
        assert_eq!(failed, vec![0, 1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_child_stop_error_wins_over_timeout() {
        let fan_out = FanOut::new(
            &cfg(Duration::from_millis(100)),
            vec![
                Arc::new(Scripted::default().failing_stop(fail("a"))),
                Arc::new(Scripted::default().stalling(Duration::from_secs(10))),
            ],
        );
        let mut errors = fan_out.start().await.expect("start");

        assert_eq!(fan_out.stop().await, Err(fail("a")));
        assert!(errors.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_stop_still_tears_down() {
        let slow = Arc::new(Scripted::default().stalling(Duration::from_secs(1)));
        let fan_out = FanOut::new(&Config::default(), vec![slow.clone()]);
        let mut errors = fan_out.start().await.expect("start");

        let first = time::timeout(Duration::from_millis(10), fan_out.stop()).await;
        assert!(first.is_err());

        assert_eq!(fan_out.stop().await, Err(ServiceError::AlreadyStopped));
        assert!(errors.recv().await.is_none());
        assert_eq!(slow.stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_stops_single_teardown() {
        let child = Arc::new(Scripted::default());
        let fan_out = FanOut::new(&Config::default(), vec![child.clone()]);
        let mut errors = fan_out.start().await.expect("start");

        let (first, second) = tokio::join!(fan_out.stop(), fan_out.stop());
        let mut results = [first, second];
        results.sort_by_key(|r| r.is_err());
        assert_eq!(results, [Ok(()), Err(ServiceError::AlreadyStopped)]);

        assert!(errors.recv().await.is_none());
        assert_eq!(child.stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_second_start_rejected() {
        let fan_out = FanOut::new(&Config::default(), Vec::new());
        let _errors = fan_out.start().await.expect("start");
        assert_eq!(fan_out.start().await.unwrap_err(), ServiceError::AlreadyStarted);
        assert_eq!(fan_out.stop().await, Ok(()));
        assert_eq!(fan_out.start().await.unwrap_err(), ServiceError::AlreadyStopped);
    }
}
