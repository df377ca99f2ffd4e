//! # Running a service until the process is told to stop.
//!
//! [`wait_for_shutdown_signal`] completes on the first termination signal.
//! [`run_until_shutdown`] starts a service, drains its error channel onto the
//! [`Bus`], and stops the service on a signal or once the channel closes.
//!
//! ## Signals
//! **Unix platforms:**
//! - `SIGINT` (Ctrl-C in terminal)
//! - `SIGTERM` (default kill signal, used by systemd/Kubernetes)
//! - `SIGQUIT`
//!
//! **Other platforms:**
//! - `Ctrl-C` via [`tokio::signal::ctrl_c`]

use std::future::Future;

use crate::error::ServiceError;
use crate::events::{Bus, Event, EventKind};
use crate::service::Service;

/// Waits for a termination signal.
///
/// Returns `Err` if signal registration fails.
#[cfg(unix)]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {},
        _ = sigint.recv()  => {},
        _ = sigterm.recv() => {},
        _ = sigquit.recv() => {},
    }
    Ok(())
}

/// Waits for a termination signal.
///
/// Returns `Err` if signal registration fails.
#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}

/// Runs `service` until `shutdown` completes or its error channel closes.
///
/// Every error read from the channel is published as
/// [`EventKind::ErrorForwarded`]. Returns the result of the final `stop`;
/// a service that already stopped itself counts as a clean stop.
pub async fn run_until<F>(service: &dyn Service, bus: &Bus, shutdown: F) -> Result<(), ServiceError>
where
    F: Future<Output = ()>,
{
    let mut errors = service.start().await?;
    let publish = |err: &ServiceError| {
        bus.publish(
            Event::new(EventKind::ErrorForwarded)
                .with_service(service.name())
                .with_service_error(err),
        );
    };

    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            msg = errors.recv() => match msg {
                Some(err) => publish(&err),
                None => break,
            },
        }
    }

    let res = match service.stop().await {
        Err(ServiceError::AlreadyStopped) => Ok(()),
        other => other,
    };
    while let Ok(err) = errors.try_recv() {
        publish(&err);
    }
    res
}

/// Runs `service` until a termination signal arrives or its error channel closes.
///
/// If signal handlers cannot be installed, only the channel close ends the run.
pub async fn run_until_shutdown(service: &dyn Service, bus: &Bus) -> Result<(), ServiceError> {
    run_until(service, bus, async {
        if wait_for_shutdown_signal().await.is_err() {
            std::future::pending::<()>().await;
        }
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composite::{FanOut, Round};
    use crate::config::Config;
    use crate::service::ServiceRef;
    use crate::services::{DelayedError, DelayedStop, StartError};
    use std::time::Duration;
    use tokio::time;

    #[tokio::test(start_paused = true)]
    async fn test_self_stopping_service_ends_run_cleanly() {
        let bus = Bus::new(64);
        let mut rx = bus.subscribe();
        let round = Round::new(&Config::default(), || {
            let ok: ServiceRef = DelayedStop::arc(Duration::from_secs(5));
            let fail: ServiceRef = DelayedError::arc(Duration::from_secs(1));
            (ok, fail)
        });

        let res = run_until(&round, &bus, std::future::pending()).await;
        assert_eq!(res, Ok(()));

        let forwarded: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok())
            .filter(|ev| ev.kind == EventKind::ErrorForwarded)
            .collect();
        assert_eq!(forwarded.len(), 1);
        assert_eq!(forwarded[0].service.as_deref(), Some("round"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_future_stops_service() {
        let bus = Bus::new(16);
        let children: Vec<ServiceRef> = vec![
            DelayedStop::arc(Duration::from_secs(60)),
            DelayedStop::arc(Duration::from_secs(60)),
        ];
        let fan_out = FanOut::new(&Config::default(), children);

        let res = run_until(&fan_out, &bus, time::sleep(Duration::from_secs(1))).await;
        assert_eq!(res, Ok(()));
        assert_eq!(fan_out.stop().await, Err(ServiceError::AlreadyStopped));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_failure_is_returned() {
        let bus = Bus::new(16);
        let svc = StartError::new(Duration::from_millis(10));
        let res = run_until(&svc, &bus, std::future::pending()).await;
        assert_eq!(res, Err(StartError::error()));
    }
}
