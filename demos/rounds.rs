//! # Example: rounds
//!
//! Runs a [`Round`] whose factory hands out a fresh pair of services each
//! round. The first rounds end cleanly; the fourth pair contains a service that
//! reports a critical error, which ends the composite.
//!
//! ## Flow
//! ```text
//! round 1..3: (DelayedStop 300ms, DelayedStop 500ms) ─► both stop ─► next round
//! round 4:    (DelayedStop 2s,    DelayedError 400ms) ─► "error from serviceB: …"
//! ```
//!
//! ## Run
//! ```bash
//! cargo run --example rounds --features logging
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use roundvisor::{
    Config, DelayedError, DelayedStop, LogWriter, Monitor, Round, ServiceRef, Subscribe,
    run_until_shutdown,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = Config::default();
    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
    let monitor = Monitor::builder(cfg.clone()).with_subscribers(subs).build();

    let built = Arc::new(AtomicU64::new(0));
    let factory = {
        let built = built.clone();
        move || -> (ServiceRef, ServiceRef) {
            if built.fetch_add(1, Ordering::Relaxed) < 3 {
                (
                    DelayedStop::arc(Duration::from_millis(300)),
                    DelayedStop::arc(Duration::from_millis(500)),
                )
            } else {
                (
                    DelayedStop::arc(Duration::from_secs(2)),
                    DelayedError::arc(Duration::from_millis(400)),
                )
            }
        }
    };

    let round = Round::builder(&cfg, factory)
        .with_bus(monitor.bus())
        .with_round_hook(|| println!("[hook] round finished cleanly"))
        .build();

    run_until_shutdown(&round, &monitor.bus()).await?;
    println!("[main] rounds started: {}", round.rounds());

    drop(round);
    monitor.shutdown().await;
    Ok(())
}
