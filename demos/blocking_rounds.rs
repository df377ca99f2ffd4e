//! # Example: blocking_rounds
//!
//! A [`BlockingRound`] of two closure-backed workers. Each worker does a short
//! unit of work and returns; once both returned the round hook runs and the
//! factory builds the next pair. Ctrl-C stops the composite mid-round.
//!
//! ## Run
//! ```bash
//! cargo run --example blocking_rounds
//! ```

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use roundvisor::{
    BlockingRound, BlockingServiceRef, Config, Monitor, ServiceError, ServiceFn,
    run_until_shutdown,
};

/// Worker that "processes a batch" for `work`, unless cancelled first.
fn worker(name: &'static str, work: Duration) -> BlockingServiceRef {
    ServiceFn::arc(name, move |ctx: CancellationToken| async move {
        println!("[{name}] start (work {}ms)", work.as_millis());
        tokio::select! {
            _ = ctx.cancelled() => {
                println!("[{name}] cancelled");
                Err(ServiceError::Canceled)
            }
            _ = tokio::time::sleep(work) => {
                println!("[{name}] done");
                Ok(())
            }
        }
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = Config::default();
    let monitor = Monitor::builder(cfg.clone()).build();

    let round = BlockingRound::builder(&cfg, || {
        (
            worker("reader", Duration::from_millis(400)),
            worker("writer", Duration::from_millis(700)),
        )
    })
    .with_bus(monitor.bus())
    .with_round_hook(|| println!("[hook] both workers returned"))
    .build();

    println!("[main] press Ctrl-C to stop");
    run_until_shutdown(&round, &monitor.bus()).await?;
    println!("[main] stopped after {} rounds", round.rounds());

    monitor.shutdown().await;
    Ok(())
}
