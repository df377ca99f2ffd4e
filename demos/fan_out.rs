//! # Example: fan_out
//!
//! Runs three tickers and a service that fails after a second under one
//! [`FanOut`]. The failure arrives tagged with the child's index; the demo then
//! stops the whole group.
//!
//! ## Flow
//! ```text
//! FanOut::start()
//!     ├─► Ticker #0, #1, #2 (tick every 200ms)
//!     └─► DelayedError #3 ──(1s)──► "service 3 error: fatal error: …"
//! main ◄── errors.recv() ──► FanOut::stop() ──► every child stopped
//! ```
//!
//! ## Run
//! ```bash
//! cargo run --example fan_out
//! ```

use std::{sync::Arc, time::Duration};

use roundvisor::{Config, DelayedError, FanOut, Monitor, Service, ServiceRef, Ticker};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = Config {
        stop_timeout: Duration::from_secs(2),
        ..Config::default()
    };
    let monitor = Monitor::builder(cfg.clone()).build();
    let bus = monitor.bus();

    let tickers: Vec<Arc<Ticker>> = (0..3)
        .map(|i| Arc::new(Ticker::new(&cfg, i, Duration::from_millis(200)).with_bus(bus.clone())))
        .collect();
    let mut children: Vec<ServiceRef> = tickers
        .iter()
        .map(|t| Arc::clone(t) as ServiceRef)
        .collect();
    children.push(DelayedError::arc(Duration::from_secs(1)));

    let fan_out = FanOut::new(&cfg, children).with_bus(bus);

    let mut errors = fan_out.start().await?;
    if let Some(err) = errors.recv().await {
        println!("[main] child failed: {err}");
        println!("[main] root cause:   {}", err.root_cause());
    }

    fan_out.stop().await?;
    println!("[main] running after stop: {:?}", fan_out.running().await);
    assert!(errors.recv().await.is_none());

    let ticks: u64 = tickers.iter().map(|t| t.run_count()).sum();
    println!("[main] ticks observed: {ticks}");

    monitor.shutdown().await;
    Ok(())
}
