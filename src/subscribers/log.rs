//! # LogWriter: simple event printer
//!
//! A minimal subscriber that prints incoming [`Event`]s to stdout.
//! Use it for test or demo.
//!
//! ## Example output
//! ```text
//! [starting] service="fan-out" index=Some(0)
//! [forwarded] service="fan-out" err="service 1 error: fatal error: critical"
//! [stop-failed] service="round" err="service was never started"
//! [stop-timeout] service="fan-out" timeout_ms=5000 pending="{2}"
//! [round-completed] service="round" round=3
//! [stopped] service="round" index=None
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        println!("{}", render(e));
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}

fn render(e: &Event) -> String {
    let service = e.service.as_deref().unwrap_or("unknown");
    let err = e.error.as_deref().unwrap_or("unknown");
    match e.kind {
        EventKind::ServiceStarting => format!("[starting] service={service:?} index={:?}", e.index),
        EventKind::ServiceStarted => format!("[started] service={service:?} index={:?}", e.index),
        EventKind::StartFailed => {
            format!("[start-failed] service={service:?} index={:?} err={err:?}", e.index)
        }
        EventKind::ServiceStopping => format!("[stopping] service={service:?}"),
        EventKind::ServiceStopped => format!("[stopped] service={service:?} index={:?}", e.index),
        EventKind::StopFailed => {
            format!("[stop-failed] service={service:?} index={:?} err={err:?}", e.index)
        }
        EventKind::StopTimedOut => format!(
            "[stop-timeout] service={service:?} timeout_ms={} pending={err:?}",
            e.timeout_ms.unwrap_or_default()
        ),
        EventKind::ErrorForwarded => format!("[forwarded] service={service:?} err={err:?}"),
        EventKind::RoundStarted => {
            format!("[round-started] service={service:?} round={}", e.round.unwrap_or_default())
        }
        EventKind::RoundCompleted => {
            format!("[round-completed] service={service:?} round={}", e.round.unwrap_or_default())
        }
        EventKind::Tick => format!(
            "[tick] service={service:?} index={} run_count={}",
            e.index.unwrap_or_default(),
            e.round.unwrap_or_default()
        ),
        EventKind::SubscriberOverflow => {
            format!("[subscriber-overflow] subscriber={service:?} reason={err:?}")
        }
        EventKind::SubscriberPanicked => {
            format!("[subscriber-panicked] subscriber={service} info={err}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_render_stop_timeout() {
        let ev = Event::new(EventKind::StopTimedOut)
            .with_service("fan-out")
            .with_timeout(Duration::from_millis(250))
            .with_error("[2]");
        assert_eq!(
            render(&ev),
            "[stop-timeout] service=\"fan-out\" timeout_ms=250 pending=\"[2]\""
        );
    }

    #[test]
    fn test_render_round_completed() {
        let ev = Event::new(EventKind::RoundCompleted)
            .with_service("round")
            .with_round(3);
        assert_eq!(render(&ev), "[round-completed] service=\"round\" round=3");
    }
}
