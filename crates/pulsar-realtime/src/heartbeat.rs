//! Liveness probing while a link is open.

use std::time::Duration;

use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::{debug, trace, warn};

use crate::envelope::PING_FRAME;
use crate::transport::Link;

/// Result of one probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Ping written.
    Sent,
    /// The link no longer reports open; nothing sent.
    Skipped,
    /// The write failed.
    Failed(String),
}

/// At most one running probe interval.
///
/// The first tick fires one full period after [`Heartbeat::start`].
#[derive(Debug, Default)]
pub struct Heartbeat {
    interval: Option<Interval>,
}

impl Heartbeat {
    /// Stopped heartbeat.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start probing every `period`, replacing any running interval.
    pub fn start(&mut self, period: Duration) {
        let mut interval = time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.interval = Some(interval);
        debug!(period_ms = period.as_millis() as u64, "heartbeat started");
    }

    /// Stop probing. Idempotent.
    pub fn stop(&mut self) {
        if self.interval.take().is_some() {
            debug!("heartbeat stopped");
        }
    }

    /// Whether an interval is installed.
    pub fn is_running(&self) -> bool {
        self.interval.is_some()
    }

    /// Wait for the next tick; never resolves while stopped.
    pub async fn tick(&mut self) {
        match self.interval.as_mut() {
            Some(interval) => {
                let _ = interval.tick().await;
            }
            None => std::future::pending().await,
        }
    }
}

/// Send a ping on `link` if it still reports open.
pub async fn probe(link: &mut dyn Link) -> ProbeOutcome {
    if !link.ready_state().is_open() {
        trace!("link not open, probe skipped");
        return ProbeOutcome::Skipped;
    }
    match link.send(PING_FRAME.to_string()).await {
        Ok(()) => {
            trace!("ping sent");
            ProbeOutcome::Sent
        }
        Err(e) => {
            warn!(error = %e, "ping failed");
            ProbeOutcome::Failed(e.to_string())
        }
    }
}
