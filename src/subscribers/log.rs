//! # LogWriter: lifecycle events as `tracing` records.
//!
//! Faults, panics and aborted shutdowns log at `warn`/`error`; routine
//! transitions at `info`/`debug`. Fields are structured (`topic`, `attempt`,
//! `delay_ms`, `reason`) so any `tracing` subscriber can filter on them.

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::events::{Event, EventKind};
use crate::subscribers::Observe;

/// Observer that forwards events to `tracing`.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Observe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let topic = e.topic.map(|t| t.as_str()).unwrap_or("-");
        let reason = e.reason.as_deref().unwrap_or("");

        match e.kind {
            EventKind::WorkerRegistered => debug!(topic, "worker registered"),
            EventKind::WorkerStarting => {
                debug!(topic, attempt = e.attempt, "worker starting")
            }
            EventKind::WorkerConnecting => debug!(topic, "worker connecting"),
            EventKind::WorkerRunning => info!(topic, "worker running"),
            EventKind::WorkerDegraded => {
                warn!(topic, failures = e.attempt, reason, "worker degraded")
            }
            EventKind::WorkerFaulted => {
                warn!(topic, streak = e.attempt, reason, "worker faulted")
            }
            EventKind::WorkerPanicked => error!(topic, reason, "worker panicked"),
            EventKind::BackoffScheduled => {
                info!(topic, streak = e.attempt, delay_ms = e.delay_ms, "restart scheduled")
            }
            EventKind::WorkerStopped => info!(topic, reason, "worker stopped"),
            EventKind::CommandApplied => info!(topic, command = reason, "command applied"),
            EventKind::ShutdownRequested => info!(signal = reason, "shutdown requested"),
            EventKind::AllStoppedWithin => info!("all workers stopped within grace"),
            EventKind::GraceExceeded => error!(stuck = reason, "grace exceeded"),
            EventKind::ObserverOverflow => debug!(reason, "observer overflow"),
            EventKind::ObserverPanicked => error!(reason, "observer panicked"),
        }
    }

    fn name(&self) -> &'static str {
        "log"
    }

    fn queue_capacity(&self) -> usize {
        2048
    }
}
