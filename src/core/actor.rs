//! # WorkerActor: restart loop for one worker.
//!
//! Runs attempts of one [`Worker`] until its token is cancelled. A worker is
//! expected to run forever, so every return that is not a response to
//! cancellation counts as a fault and schedules a restart.
//!
//! ## Event flow
//! ```text
//! WorkerStarting(attempt) → [worker.run] ─► cancelled        → exit
//!                                        ├─► Err / Ok(early)  → WorkerFaulted
//!                                        └─► panic            → WorkerPanicked, WorkerFaulted
//!
//! WorkerFaulted → BackoffScheduled(delay) → [sleep, cancellable] → next attempt
//! ```
//!
//! ## Rules
//! - Attempts run sequentially; the attempt counter never resets.
//! - The fault streak resets when the worker published anything during the
//!   failed attempt, so a device that works for an hour then drops restarts
//!   quickly.
//! - Cancellation is honoured during the attempt (via the child token) and
//!   during the backoff sleep.
//! - Every lifecycle event is applied to the status table before it goes on
//!   the bus, so a lagging observer never loses a fault or a restart count.
//! - `WorkerStopped` is published by the supervisor once the actor is joined.

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tokio::{select, time};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::core::runner::run_once;
use crate::core::status::StatusTracker;
use crate::error::WorkerError;
use crate::events::{Bus, Event, EventKind};
use crate::policies::BackoffPolicy;
use crate::store::StateStore;
use crate::workers::{WorkerCommand, WorkerContext, WorkerRef};

/// Supervises a single worker with restart and backoff.
pub(crate) struct WorkerActor {
    pub(crate) worker: WorkerRef,
    pub(crate) backoff: BackoffPolicy,
    pub(crate) bus: Bus,
    pub(crate) status: Arc<StatusTracker>,
    pub(crate) store: Arc<StateStore>,
    pub(crate) commands: Arc<Mutex<mpsc::Receiver<WorkerCommand>>>,
}

impl WorkerActor {
    /// Runs the actor until `token` is cancelled.
    pub(crate) async fn run(self, token: CancellationToken) {
        let topic = self.worker.topic();
        let mut attempt: u32 = 0;
        let mut streak: u32 = 0;

        loop {
            if token.is_cancelled() {
                break;
            }

            attempt = attempt.saturating_add(1);
            self.emit(
                Event::new(EventKind::WorkerStarting)
                    .with_topic(topic)
                    .with_attempt(attempt),
            );

            let before = self.worker.progress();
            let res = run_once(
                self.worker.as_ref(),
                &token,
                |child| {
                    WorkerContext::new(
                        topic,
                        child,
                        self.bus.clone(),
                        Arc::clone(&self.status),
                        Arc::clone(&self.store),
                        Arc::clone(&self.commands),
                    )
                },
                &self.bus,
            )
            .await;

            if token.is_cancelled() {
                if let Err(e) = &res {
                    debug!(%topic, error = %e, "attempt ended during stop");
                }
                break;
            }

            let err = match res {
                Ok(()) => WorkerError::Exited,
                Err(e) => e,
            };
            if self.worker.progress() > before {
                streak = 0;
            }

            let delay = self.backoff.next(streak);
            streak = streak.saturating_add(1);
            warn!(
                %topic,
                attempt,
                streak,
                error = %err,
                label = err.as_label(),
                delay_ms = delay.as_millis() as u64,
                "worker faulted, restarting after backoff"
            );
            self.emit(
                Event::new(EventKind::WorkerFaulted)
                    .with_topic(topic)
                    .with_attempt(streak)
                    .with_reason(err.to_string()),
            );
            self.emit(
                Event::new(EventKind::BackoffScheduled)
                    .with_topic(topic)
                    .with_attempt(streak)
                    .with_reason(err.as_label())
                    .with_delay(delay),
            );

            let sleep = time::sleep(delay);
            tokio::pin!(sleep);
            select! {
                _ = &mut sleep => {}
                _ = token.cancelled() => break,
            }
        }
    }

    fn emit(&self, ev: Event) {
        self.status.apply(&ev);
        self.bus.publish(ev);
    }
}
