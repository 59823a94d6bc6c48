//! # Supervisor: worker lifecycle, restarts and graceful shutdown.
//!
//! The [`Supervisor`] owns the event bus, the worker registry and the status
//! table. Each started worker runs in its own actor task with a child
//! cancellation token; faults are restarted with backoff and never reach
//! other workers.
//!
//! ## Architecture
//! ```text
//! register(worker) ──► Registry slot (idle) ──► WorkerRegistered
//! start(topic)     ──► tokio::spawn(WorkerActor::run(child token))
//!
//! WorkerActor ── emit(Event) ─┬─► StatusTracker::apply
//!                             └─► Bus ──► listener ──► ObserverSet::emit
//!
//! stop(topic) / stop_all():
//!     cancel token ──► join within grace ─┬─► joined  → WorkerStopped
//!                                          └─► timeout → abort, WorkerStopped,
//!                                                        RuntimeError::GraceExceeded
//!
//! run_until_signal():
//!     SIGINT/SIGTERM/SIGQUIT ──► ShutdownRequested ──► stop_all()
//!                                  ├─► AllStoppedWithin
//!                                  └─► GraceExceeded
//! ```
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use telehub::{
//!     StateStore, SupervisorBuilder, SupervisorConfig, Topic, WorkerContext, WorkerError,
//!     WorkerFn,
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(StateStore::default());
//!     let sup = SupervisorBuilder::new(SupervisorConfig::default(), store).build();
//!
//!     sup.register(WorkerFn::arc(Topic::Network, |ctx: WorkerContext| async move {
//!         ctx.token.cancelled().await;
//!         Ok::<_, WorkerError>(())
//!     }))?;
//!     sup.start(Topic::Network)?;
//!     sup.stop(Topic::Network).await?;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::SupervisorConfig;
use crate::core::registry::Registry;
use crate::core::shutdown;
use crate::core::status::{StatusTracker, WorkerState};
use crate::error::RuntimeError;
use crate::events::{Bus, Event, EventKind};
use crate::store::{StateStore, Topic};
use crate::workers::{WorkerCommand, WorkerRef};

/// Default capacity of a worker's command queue.
const COMMAND_CAPACITY: usize = 16;

/// Coordinates worker actors, status tracking and shutdown.
pub struct Supervisor {
    cfg: SupervisorConfig,
    bus: Bus,
    registry: Registry,
    status: Arc<StatusTracker>,
    runtime_token: CancellationToken,
}

impl Supervisor {
    pub(crate) fn new_internal(
        cfg: SupervisorConfig,
        bus: Bus,
        store: Arc<StateStore>,
        status: Arc<StatusTracker>,
        runtime_token: CancellationToken,
    ) -> Self {
        let registry = Registry::new(
            bus.clone(),
            Arc::clone(&status),
            store,
            cfg.backoff,
            runtime_token.clone(),
        );
        Self {
            cfg,
            bus,
            registry,
            status,
            runtime_token,
        }
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.cfg
    }

    /// Adds an idle worker. Fails if its topic already has one.
    pub fn register(&self, worker: WorkerRef) -> Result<(), RuntimeError> {
        self.register_with_capacity(worker, COMMAND_CAPACITY)
    }

    /// Like [`register`](Self::register) with an explicit command queue size.
    pub fn register_with_capacity(
        &self,
        worker: WorkerRef,
        command_capacity: usize,
    ) -> Result<(), RuntimeError> {
        let topic = self.registry.register(worker, command_capacity)?;
        self.status.insert(topic);
        debug!(%topic, "worker registered");
        self.bus
            .publish(Event::new(EventKind::WorkerRegistered).with_topic(topic));
        Ok(())
    }

    /// Starts the worker for `topic`; a no-op if it is already running.
    pub fn start(&self, topic: Topic) -> Result<(), RuntimeError> {
        if self.registry.start(topic)? {
            info!(%topic, "worker started");
        }
        Ok(())
    }

    /// Starts every registered worker. Failures are logged and skipped.
    pub fn start_all(&self) {
        for topic in self.registry.topics() {
            if let Err(e) = self.start(topic) {
                warn!(%topic, error = %e, "worker failed to start");
            }
        }
    }

    /// Stops the worker for `topic` and waits for it to release its device.
    ///
    /// Idempotent. A worker still running after the grace period is aborted
    /// and reported as [`RuntimeError::GraceExceeded`].
    pub async fn stop(&self, topic: Topic) -> Result<(), RuntimeError> {
        let Some(running) = self.registry.take_running(topic)? else {
            return Ok(());
        };
        running.cancel.cancel();

        let deadline = Instant::now() + self.cfg.grace;
        let joined = self.join_until(topic, running.join, deadline).await;
        if joined {
            Ok(())
        } else {
            Err(RuntimeError::GraceExceeded {
                grace: self.cfg.grace,
                stuck: vec![topic],
            })
        }
    }

    /// Stops every running worker under one shared grace period.
    pub async fn stop_all(&self) -> Result<(), RuntimeError> {
        let running = self.registry.take_all_running();
        for (_, r) in &running {
            r.cancel.cancel();
        }

        let deadline = Instant::now() + self.cfg.grace;
        let mut stuck = Vec::new();
        for (topic, r) in running {
            if !self.join_until(topic, r.join, deadline).await {
                stuck.push(topic);
            }
        }

        if stuck.is_empty() {
            self.bus.publish(Event::new(EventKind::AllStoppedWithin));
            Ok(())
        } else {
            let list = stuck
                .iter()
                .map(|t| t.as_str())
                .collect::<Vec<_>>()
                .join(",");
            self.bus
                .publish(Event::new(EventKind::GraceExceeded).with_reason(list));
            Err(RuntimeError::GraceExceeded {
                grace: self.cfg.grace,
                stuck,
            })
        }
    }

    /// Waits for a termination signal, then stops every worker.
    pub async fn run_until_signal(&self) -> Result<(), RuntimeError> {
        let signal = match shutdown::wait_for_shutdown_signal().await {
            Ok(name) => name,
            Err(e) => {
                error!(error = %e, "cannot listen for signals, shutting down");
                "unavailable"
            }
        };
        info!(signal, "shutdown requested");
        self.bus
            .publish(Event::new(EventKind::ShutdownRequested).with_reason(signal));
        self.stop_all().await
    }

    /// Status of every registered worker, ordered by topic.
    pub fn status(&self) -> Vec<WorkerState> {
        let mut states = self.status.snapshot();
        for state in &mut states {
            state.records = self.registry.progress(state.topic).unwrap_or(0);
        }
        states
    }

    /// Status of one worker.
    pub fn worker_status(&self, topic: Topic) -> Option<WorkerState> {
        let mut state = self.status.get(topic)?;
        state.records = self.registry.progress(topic).unwrap_or(0);
        Some(state)
    }

    /// Queues `cmd` for the worker; applied on its next loop iteration.
    pub fn command(&self, topic: Topic, cmd: WorkerCommand) -> Result<(), RuntimeError> {
        debug!(%topic, command = %cmd, "command queued");
        self.registry.command(topic, cmd)
    }

    pub fn topics(&self) -> Vec<Topic> {
        self.registry.topics()
    }

    pub fn is_registered(&self, topic: Topic) -> bool {
        self.registry.contains(topic)
    }

    /// Receives every lifecycle event published from now on.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    /// Joins an actor by `deadline` or aborts it. Returns `true` when it
    /// finished on its own.
    async fn join_until(&self, topic: Topic, mut join: JoinHandle<()>, deadline: Instant) -> bool {
        let joined = match time::timeout_at(deadline, &mut join).await {
            Ok(Ok(())) => true,
            Ok(Err(je)) => {
                error!(%topic, error = %je, "worker actor died");
                true
            }
            Err(_) => {
                join.abort();
                warn!(%topic, grace = ?self.cfg.grace, "worker did not stop in time, aborted");
                false
            }
        };

        let mut ev = Event::new(EventKind::WorkerStopped).with_topic(topic);
        if !joined {
            ev = ev.with_reason("aborted");
        }
        self.status.apply(&ev);
        self.bus.publish(ev);
        joined
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        self.runtime_token.cancel();
    }
}
