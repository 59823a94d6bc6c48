//! # Sampling worker: the generic acquisition loop.
//!
//! [`SamplingWorker`] drives a device-specific [`Sampler`] through one loop
//! that is the same for every source:
//!
//! ```text
//! loop {
//!   ├─► cancelled? ─────────────────────────────► exit Ok
//!   ├─► drain commands
//!   │     ├─ Reconnect            → sampler.disconnect()
//!   │     └─ other                → sampler.apply(cmd)  (Unsupported: logged only)
//!   ├─► not connected?            → report WorkerConnecting
//!   ├─► connect (if needed) + sample                     (raced against cancellation)
//!   │     ├─ Ok(payload)  → sequence += 1, publish, report WorkerRunning once
//!   │     └─ Err(e)       → link failure? drop link
//!   │                       report WorkerDegraded
//!   │                       failures >= threshold? ──► exit Err(Fault)
//!   └─► sleep(interval)                                  (cancellable)
//! }
//! on entry and on exit: sampler.disconnect()
//! ```
//!
//! ## Rules
//! - Nothing is published from a failed or partial sample.
//! - The sequence counter lives in the worker, not in the attempt, so it keeps
//!   increasing across supervisor restarts.
//! - The device link is released on every exit path, including stop. An
//!   attempt aborted after its grace period cannot do that, so the next
//!   attempt releases whatever link it left behind before sampling.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};
use tokio::time;
use tracing::{debug, warn};

use crate::config::SamplingConfig;
use crate::error::{SampleError, WorkerError};
use crate::events::{Event, EventKind};
use crate::store::{Payload, Record, Topic};
use crate::workers::{Worker, WorkerCommand, WorkerContext};

/// Device-specific half of a sampling worker.
///
/// Implementations own their I/O handle (device link, sysfs path, command
/// runner) exclusively; the loop never calls two methods concurrently.
#[async_trait]
pub trait Sampler: Send + 'static {
    /// Topic of every payload this sampler produces.
    fn topic(&self) -> Topic;

    /// Whether `sample` can run without connecting first.
    fn is_connected(&self) -> bool {
        true
    }

    /// Finds and opens the device.
    async fn connect(&mut self) -> Result<(), SampleError> {
        Ok(())
    }

    /// Acquires and decodes one sample. All-or-nothing: any field that does not
    /// decode fails the whole sample.
    async fn sample(&mut self) -> Result<Payload, SampleError>;

    /// Applies a command other than `Reconnect`.
    async fn apply(&mut self, command: &WorkerCommand) -> Result<(), SampleError> {
        Err(SampleError::Unsupported(command.to_string()))
    }

    /// Releases the device. Must be idempotent.
    async fn disconnect(&mut self) {}
}

/// [`Worker`] that runs a [`Sampler`] on a fixed interval.
pub struct SamplingWorker<S> {
    topic: Topic,
    sampler: Mutex<S>,
    cfg: SamplingConfig,
    sequence: AtomicU64,
}

impl<S: Sampler> SamplingWorker<S> {
    pub fn new(sampler: S, cfg: SamplingConfig) -> Self {
        Self {
            topic: sampler.topic(),
            sampler: Mutex::new(sampler),
            cfg,
            sequence: AtomicU64::new(0),
        }
    }

    pub fn arc(sampler: S, cfg: SamplingConfig) -> Arc<Self> {
        Arc::new(Self::new(sampler, cfg))
    }

    pub fn config(&self) -> &SamplingConfig {
        &self.cfg
    }

    async fn sample_loop(
        &self,
        sampler: &mut S,
        commands: &mut mpsc::Receiver<WorkerCommand>,
        ctx: &WorkerContext,
    ) -> Result<(), WorkerError> {
        let threshold = self.cfg.threshold();
        let mut failures: u32 = 0;
        let mut running = false;

        loop {
            if ctx.is_cancelled() {
                return Ok(());
            }

            while let Ok(cmd) = commands.try_recv() {
                self.apply_command(sampler, cmd, ctx).await;
            }

            if !sampler.is_connected() {
                running = false;
                ctx.report(Event::new(EventKind::WorkerConnecting));
            }

            let acquired = tokio::select! {
                _ = ctx.token.cancelled() => return Ok(()),
                res = self.acquire(sampler) => res,
            };

            match acquired {
                Ok(payload) => {
                    failures = 0;
                    let sequence = self.sequence.fetch_add(1, Ordering::AcqRel) + 1;
                    ctx.publish(Record::new(payload, sequence));
                    if !running {
                        running = true;
                        ctx.report(Event::new(EventKind::WorkerRunning));
                    }
                }
                Err(e) => {
                    failures += 1;
                    running = false;
                    if e.is_link_failure() {
                        sampler.disconnect().await;
                    }
                    warn!(topic = %self.topic, error = %e, failures, "acquisition failed");
                    ctx.report(
                        Event::new(EventKind::WorkerDegraded)
                            .with_reason(e.to_string())
                            .with_attempt(failures),
                    );
                    if failures >= threshold {
                        return Err(WorkerError::Fault {
                            error: e.to_string(),
                            failures,
                        });
                    }
                }
            }

            tokio::select! {
                _ = ctx.token.cancelled() => return Ok(()),
                _ = time::sleep(self.cfg.interval) => {}
            }
        }
    }

    async fn acquire(&self, sampler: &mut S) -> Result<Payload, SampleError> {
        if !sampler.is_connected() {
            sampler.connect().await?;
        }
        let payload = sampler.sample().await?;
        if payload.topic() != self.topic {
            return Err(SampleError::decode(format!(
                "sampler produced a {} payload",
                payload.topic()
            )));
        }
        Ok(payload)
    }

    async fn apply_command(&self, sampler: &mut S, cmd: WorkerCommand, ctx: &WorkerContext) {
        let res = match &cmd {
            WorkerCommand::Reconnect => {
                sampler.disconnect().await;
                Ok(())
            }
            other => sampler.apply(other).await,
        };
        match res {
            Ok(()) => {
                debug!(topic = %self.topic, command = %cmd, "command applied");
                ctx.report(Event::new(EventKind::CommandApplied).with_reason(cmd.to_string()));
            }
            Err(SampleError::Unsupported(_)) => {
                warn!(topic = %self.topic, command = %cmd, "command not supported by this worker");
            }
            Err(e) => {
                if e.is_link_failure() {
                    sampler.disconnect().await;
                }
                warn!(topic = %self.topic, command = %cmd, error = %e, "command failed");
            }
        }
    }
}

#[async_trait]
impl<S: Sampler> Worker for SamplingWorker<S> {
    fn topic(&self) -> Topic {
        self.topic
    }

    async fn run(&self, ctx: WorkerContext) -> Result<(), WorkerError> {
        let mut sampler = self.sampler.lock().await;
        sampler.disconnect().await;
        let mut commands = ctx.commands().await;
        let res = self.sample_loop(&mut sampler, &mut commands, &ctx).await;
        sampler.disconnect().await;
        res
    }

    fn progress(&self) -> u64 {
        self.sequence.load(Ordering::Acquire)
    }
}
