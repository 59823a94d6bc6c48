//! # Worker abstraction.
//!
//! A [`Worker`] acquires one topic's data for as long as its context is not
//! cancelled. The supervisor runs each worker in its own actor task, restarts
//! it after faults and never lets one worker's failure reach another.
//!
//! Most workers are a [`SamplingWorker`](crate::workers::SamplingWorker)
//! around a [`Sampler`](crate::workers::Sampler); [`WorkerFn`](crate::workers::WorkerFn)
//! wraps a closure for anything else.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

use crate::core::StatusTracker;
use crate::error::WorkerError;
use crate::events::{Bus, Event};
use crate::store::{PublishOutcome, Record, StateStore, Topic};
use crate::workers::WorkerCommand;

/// Shared handle to a worker.
pub type WorkerRef = Arc<dyn Worker>;

/// # Autonomous acquisition loop for one topic.
///
/// `run` is called once per attempt. It should loop until `ctx.token` is
/// cancelled (then return `Ok(())`), and return an error only when the
/// worker cannot make progress on its own.
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use telehub::{Topic, Worker, WorkerContext, WorkerError};
///
/// struct Idle;
///
/// #[async_trait]
/// impl Worker for Idle {
///     fn topic(&self) -> Topic { Topic::Network }
///
///     async fn run(&self, ctx: WorkerContext) -> Result<(), WorkerError> {
///         ctx.token.cancelled().await;
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Worker: Send + Sync + 'static {
    /// Topic this worker publishes. Fixed for the worker's lifetime.
    fn topic(&self) -> Topic;

    /// Runs one attempt until cancellation or fault.
    async fn run(&self, ctx: WorkerContext) -> Result<(), WorkerError>;

    /// Monotonic count of records this worker has published over all
    /// attempts. The supervisor resets a fault streak when it advanced.
    fn progress(&self) -> u64 {
        0
    }
}

/// What a worker gets for one attempt.
#[derive(Clone)]
pub struct WorkerContext {
    /// Cancelled when the worker is stopped.
    pub token: CancellationToken,
    topic: Topic,
    bus: Bus,
    status: Arc<StatusTracker>,
    store: Arc<StateStore>,
    commands: Arc<Mutex<mpsc::Receiver<WorkerCommand>>>,
}

impl WorkerContext {
    pub(crate) fn new(
        topic: Topic,
        token: CancellationToken,
        bus: Bus,
        status: Arc<StatusTracker>,
        store: Arc<StateStore>,
        commands: Arc<Mutex<mpsc::Receiver<WorkerCommand>>>,
    ) -> Self {
        Self {
            token,
            topic,
            bus,
            status,
            store,
            commands,
        }
    }

    pub fn topic(&self) -> Topic {
        self.topic
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Writes a record to the state store.
    pub fn publish(&self, record: Record) -> PublishOutcome {
        self.store.publish(record)
    }

    /// Reports a lifecycle event; the topic is filled in if missing.
    ///
    /// The event updates the worker's status before observers see it.
    pub fn report(&self, mut event: Event) {
        if event.topic.is_none() {
            event.topic = Some(self.topic);
        }
        self.status.apply(&event);
        self.bus.publish(event);
    }

    /// Exclusive access to this worker's command queue.
    ///
    /// Only one attempt runs at a time, so the lock is uncontended.
    pub async fn commands(&self) -> tokio::sync::MutexGuard<'_, mpsc::Receiver<WorkerCommand>> {
        self.commands.lock().await
    }
}
