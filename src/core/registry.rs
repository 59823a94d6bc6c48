//! # Worker registry.
//!
//! Owns one slot per topic: the worker, its command channel and, while it
//! runs, the actor's handle (JoinHandle + CancellationToken).
//!
//! ## Rules
//! - At most one worker per topic; at most one running actor per slot.
//! - The command receiver lives in the slot, so commands queued while a
//!   worker is restarting are seen by the next attempt.
//! - Actor tokens are children of the runtime token; dropping the
//!   supervisor cancels everything.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::actor::WorkerActor;
use crate::core::status::StatusTracker;
use crate::error::RuntimeError;
use crate::events::Bus;
use crate::policies::BackoffPolicy;
use crate::store::{StateStore, Topic};
use crate::workers::{WorkerCommand, WorkerRef};

/// Handle to a running actor.
pub(crate) struct Running {
    pub(crate) join: JoinHandle<()>,
    pub(crate) cancel: CancellationToken,
}

struct Slot {
    worker: WorkerRef,
    commands_tx: mpsc::Sender<WorkerCommand>,
    commands_rx: Arc<AsyncMutex<mpsc::Receiver<WorkerCommand>>>,
    running: Option<Running>,
}

pub(crate) struct Registry {
    slots: Mutex<BTreeMap<Topic, Slot>>,
    bus: Bus,
    status: Arc<StatusTracker>,
    store: Arc<StateStore>,
    backoff: BackoffPolicy,
    runtime_token: CancellationToken,
}

impl Registry {
    pub(crate) fn new(
        bus: Bus,
        status: Arc<StatusTracker>,
        store: Arc<StateStore>,
        backoff: BackoffPolicy,
        runtime_token: CancellationToken,
    ) -> Self {
        Self {
            slots: Mutex::new(BTreeMap::new()),
            bus,
            status,
            store,
            backoff,
            runtime_token,
        }
    }

    fn slots(&self) -> std::sync::MutexGuard<'_, BTreeMap<Topic, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds an idle slot for `worker`.
    pub(crate) fn register(
        &self,
        worker: WorkerRef,
        command_capacity: usize,
    ) -> Result<Topic, RuntimeError> {
        let topic = worker.topic();
        let mut slots = self.slots();
        if slots.contains_key(&topic) {
            return Err(RuntimeError::AlreadyRegistered { topic });
        }
        let (tx, rx) = mpsc::channel(command_capacity.max(1));
        slots.insert(
            topic,
            Slot {
                worker,
                commands_tx: tx,
                commands_rx: Arc::new(AsyncMutex::new(rx)),
                running: None,
            },
        );
        Ok(topic)
    }

    /// Spawns the worker's actor unless it is already running.
    ///
    /// Returns `true` when a new actor was spawned.
    pub(crate) fn start(&self, topic: Topic) -> Result<bool, RuntimeError> {
        let mut slots = self.slots();
        let slot = slots
            .get_mut(&topic)
            .ok_or(RuntimeError::UnknownTopic { topic })?;

        if let Some(running) = &slot.running {
            if !running.join.is_finished() {
                return Ok(false);
            }
        }

        let cancel = self.runtime_token.child_token();
        let actor = WorkerActor {
            worker: Arc::clone(&slot.worker),
            backoff: self.backoff,
            bus: self.bus.clone(),
            status: Arc::clone(&self.status),
            store: Arc::clone(&self.store),
            commands: Arc::clone(&slot.commands_rx),
        };
        let token = cancel.clone();
        let join = tokio::spawn(async move { actor.run(token).await });
        slot.running = Some(Running { join, cancel });
        Ok(true)
    }

    /// Detaches the running actor, if any, leaving the slot idle.
    pub(crate) fn take_running(&self, topic: Topic) -> Result<Option<Running>, RuntimeError> {
        let mut slots = self.slots();
        let slot = slots
            .get_mut(&topic)
            .ok_or(RuntimeError::UnknownTopic { topic })?;
        Ok(slot.running.take())
    }

    /// Detaches every running actor.
    pub(crate) fn take_all_running(&self) -> Vec<(Topic, Running)> {
        let mut slots = self.slots();
        slots
            .iter_mut()
            .filter_map(|(topic, slot)| slot.running.take().map(|r| (*topic, r)))
            .collect()
    }

    /// Queues `cmd` for the worker without waiting.
    pub(crate) fn command(&self, topic: Topic, cmd: WorkerCommand) -> Result<(), RuntimeError> {
        let slots = self.slots();
        let slot = slots.get(&topic).ok_or(RuntimeError::UnknownTopic { topic })?;
        slot.commands_tx.try_send(cmd).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => RuntimeError::CommandRejected {
                topic,
                reason: "queue_full",
            },
            mpsc::error::TrySendError::Closed(_) => RuntimeError::CommandRejected {
                topic,
                reason: "queue_closed",
            },
        })
    }

    pub(crate) fn topics(&self) -> Vec<Topic> {
        self.slots().keys().copied().collect()
    }

    pub(crate) fn contains(&self, topic: Topic) -> bool {
        self.slots().contains_key(&topic)
    }

    /// Records published by the worker over its lifetime.
    pub(crate) fn progress(&self, topic: Topic) -> Option<u64> {
        self.slots().get(&topic).map(|s| s.worker.progress())
    }
}
