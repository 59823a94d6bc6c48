use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::{status::StatusTracker, supervisor::Supervisor};
use crate::{
    config::SupervisorConfig,
    events::Bus,
    store::StateStore,
    subscribers::{Observe, ObserverSet},
};

/// Builder for a [`Supervisor`] and its event listener.
pub struct SupervisorBuilder {
    cfg: SupervisorConfig,
    store: Arc<StateStore>,
    observers: Vec<Arc<dyn Observe>>,
}

impl SupervisorBuilder {
    /// Workers built by this supervisor publish into `store`.
    pub fn new(cfg: SupervisorConfig, store: Arc<StateStore>) -> Self {
        Self {
            cfg,
            store,
            observers: Vec::new(),
        }
    }

    /// Sets lifecycle observers (logging, alerting, ...).
    ///
    /// Each observer gets a dedicated task and bounded queue.
    pub fn with_observers(mut self, observers: Vec<Arc<dyn Observe>>) -> Self {
        self.observers = observers;
        self
    }

    /// Builds the supervisor and spawns its event listener.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn build(self) -> Arc<Supervisor> {
        let bus = Bus::new(self.cfg.bus_capacity.max(1));
        let status = Arc::new(StatusTracker::new());
        let runtime_token = CancellationToken::new();
        let observers = ObserverSet::new(self.observers, bus.clone());

        spawn_listener(&bus, observers, runtime_token.clone());

        Arc::new(Supervisor::new_internal(
            self.cfg,
            bus,
            self.store,
            status,
            runtime_token,
        ))
    }
}

/// Fans bus events out to observers.
fn spawn_listener(
    bus: &Bus,
    observers: ObserverSet,
    runtime_token: CancellationToken,
) {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = runtime_token.cancelled() => break,
                msg = rx.recv() => match msg {
                    Ok(ev) => observers.emit(&ev),
                    Err(RecvError::Lagged(n)) => {
                        warn!(skipped = n, "event listener lagged, observers missed events");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
        observers.shutdown().await;
    });
}
