//! # Lifecycle event bus.
//!
//! [`Bus`] wraps [`tokio::sync::broadcast`]. Workers, actors and the
//! supervisor publish into it; the supervisor's single listener consumes it.
//! The status table does not depend on it: emitters apply their events there
//! first.
//!
//! ```text
//! Publishers (many):                      Consumer (one):
//!   SamplingWorker ──┐
//!   WorkerActor    ──┼──► Bus ──► supervisor listener ──► ObserverSet
//!   Supervisor     ──┤
//!   ObserverSet    ──┘
//! ```
//!
//! ## Rules
//! - `publish()` never blocks and never fails; with no receiver the event is dropped.
//! - Capacity is one shared ring buffer; a lagging receiver skips the oldest events
//!   and sees `RecvError::Lagged(n)`.

use tokio::sync::broadcast;

use super::event::Event;

/// Broadcast channel for lifecycle events. Cheap to clone.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a bus holding at most `capacity` (min 1) undelivered events.
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publishes to every current receiver.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// New receiver for events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}
