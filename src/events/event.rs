//! # Lifecycle events emitted by workers, actors and the supervisor.
//!
//! The [`EventKind`] enum classifies events in three groups:
//! - **Worker events**: what a worker's loop is doing (connecting, running, degraded)
//! - **Supervision events**: faults, restarts, stops and commands
//! - **Runtime events**: shutdown progress and observer health
//!
//! [`Event`] carries the optional metadata (topic, reason, attempt, delay).
//!
//! ## Ordering guarantees
//! Each event takes a globally unique `seq` from one monotonic counter at
//! construction. The status table uses it to ignore events that arrive out
//! of order for a topic.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use telehub::{Event, EventKind, Topic};
//!
//! let ev = Event::new(EventKind::BackoffScheduled)
//!     .with_topic(Topic::Modem)
//!     .with_reason("link timeout")
//!     .with_attempt(2)
//!     .with_delay(Duration::from_secs(2));
//!
//! assert_eq!(ev.topic, Some(Topic::Modem));
//! assert_eq!(ev.delay_ms, Some(2000));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

use crate::store::Topic;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(1);

/// Classification of lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Worker events ===
    /// Worker added to the supervisor.
    ///
    /// Sets: `topic`
    WorkerRegistered,

    /// Supervisor is starting an attempt of the worker.
    ///
    /// Sets: `topic`, `attempt` (1-based, per worker lifetime)
    WorkerStarting,

    /// Worker is (re)discovering or opening its device.
    ///
    /// Sets: `topic`
    WorkerConnecting,

    /// Worker published its first record since connecting.
    ///
    /// Sets: `topic`
    WorkerRunning,

    /// One acquisition failed; the worker keeps trying until its threshold.
    ///
    /// Sets: `topic`, `reason`, `attempt` (consecutive failures)
    WorkerDegraded,

    // === Supervision events ===
    /// Worker attempt ended in a fault and will be restarted.
    ///
    /// Sets: `topic`, `reason`, `attempt` (fault streak, 1-based)
    WorkerFaulted,

    /// Worker loop panicked; always followed by `WorkerFaulted`.
    ///
    /// Sets: `topic`, `reason` (panic message)
    WorkerPanicked,

    /// Restart delay scheduled after a fault.
    ///
    /// Sets: `topic`, `delay_ms`, `attempt` (fault streak), `reason`
    BackoffScheduled,

    /// Worker exited after a stop request.
    ///
    /// Sets: `topic`, `reason` (only when it had to be aborted)
    WorkerStopped,

    /// Worker applied an external command.
    ///
    /// Sets: `topic`, `reason` (command)
    CommandApplied,

    // === Runtime events ===
    /// Termination signal observed.
    ShutdownRequested,

    /// All workers stopped within the grace period.
    AllStoppedWithin,

    /// Some workers had to be aborted after the grace period.
    ///
    /// Sets: `reason` (aborted topics)
    GraceExceeded,

    /// Observer queue was full or closed; the event was dropped for it.
    ///
    /// Sets: `reason` (observer name and cause)
    ObserverOverflow,

    /// Observer panicked while handling an event.
    ///
    /// Sets: `reason` (observer name and panic message)
    ObserverPanicked,
}

/// Lifecycle event with optional metadata.
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,
    /// Worker topic, if the event concerns one.
    pub topic: Option<Topic>,
    /// Human-readable detail (errors, commands, overflow cause).
    pub reason: Option<Arc<str>>,
    /// Attempt or streak counter, meaning depends on `kind`.
    pub attempt: Option<u32>,
    /// Backoff delay in milliseconds.
    pub delay_ms: Option<u32>,
}

impl Event {
    /// Creates an event stamped with the current time and the next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            topic: None,
            reason: None,
            attempt: None,
            delay_ms: None,
        }
    }

    #[inline]
    pub fn with_topic(mut self, topic: Topic) -> Self {
        self.topic = Some(topic);
        self
    }

    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    #[inline]
    pub fn with_attempt(mut self, n: u32) -> Self {
        self.attempt = Some(n);
        self
    }

    /// Attaches a delay (stored as milliseconds, saturating).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        self.delay_ms = Some(d.as_millis().min(u128::from(u32::MAX)) as u32);
        self
    }

    /// Delay as a [`Duration`], if set.
    pub fn delay(&self) -> Option<Duration> {
        self.delay_ms.map(|ms| Duration::from_millis(u64::from(ms)))
    }

    pub(crate) fn observer_overflow(observer: &'static str, cause: &'static str) -> Self {
        Event::new(EventKind::ObserverOverflow)
            .with_reason(format!("observer={observer} cause={cause}"))
    }

    pub(crate) fn observer_panicked(observer: &'static str, info: &str) -> Self {
        Event::new(EventKind::ObserverPanicked).with_reason(format!("observer={observer} {info}"))
    }
}
