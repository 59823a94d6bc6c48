//! # Worker status table with sequence-based ordering.
//!
//! The authoritative per-topic [`WorkerState`], built from lifecycle events.
//!
//! ## Architecture
//! ```text
//! WorkerActor / WorkerContext::report / Supervisor::stop
//!        │ apply(&ev), then publish on the bus
//!        ▼
//! StatusTracker ──► BTreeMap<Topic, {last_seq, WorkerState}>
//! ```
//!
//! ## Rules
//! - Events are applied by whoever emits them, never via the lossy bus.
//! - Events with `seq <= last_seq` for their topic are rejected as stale.
//! - Reads are snapshots.
//!
//! ## Transitions
//! ```text
//! WorkerStarting / WorkerConnecting → Connecting
//! WorkerRunning                     → Running
//! WorkerDegraded                    → Degraded, last_error
//! WorkerFaulted                     → Faulted, last_error, restart_count += 1
//! BackoffScheduled                  → next_retry_at = at + delay
//! WorkerStopped                     → Stopped, next_retry_at cleared
//! ```

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};
use std::time::SystemTime;

use serde::Serialize;

use crate::events::{Event, EventKind};
use crate::store::Topic;

/// Coarse state of one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    /// Registered, never started.
    Idle,
    /// Starting an attempt or looking for its device.
    Connecting,
    /// Publishing records.
    Running,
    /// Recent acquisitions failed; still below the fault threshold.
    Degraded,
    /// Attempt ended in a fault; waiting out its backoff.
    Faulted,
    Stopped,
}

/// Status of one registered worker, as reported by [`Supervisor::status`](crate::Supervisor::status).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkerState {
    pub topic: Topic,
    pub status: WorkerStatus,
    pub last_error: Option<String>,
    /// Faults since registration.
    pub restart_count: u32,
    pub next_retry_at: Option<SystemTime>,
    /// Records published over the worker's lifetime.
    pub records: u64,
}

impl WorkerState {
    fn idle(topic: Topic) -> Self {
        Self {
            topic,
            status: WorkerStatus::Idle,
            last_error: None,
            restart_count: 0,
            next_retry_at: None,
            records: 0,
        }
    }
}

struct Entry {
    last_seq: u64,
    state: WorkerState,
}

/// Thread-safe status table.
pub(crate) struct StatusTracker {
    entries: RwLock<BTreeMap<Topic, Entry>>,
}

impl StatusTracker {
    pub(crate) fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    /// Adds an `Idle` entry for a newly registered worker.
    pub(crate) fn insert(&self, topic: Topic) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.entry(topic).or_insert_with(|| Entry {
            last_seq: 0,
            state: WorkerState::idle(topic),
        });
    }

    /// Applies `ev` if it is newer than the last event seen for its topic.
    ///
    /// Returns `false` for stale events, events without a topic and unknown topics.
    pub(crate) fn apply(&self, ev: &Event) -> bool {
        let Some(topic) = ev.topic else {
            return false;
        };
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let Some(entry) = entries.get_mut(&topic) else {
            return false;
        };
        if ev.seq <= entry.last_seq {
            return false;
        }
        entry.last_seq = ev.seq;

        let state = &mut entry.state;
        match ev.kind {
            EventKind::WorkerStarting | EventKind::WorkerConnecting => {
                state.status = WorkerStatus::Connecting;
                state.next_retry_at = None;
            }
            EventKind::WorkerRunning => state.status = WorkerStatus::Running,
            EventKind::WorkerDegraded => {
                state.status = WorkerStatus::Degraded;
                state.last_error = ev.reason.as_deref().map(str::to_owned);
            }
            EventKind::WorkerFaulted => {
                state.status = WorkerStatus::Faulted;
                state.last_error = ev.reason.as_deref().map(str::to_owned);
                state.restart_count = state.restart_count.saturating_add(1);
            }
            EventKind::BackoffScheduled => {
                state.next_retry_at = ev.delay().map(|d| ev.at + d);
            }
            EventKind::WorkerStopped => {
                state.status = WorkerStatus::Stopped;
                state.next_retry_at = None;
            }
            _ => {}
        }
        true
    }

    /// All entries ordered by topic.
    pub(crate) fn snapshot(&self) -> Vec<WorkerState> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.values().map(|e| e.state.clone()).collect()
    }

    pub(crate) fn get(&self, topic: Topic) -> Option<WorkerState> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(&topic).map(|e| e.state.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn ev(kind: EventKind) -> Event {
        Event::new(kind).with_topic(Topic::Gps)
    }

    #[test]
    fn fault_records_error_and_counts_restart() {
        let t = StatusTracker::new();
        t.insert(Topic::Gps);
        assert_eq!(t.get(Topic::Gps).unwrap().status, WorkerStatus::Idle);

        t.apply(&ev(EventKind::WorkerStarting));
        t.apply(&ev(EventKind::WorkerDegraded).with_reason("link timeout"));
        t.apply(&ev(EventKind::WorkerFaulted).with_reason("3 failures"));
        let backoff = ev(EventKind::BackoffScheduled).with_delay(Duration::from_secs(4));
        let at = backoff.at;
        t.apply(&backoff);

        let s = t.get(Topic::Gps).unwrap();
        assert_eq!(s.status, WorkerStatus::Faulted);
        assert_eq!(s.last_error.as_deref(), Some("3 failures"));
        assert_eq!(s.restart_count, 1);
        assert_eq!(s.next_retry_at, Some(at + Duration::from_secs(4)));

        t.apply(&ev(EventKind::WorkerStarting));
        assert_eq!(t.get(Topic::Gps).unwrap().next_retry_at, None);
    }

    #[test]
    fn stale_events_are_ignored() {
        let t = StatusTracker::new();
        t.insert(Topic::Gps);
        let older = ev(EventKind::WorkerRunning);
        let newer = ev(EventKind::WorkerStopped);

        assert!(t.apply(&newer));
        assert!(!t.apply(&older));
        assert_eq!(t.get(Topic::Gps).unwrap().status, WorkerStatus::Stopped);
    }

    #[test]
    fn unregistered_and_topicless_events_are_dropped() {
        let t = StatusTracker::new();
        assert!(!t.apply(&ev(EventKind::WorkerRunning)));
        assert!(!t.apply(&Event::new(EventKind::ShutdownRequested)));
        assert!(t.snapshot().is_empty());
    }
}
