use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

use super::{Payload, Topic};

/// One immutable, sequenced sample of a topic.
///
/// The topic is derived from the payload, so the two can never disagree.
/// Records are shared as `Arc<Record>` once published and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    pub topic: Topic,
    pub payload: Payload,
    /// Unix epoch milliseconds.
    pub captured_at: i64,
    /// Per-topic counter assigned by the producing worker.
    pub sequence: u64,
}

impl Record {
    /// Builds a record stamped with the current wall-clock time.
    pub fn new(payload: Payload, sequence: u64) -> Self {
        Self::at(payload, sequence, now_millis())
    }

    /// Builds a record with an explicit capture time.
    pub fn at(payload: Payload, sequence: u64, captured_at: i64) -> Self {
        Self {
            topic: payload.topic(),
            payload,
            captured_at,
            sequence,
        }
    }
}

/// Milliseconds since the Unix epoch; 0 if the clock is before it.
pub(crate) fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis().min(i64::MAX as u128) as i64)
        .unwrap_or(0)
}
