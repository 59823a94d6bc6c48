//! # Bounded drop-oldest delivery queue.
//!
//! One queue per subscription. The publisher side never waits: when the
//! queue is full the oldest pending record is evicted to make room, and the
//! subscription's overrun counter is bumped.
//!
//! ```text
//! push(r5) on a full queue (capacity 4):
//!   [r1 r2 r3 r4]  ──►  [r2 r3 r4 r5]   overruns += 1
//! ```
//!
//! A single consumer waits in [`DeliveryQueue::recv`]. Eviction never
//! reorders, it only skips.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;

use super::Record;

pub(crate) struct DeliveryQueue {
    buf: Mutex<VecDeque<Arc<Record>>>,
    capacity: usize,
    notify: Notify,
    closed: AtomicBool,
    overruns: AtomicU64,
}

impl DeliveryQueue {
    /// Capacity is clamped to at least 1.
    pub(crate) fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buf: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
            notify: Notify::new(),
            closed: AtomicBool::new(false),
            overruns: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Arc<Record>>> {
        self.buf.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueues without blocking. Returns `true` if an older record was evicted.
    pub(crate) fn push(&self, record: Arc<Record>) -> bool {
        if self.closed.load(Ordering::Acquire) {
            return false;
        }
        let evicted = {
            let mut buf = self.lock();
            let evicted = if buf.len() >= self.capacity {
                buf.pop_front().is_some()
            } else {
                false
            };
            buf.push_back(record);
            evicted
        };
        if evicted {
            self.overruns.fetch_add(1, Ordering::Relaxed);
        }
        self.notify.notify_one();
        evicted
    }

    pub(crate) fn try_pop(&self) -> Option<Arc<Record>> {
        self.lock().pop_front()
    }

    /// Waits for the next record; `None` once closed and drained.
    pub(crate) async fn recv(&self) -> Option<Arc<Record>> {
        loop {
            if let Some(record) = self.try_pop() {
                return Some(record);
            }
            if self.closed.load(Ordering::Acquire) {
                return None;
            }
            self.notify.notified().await;
        }
    }

    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_one();
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    pub(crate) fn overruns(&self) -> u64 {
        self.overruns.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{NetworkStatus, Payload, ActiveInterface};

    fn rec(seq: u64) -> Arc<Record> {
        Arc::new(Record::at(
            Payload::Network(NetworkStatus {
                active: ActiveInterface::None,
                ethernet_up: false,
                wifi_up: false,
            }),
            seq,
            0,
        ))
    }

    #[test]
    fn full_queue_evicts_oldest() {
        let q = DeliveryQueue::new(3);
        for seq in 1..=5 {
            q.push(rec(seq));
        }
        assert_eq!(q.len(), 3);
        assert_eq!(q.overruns(), 2);
        let seqs: Vec<u64> = std::iter::from_fn(|| q.try_pop()).map(|r| r.sequence).collect();
        assert_eq!(seqs, vec![3, 4, 5]);
    }

    #[tokio::test]
    async fn recv_drains_then_ends_after_close() {
        let q = Arc::new(DeliveryQueue::new(8));
        q.push(rec(1));
        q.close();
        assert!(!q.push(rec(2)));
        assert_eq!(q.recv().await.map(|r| r.sequence), Some(1));
        assert!(q.recv().await.is_none());
    }

    #[tokio::test]
    async fn recv_wakes_on_push() {
        let q = Arc::new(DeliveryQueue::new(8));
        let waiter = {
            let q = Arc::clone(&q);
            tokio::spawn(async move { q.recv().await.map(|r| r.sequence) })
        };
        tokio::task::yield_now().await;
        q.push(rec(7));
        assert_eq!(waiter.await.unwrap(), Some(7));
    }
}
