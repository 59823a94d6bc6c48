//! # State store and router.
//!
//! [`StateStore`] keeps the latest [`Record`] per [`Topic`] and forwards every
//! accepted write to the router's subscribers.
//!
//! ## Architecture
//! ```text
//! worker ──► publish(record)
//!              │
//!              ├─ sequence <= stored? ──► Stale { current }   (debug log, no fan-out)
//!              │
//!              ├─ latest[topic] = record         (store lock)
//!              ├─ lock route table, release store lock
//!              └─ push into each matching queue  ──► Accepted { delivered }
//!
//! read_latest(topic) ──► latest[topic]           (store lock only, never waits on fan-out)
//! ```
//!
//! ## Rules
//! - **Monotonic per topic**: a record whose sequence is not above the stored
//!   one is discarded and never broadcast.
//! - **Replace before broadcast**: the route table is locked before the store
//!   lock is released, so no subscriber sees a record that `read_latest`
//!   could not already return, and two publishers of one topic reach the
//!   queues in the order they updated the store.
//! - **Never blocks on consumers**: fan-out is a non-blocking push with
//!   drop-oldest per subscription.

mod payload;
mod queue;
mod record;
mod router;
mod topic;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::config::RouterConfig;

pub use payload::{
    ActiveInterface, BluetoothStatus, GpsFix, ModemStatus, NetworkStatus, ObdSnapshot, Payload,
    Registration, SpaceUsage, SpeedUnit, SystemStatus, UpsStatus,
};
pub use record::Record;
pub(crate) use record::now_millis;
pub use router::{Interest, SubscriberId, Subscription};
pub use topic::{ParseTopicError, Topic};

use router::Router;

/// Result of [`StateStore::publish`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Stored and pushed to `delivered` subscriptions.
    Accepted { delivered: usize },
    /// Discarded: the store already holds sequence `current` for the topic.
    Stale { current: u64 },
}

impl PublishOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, PublishOutcome::Accepted { .. })
    }
}

/// Latest-value cache plus subscription router.
pub struct StateStore {
    latest: Mutex<HashMap<Topic, Arc<Record>>>,
    router: Arc<Router>,
    cfg: RouterConfig,
}

impl StateStore {
    pub fn new(cfg: RouterConfig) -> Self {
        Self {
            latest: Mutex::new(HashMap::new()),
            router: Router::new(),
            cfg,
        }
    }

    fn lock_latest(&self) -> MutexGuard<'_, HashMap<Topic, Arc<Record>>> {
        self.latest.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores `record` if it is newer than the current entry and fans it out.
    pub fn publish(&self, record: Record) -> PublishOutcome {
        let record = Arc::new(record);

        let mut latest = self.lock_latest();
        if let Some(current) = latest.get(&record.topic) {
            if record.sequence <= current.sequence {
                let current = current.sequence;
                drop(latest);
                debug!(
                    topic = %record.topic,
                    sequence = record.sequence,
                    current,
                    "stale write discarded"
                );
                return PublishOutcome::Stale { current };
            }
        }
        latest.insert(record.topic, Arc::clone(&record));

        let routes = self.router.lock_routes();
        drop(latest);
        let delivered = Router::deliver(&routes, &record);
        drop(routes);

        PublishOutcome::Accepted { delivered }
    }

    /// Latest record for `topic`, or `None` if it was never sampled.
    pub fn read_latest(&self, topic: Topic) -> Option<Arc<Record>> {
        self.lock_latest().get(&topic).cloned()
    }

    /// Latest record of every sampled topic, ordered by topic.
    pub fn snapshot(&self) -> Vec<Arc<Record>> {
        let mut records: Vec<Arc<Record>> = self.lock_latest().values().cloned().collect();
        records.sort_unstable_by_key(|r| r.topic);
        records
    }

    /// Subscribes with the configured default capacity.
    pub fn subscribe(&self, interest: Interest) -> Subscription {
        self.subscribe_with_capacity(interest, self.cfg.subscriber_capacity)
    }

    pub fn subscribe_with_capacity(&self, interest: Interest, capacity: usize) -> Subscription {
        self.router.add(interest, capacity)
    }

    /// Removes the subscription; pending records are discarded.
    pub fn unsubscribe(&self, subscription: Subscription) {
        self.router.remove(subscription.id());
    }

    pub fn subscriber_count(&self) -> usize {
        self.router.len()
    }

    /// Closes every subscription. Receivers drain what is queued and then
    /// observe `None`; later subscriptions are born closed.
    pub fn close(&self) {
        self.router.close();
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new(RouterConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn ups(seq: u64, percent: u8) -> Record {
        Record::at(
            Payload::Ups(UpsStatus {
                percent,
                voltage: Some(4.1),
                charging: false,
                on_battery: true,
                state: "Discharging".into(),
            }),
            seq,
            1_700_000_000_000 + seq as i64,
        )
    }

    fn net(seq: u64) -> Record {
        Record::at(
            Payload::Network(NetworkStatus {
                active: ActiveInterface::Ethernet,
                ethernet_up: true,
                wifi_up: false,
            }),
            seq,
            0,
        )
    }

    #[test]
    fn late_lower_sequence_is_discarded() {
        let store = StateStore::default();
        assert!(store.publish(ups(1, 90)).is_accepted());
        assert!(store.publish(ups(2, 89)).is_accepted());
        assert_eq!(store.publish(ups(1, 90)), PublishOutcome::Stale { current: 2 });

        let latest = store.read_latest(Topic::Ups).unwrap();
        assert_eq!(latest.sequence, 2);
    }

    #[test]
    fn read_latest_keeps_maximum_regardless_of_order() {
        let store = StateStore::default();
        for seq in [5, 3, 9, 1, 7, 9, 2, 8] {
            store.publish(ups(seq, seq as u8));
        }
        assert_eq!(store.read_latest(Topic::Ups).unwrap().sequence, 9);
        assert!(store.read_latest(Topic::Gps).is_none());
    }

    #[test]
    fn stale_write_is_not_broadcast() {
        let store = StateStore::default();
        let sub = store.subscribe(Interest::All);
        store.publish(ups(4, 1));
        store.publish(ups(3, 1));
        assert_eq!(sub.try_recv().map(|r| r.sequence), Some(4));
        assert!(sub.try_recv().is_none());
    }

    #[test]
    fn interest_filters_topics() {
        let store = StateStore::default();
        let ups_only = store.subscribe(Interest::only([Topic::Ups]));
        let all = store.subscribe(Interest::All);

        store.publish(net(1));
        assert_eq!(store.publish(ups(1, 50)), PublishOutcome::Accepted { delivered: 2 });

        assert_eq!(ups_only.try_recv().map(|r| r.topic), Some(Topic::Ups));
        assert!(ups_only.try_recv().is_none());
        assert_eq!(all.pending(), 2);
    }

    #[test]
    fn snapshot_is_ordered_by_topic() {
        let store = StateStore::default();
        store.publish(net(1));
        store.publish(ups(1, 10));
        let topics: Vec<Topic> = store.snapshot().iter().map(|r| r.topic).collect();
        assert_eq!(topics, vec![Topic::Ups, Topic::Network]);
    }

    #[test]
    fn drop_and_unsubscribe_remove_routes() {
        let store = StateStore::default();
        let a = store.subscribe(Interest::All);
        let b = store.subscribe(Interest::All);
        assert_eq!(store.subscriber_count(), 2);

        store.unsubscribe(a);
        assert_eq!(store.subscriber_count(), 1);
        drop(b);
        assert_eq!(store.subscriber_count(), 0);

        // Never-read subscription is safe to remove too.
        let c = store.subscribe(Interest::All);
        store.unsubscribe(c);
        assert_eq!(store.publish(ups(1, 1)), PublishOutcome::Accepted { delivered: 0 });
    }

    #[tokio::test]
    async fn close_drains_then_ends() {
        let store = StateStore::default();
        let sub = store.subscribe(Interest::All);
        store.publish(ups(1, 1));
        store.close();

        assert_eq!(sub.recv().await.map(|r| r.sequence), Some(1));
        assert!(sub.recv().await.is_none());
        assert!(store.subscribe(Interest::All).is_closed());
    }

    #[tokio::test]
    async fn stalled_subscriber_does_not_slow_active_ones() {
        let store = Arc::new(StateStore::new(RouterConfig {
            subscriber_capacity: 16,
        }));
        let stalled = store.subscribe(Interest::All);
        let readers: Vec<_> = (0..2)
            .map(|_| {
                let sub = store.subscribe_with_capacity(Interest::All, 2048);
                tokio::spawn(async move {
                    let mut seen = Vec::with_capacity(1000);
                    while seen.len() < 1000 {
                        match sub.recv().await {
                            Some(r) => seen.push(r.sequence),
                            None => break,
                        }
                    }
                    seen
                })
            })
            .collect();

        let publish_all = async {
            for seq in 1..=1000 {
                assert!(store.publish(ups(seq, 50)).is_accepted());
            }
        };
        tokio::time::timeout(Duration::from_secs(5), publish_all)
            .await
            .expect("publisher blocked by a stalled subscriber");

        let expected: Vec<u64> = (1..=1000).collect();
        for reader in readers {
            assert_eq!(reader.await.unwrap(), expected);
        }

        assert_eq!(stalled.pending(), 16);
        assert_eq!(stalled.overruns(), 1000 - 16);
        let first_left = stalled.try_recv().unwrap().sequence;
        assert_eq!(first_left, 1000 - 16 + 1);
    }
}
