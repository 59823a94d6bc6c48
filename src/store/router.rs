//! # Router: subscriber set and record fan-out.
//!
//! The router owns one [`DeliveryQueue`] per live [`Subscription`]. It never
//! waits on a consumer: delivery is a non-blocking push into each matching
//! queue, with drop-oldest on overflow.
//!
//! ```text
//! StateStore::publish(record)
//!        │  (store lock held until the route table is locked)
//!        ▼
//!   routes: id → { interest, queue }
//!        ├──► [queue 1] ──► Subscription::recv()  (gateway A)
//!        ├──► [queue 2] ──► Subscription::recv()  (gateway B)
//!        └──► [queue N]     (stalled: evicts its own oldest, nobody waits)
//! ```
//!
//! Dropping a [`Subscription`] removes its route.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::debug;

use super::queue::DeliveryQueue;
use super::{Record, Topic};

/// Identifier of one subscription, unique per router.
pub type SubscriberId = u64;

/// Which topics a subscription wants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interest {
    All,
    Topics(HashSet<Topic>),
}

impl Interest {
    /// Interest in just the given topics.
    pub fn only(topics: impl IntoIterator<Item = Topic>) -> Self {
        Interest::Topics(topics.into_iter().collect())
    }

    pub fn matches(&self, topic: Topic) -> bool {
        match self {
            Interest::All => true,
            Interest::Topics(set) => set.contains(&topic),
        }
    }
}

pub(crate) struct Route {
    interest: Interest,
    queue: Arc<DeliveryQueue>,
}

pub(crate) type RouteTable = HashMap<SubscriberId, Route>;

pub(crate) struct Router {
    routes: Mutex<RouteTable>,
    next_id: AtomicU64,
    closed: AtomicBool,
}

impl Router {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            routes: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
        })
    }

    pub(crate) fn lock_routes(&self) -> MutexGuard<'_, RouteTable> {
        self.routes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a new route. After [`Router::close`] the returned
    /// subscription is already closed and yields nothing.
    pub(crate) fn add(self: &Arc<Self>, interest: Interest, capacity: usize) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let queue = Arc::new(DeliveryQueue::new(capacity));

        let mut routes = self.lock_routes();
        if self.closed.load(Ordering::Acquire) {
            queue.close();
        } else {
            routes.insert(
                id,
                Route {
                    interest,
                    queue: Arc::clone(&queue),
                },
            );
        }
        drop(routes);

        debug!(subscriber = id, capacity = queue.capacity(), "subscription added");
        Subscription {
            id,
            queue,
            router: Arc::downgrade(self),
        }
    }

    pub(crate) fn remove(&self, id: SubscriberId) -> bool {
        let removed = self.lock_routes().remove(&id);
        match removed {
            Some(route) => {
                route.queue.close();
                debug!(subscriber = id, overruns = route.queue.overruns(), "subscription removed");
                true
            }
            None => false,
        }
    }

    /// Pushes `record` into every matching queue; returns how many matched.
    pub(crate) fn deliver(routes: &RouteTable, record: &Arc<Record>) -> usize {
        let mut delivered = 0;
        for (id, route) in routes {
            if !route.interest.matches(record.topic) {
                continue;
            }
            if route.queue.push(Arc::clone(record)) {
                debug!(
                    subscriber = *id,
                    topic = %record.topic,
                    overruns = route.queue.overruns(),
                    "subscriber overrun, oldest record dropped"
                );
            }
            delivered += 1;
        }
        delivered
    }

    /// Closes every queue and refuses new routes.
    pub(crate) fn close(&self) {
        let mut routes = self.lock_routes();
        self.closed.store(true, Ordering::Release);
        for (_, route) in routes.drain() {
            route.queue.close();
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.lock_routes().len()
    }
}

/// Receiving end of one router subscription.
///
/// Dropping it unsubscribes.
pub struct Subscription {
    id: SubscriberId,
    queue: Arc<DeliveryQueue>,
    router: Weak<Router>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Waits for the next record. Returns `None` once the hub closed this
    /// subscription and every pending record was taken.
    pub async fn recv(&self) -> Option<Arc<Record>> {
        self.queue.recv().await
    }

    /// Takes a pending record without waiting.
    pub fn try_recv(&self) -> Option<Arc<Record>> {
        self.queue.try_pop()
    }

    /// Records currently waiting in the queue.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    /// Records evicted because this subscriber fell behind.
    pub fn overruns(&self) -> u64 {
        self.queue.overruns()
    }

    pub fn is_closed(&self) -> bool {
        self.queue.is_closed()
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("pending", &self.pending())
            .field("overruns", &self.overruns())
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(router) = self.router.upgrade() {
            router.remove(self.id);
        }
    }
}
