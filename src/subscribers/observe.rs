//! # Lifecycle event observer.
//!
//! [`Observe`] is the extension point for reacting to supervisor events
//! (logging, alerting, exporting counters).
//!
//! Each observer gets its own bounded queue and worker task; a slow or
//! panicking observer affects nobody else. When its queue is full the event
//! is dropped for that observer only and `ObserverOverflow` is published.
//!
//! ```rust
//! use async_trait::async_trait;
//! use telehub::{Event, EventKind, Observe};
//!
//! struct FaultCounter(std::sync::atomic::AtomicU64);
//!
//! #[async_trait]
//! impl Observe for FaultCounter {
//!     async fn on_event(&self, ev: &Event) {
//!         if ev.kind == EventKind::WorkerFaulted {
//!             self.0.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
//!         }
//!     }
//!
//!     fn name(&self) -> &'static str { "fault-counter" }
//! }
//! ```

use async_trait::async_trait;

use crate::events::Event;

/// Event observer running in its own task.
#[async_trait]
pub trait Observe: Send + Sync + 'static {
    /// Handles one event; events arrive in FIFO order per observer.
    async fn on_event(&self, event: &Event);

    /// Short name used in overflow/panic events.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Queue capacity, clamped to at least 1.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
