//! Lifecycle events: types and broadcast bus.
//!
//! - [`EventKind`], [`Event`]: classification and metadata
//! - [`Bus`]: thin wrapper over `tokio::sync::broadcast`
//!
//! Publishers are sampling workers (connecting/running/degraded), worker
//! actors (starting/faulted/backoff/stopped), the supervisor (registration,
//! shutdown) and observer workers (overflow/panic). The supervisor's listener
//! is the only consumer and fans out to observers. The status table is
//! updated by the emitters themselves.
//!
//! Records never travel over this bus; they go through the
//! [`StateStore`](crate::store::StateStore).

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
