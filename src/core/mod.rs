//! Runtime core: worker supervision and lifecycle.
//!
//! - [`runner`]: one attempt behind a panic boundary;
//! - [`actor`]: restart loop with backoff for one worker;
//! - [`registry`]: per-topic slots and actor handles;
//! - [`status`]: status table, written by actors and workers;
//! - [`supervisor`]: public API, stop/grace handling;
//! - [`builder`]: wiring of bus, listener and observers;
//! - [`shutdown`]: OS termination signals.

mod actor;
mod builder;
mod registry;
mod runner;
mod shutdown;
mod status;
mod supervisor;

pub(crate) use runner::panic_message;
pub(crate) use status::StatusTracker;

pub use builder::SupervisorBuilder;
pub use shutdown::wait_for_shutdown_signal;
pub use status::{WorkerState, WorkerStatus};
pub use supervisor::Supervisor;
