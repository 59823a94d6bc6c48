//! Acquisition workers.
//!
//! - [`Worker`] / [`WorkerRef`]: what the supervisor runs, one per topic
//! - [`WorkerContext`]: cancellation, store access, event reporting, command queue
//! - [`Sampler`] + [`SamplingWorker`]: the shared sampling loop around device-specific code
//! - [`WorkerFn`]: closure-backed worker
//! - [`WorkerCommand`]: external instructions a worker applies between samples

mod command;
mod sampling;
mod worker;
mod worker_fn;

pub use command::WorkerCommand;
pub use sampling::{Sampler, SamplingWorker};
pub use worker::{Worker, WorkerContext, WorkerRef};
pub use worker_fn::WorkerFn;
