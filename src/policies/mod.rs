//! Restart policies for faulted workers.
//!
//! - [`BackoffPolicy`] computes the delay before a worker is restarted
//!   from its current fault streak.
//! - [`JitterPolicy`] randomizes that delay.

mod backoff;
mod jitter;

pub use backoff::BackoffPolicy;
pub use jitter::JitterPolicy;
