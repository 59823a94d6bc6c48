//! Error types used by the telehub runtime, its workers and device links.
//!
//! This module defines the error enums shared across the crate:
//!
//! - [`LinkError`]: failures of a line-oriented device link (open, timeout, rejection).
//! - [`SampleError`]: failures of one acquisition step inside a worker.
//! - [`WorkerError`]: terminal outcome of one worker attempt, seen by the supervisor.
//! - [`RuntimeError`]: errors raised by the supervisor's own operations.
//!
//! The gateway keeps its own error type next to the code that produces it
//! (see [`GatewayError`](crate::gateway::GatewayError)).
//!
//! Every enum provides `as_label` (stable snake_case, for logs) and the
//! worker-facing ones a few classification helpers such as
//! [`SampleError::is_link_failure`].
//!
//! Stale writes and subscriber overruns are **not** errors: the store reports
//! them through [`PublishOutcome`](crate::store::PublishOutcome) and per-subscription
//! counters.

use std::time::Duration;
use thiserror::Error;

use crate::store::Topic;

/// # Errors produced by a device link.
///
/// `Timeout` and `Io` leave the link unusable; `Rejected` is a well-formed
/// answer from a healthy device and keeps the link open.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum LinkError {
    /// The device at `address` could not be found or opened.
    #[error("device '{address}' unavailable: {reason}")]
    Unavailable {
        /// Device address (path, program name, sysfs directory).
        address: String,
        /// What went wrong while opening.
        reason: String,
    },

    /// No terminal marker arrived before the per-call deadline.
    #[error("no response to '{command}' within {after:?}")]
    Timeout {
        /// The command that was sent.
        command: String,
        /// The deadline that elapsed.
        after: Duration,
    },

    /// The device answered with an error marker.
    #[error("device rejected '{command}': {reply:?}")]
    Rejected {
        /// The command that was sent.
        command: String,
        /// Lines collected before (and including) the error marker.
        reply: Vec<String>,
    },

    /// The link was already released or degraded by an earlier failure.
    #[error("link is closed")]
    Closed,

    /// Underlying stream failure.
    #[error("link i/o: {0}")]
    Io(#[from] std::io::Error),
}

impl LinkError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            LinkError::Unavailable { .. } => "link_unavailable",
            LinkError::Timeout { .. } => "link_timeout",
            LinkError::Rejected { .. } => "link_rejected",
            LinkError::Closed => "link_closed",
            LinkError::Io(_) => "link_io",
        }
    }

    /// True if the link that produced this error can no longer be trusted.
    pub fn degrades_link(&self) -> bool {
        !matches!(self, LinkError::Rejected { .. })
    }
}

/// # Errors produced by one acquisition step.
///
/// A sampler returns these from `connect`, `sample` and `apply`. The sampling
/// loop counts every error except [`SampleError::Unsupported`] toward the
/// worker's failure threshold.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum SampleError {
    /// Device link failure.
    #[error(transparent)]
    Link(#[from] LinkError),

    /// Malformed or unexpected payload from otherwise healthy hardware.
    #[error("decode: {0}")]
    Decode(String),

    /// The worker does not understand the requested command.
    #[error("unsupported command: {0}")]
    Unsupported(String),
}

impl SampleError {
    /// Shorthand for a [`SampleError::Decode`].
    pub fn decode(msg: impl Into<String>) -> Self {
        SampleError::Decode(msg.into())
    }

    /// True if the worker should drop its cached link and rediscover.
    pub fn is_link_failure(&self) -> bool {
        match self {
            SampleError::Link(e) => e.degrades_link(),
            _ => false,
        }
    }

    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            SampleError::Link(e) => e.as_label(),
            SampleError::Decode(_) => "decode_error",
            SampleError::Unsupported(_) => "unsupported_command",
        }
    }
}

/// # Terminal outcome of one worker attempt.
///
/// Seen by the supervisor when a worker's `run` returns or unwinds.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum WorkerError {
    /// Too many consecutive acquisition failures.
    #[error("worker fault after {failures} consecutive failures: {error}")]
    Fault {
        /// The last acquisition error.
        error: String,
        /// How many failures in a row crossed the threshold.
        failures: u32,
    },

    /// The worker's loop panicked; caught at the supervisor boundary.
    #[error("worker panicked: {info}")]
    Panicked {
        /// Panic payload rendered as text.
        info: String,
    },

    /// The worker returned on its own without being asked to stop.
    #[error("worker exited unexpectedly")]
    Exited,

    /// The worker observed cancellation.
    #[error("context cancelled")]
    Canceled,
}

impl WorkerError {
    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use telehub::WorkerError;
    ///
    /// let err = WorkerError::Fault { error: "link timeout".into(), failures: 3 };
    /// assert_eq!(err.as_label(), "worker_fault");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            WorkerError::Fault { .. } => "worker_fault",
            WorkerError::Panicked { .. } => "worker_panicked",
            WorkerError::Exited => "worker_exited",
            WorkerError::Canceled => "worker_canceled",
        }
    }

    /// True for outcomes the supervisor restarts with backoff.
    pub fn is_fault(&self) -> bool {
        !matches!(self, WorkerError::Canceled)
    }
}

/// # Errors produced by supervisor operations.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// A worker for this topic already exists.
    #[error("worker for topic '{topic}' is already registered")]
    AlreadyRegistered {
        /// The duplicated topic.
        topic: Topic,
    },

    /// No worker is registered under this topic.
    #[error("no worker registered for topic '{topic}'")]
    UnknownTopic {
        /// The requested topic.
        topic: Topic,
    },

    /// The worker's command queue is full or gone.
    #[error("worker '{topic}' did not accept the command: {reason}")]
    CommandRejected {
        /// Target topic.
        topic: Topic,
        /// "queue_full" or "queue_closed".
        reason: &'static str,
    },

    /// Some workers did not stop within the grace period and were aborted.
    #[error("shutdown timeout {grace:?} exceeded; aborted: {stuck:?}")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Topics whose workers had to be aborted.
        stuck: Vec<Topic>,
    },
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use telehub::{RuntimeError, Topic};
    ///
    /// let err = RuntimeError::UnknownTopic { topic: Topic::Obd };
    /// assert_eq!(err.as_label(), "runtime_unknown_topic");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::AlreadyRegistered { .. } => "runtime_already_registered",
            RuntimeError::UnknownTopic { .. } => "runtime_unknown_topic",
            RuntimeError::CommandRejected { .. } => "runtime_command_rejected",
            RuntimeError::GraceExceeded { .. } => "runtime_grace_exceeded",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_keeps_link_usable() {
        let rejected = SampleError::Link(LinkError::Rejected {
            command: "AT+CPSI?".into(),
            reply: vec!["ERROR".into()],
        });
        assert!(!rejected.is_link_failure());

        let timeout = SampleError::Link(LinkError::Timeout {
            command: "AT".into(),
            after: Duration::from_secs(1),
        });
        assert!(timeout.is_link_failure());
        assert!(!SampleError::decode("bad field").is_link_failure());
    }

    #[test]
    fn labels_are_stable() {
        assert_eq!(LinkError::Closed.as_label(), "link_closed");
        assert_eq!(SampleError::decode("x").as_label(), "decode_error");
        assert_eq!(
            SampleError::from(LinkError::Closed).as_label(),
            "link_closed"
        );
        assert!(!WorkerError::Canceled.is_fault());
        assert!(WorkerError::Exited.is_fault());
    }
}
