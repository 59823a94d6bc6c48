//! # Closure-backed worker.
//!
//! [`WorkerFn`] wraps `F: Fn(WorkerContext) -> Fut` and creates a fresh
//! future per attempt, so nothing leaks between restarts unless the closure
//! captures it explicitly (e.g. an `Arc<AtomicU64>`).
//!
//! ```rust
//! use telehub::{Topic, WorkerContext, WorkerError, WorkerFn, WorkerRef};
//!
//! let w: WorkerRef = WorkerFn::arc(Topic::Network, |ctx: WorkerContext| async move {
//!     ctx.token.cancelled().await;
//!     Ok::<_, WorkerError>(())
//! });
//! assert_eq!(w.topic(), Topic::Network);
//! ```

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::WorkerError;
use crate::store::Topic;
use crate::workers::{Worker, WorkerContext};

/// Function-backed worker.
pub struct WorkerFn<F> {
    topic: Topic,
    f: F,
}

impl<F> WorkerFn<F> {
    pub fn new(topic: Topic, f: F) -> Self {
        Self { topic, f }
    }

    /// Creates the worker behind an `Arc`, ready for registration.
    pub fn arc(topic: Topic, f: F) -> Arc<Self> {
        Arc::new(Self::new(topic, f))
    }
}

#[async_trait]
impl<F, Fut> Worker for WorkerFn<F>
where
    F: Fn(WorkerContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), WorkerError>> + Send + 'static,
{
    fn topic(&self) -> Topic {
        self.topic
    }

    async fn run(&self, ctx: WorkerContext) -> Result<(), WorkerError> {
        (self.f)(ctx).await
    }
}
