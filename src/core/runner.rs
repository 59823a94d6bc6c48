//! # One worker attempt behind a panic boundary.
//!
//! [`run_once`] is the isolation point between the supervisor and a
//! worker's loop:
//!
//! ```text
//! worker.run(ctx) ──► Ok(())                 ──► Ok(())
//!                 ├─► Err(e)                 ──► Err(e)
//!                 └─► panic (caught here)    ──► publish WorkerPanicked
//!                                                Err(WorkerError::Panicked)
//! ```
//!
//! The attempt receives a child of the worker's token, so cancelling the
//! attempt never cancels the worker's slot.

use std::any::Any;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::error;

use crate::error::WorkerError;
use crate::events::{Bus, Event, EventKind};
use crate::workers::{Worker, WorkerContext};

/// Runs a single attempt; panics become [`WorkerError::Panicked`].
pub(crate) async fn run_once(
    worker: &dyn Worker,
    parent: &CancellationToken,
    make_ctx: impl FnOnce(CancellationToken) -> WorkerContext,
    bus: &Bus,
) -> Result<(), WorkerError> {
    let child = parent.child_token();
    let ctx = make_ctx(child.clone());

    let res = match AssertUnwindSafe(worker.run(ctx)).catch_unwind().await {
        Ok(res) => res,
        Err(panic) => {
            let info = panic_message(panic.as_ref());
            error!(topic = %worker.topic(), panic = %info, "worker panicked");
            bus.publish(
                Event::new(EventKind::WorkerPanicked)
                    .with_topic(worker.topic())
                    .with_reason(info.clone()),
            );
            Err(WorkerError::Panicked { info })
        }
    };
    child.cancel();
    res
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
