//! # Observers of supervisor lifecycle events.
//!
//! ```text
//! actors / workers ── publish(Event) ──► Bus ──► supervisor listener
//!                                                   └─► ObserverSet::emit
//!                                                          ├─► LogWriter
//!                                                          └─► custom Observe impls
//! ```

mod log;
mod observe;
mod set;

pub use log::LogWriter;
pub use observe::Observe;
pub use set::ObserverSet;
