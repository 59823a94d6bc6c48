//! # Device link: line-oriented command/response over a byte stream.
//!
//! Used by every worker whose hardware speaks a textual protocol (AT
//! modems, GNSS modules, ELM327 OBD adapters).
//!
//! ## Contents
//! - [`Connector`] opens a byte stream by address ([`SerialConnector`] for real ports)
//! - [`LineProtocol`] framing rules, with [`LineProtocol::AT`] and [`LineProtocol::ELM327`]
//! - [`DeviceLink`] connect / probe / send / disconnect, every call deadline-bounded
//! - [`Discovery`] bounded, cache-first scan over candidate addresses
//!
//! ## Failure model
//! ```text
//! Unavailable  open failed                 (discovery moves to the next candidate)
//! Timeout/Io   link degraded and released  (worker drops it, rediscovers next time)
//! Rejected     device said ERROR           (link stays usable)
//! Closed       link already released
//! ```

mod connector;
mod device;
mod discovery;
mod protocol;

#[cfg(test)]
pub(crate) mod testing;

#[cfg(feature = "serial")]
pub use connector::SerialConnector;
pub use connector::{Connector, LinkStream};
pub use device::DeviceLink;
pub use discovery::Discovery;
pub use protocol::LineProtocol;
