//! # telehub
//!
//! **telehub** supervises the telemetry acquisition workers of an embedded
//! vehicle gateway and fans their output out to live viewers.
//!
//! Every hardware source (GPS, cellular modem, OBD-II, UPS, network, short
//! range radio, host health) gets one autonomous worker. Workers publish typed records
//! into a latest-value store; the store's router pushes every accepted
//! record to subscribers, and the gateway turns each subscription into one
//! viewer connection.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   ┌────────────┐  ┌────────────┐  ┌────────────┐
//!   │ GpsSampler │  │ModemSampler│  │ ObdSampler │   ... one per source
//!   └─────┬──────┘  └─────┬──────┘  └─────┬──────┘
//!         │ DeviceLink    │ DeviceLink    │ DeviceLink (discovery, timeouts)
//!         ▼               ▼               ▼
//!   ┌────────────────────────────────────────────────┐
//!   │ SamplingWorker (one task each, own link)       │
//!   │  connect → sample → publish → sleep            │
//!   └──┬───────────────────────────────┬─────────────┘
//!      │ Record                        │ Event
//!      ▼                               ▼
//! ┌──────────────────────┐   ┌──────────────────────────────────────┐
//! │ StateStore           │   │ Supervisor                           │
//! │  latest[topic]       │   │  Registry (actor task per worker)    │
//! │  Router (drop-oldest)│   │  StatusTracker (applied on emit)     │
//! └──────────┬───────────┘   │  Bus ──► listener ──► ObserverSet    │
//!            │               │  restart with backoff on fault       │
//!            ▼               └──────────────────────────────────────┘
//! ┌──────────────────────┐
//! │ Gateway              │
//! │  one Subscription    │──► viewer (websocket, JSON envelope)
//! │  per connection      │
//! └──────────────────────┘
//! ```
//!
//! ### Worker lifecycle
//! ```text
//! register ──► Idle ──start──► Connecting ──sample ok──► Running
//!                                  ▲                       │ sample error
//!                                  │                       ▼
//!                           backoff elapsed            Degraded ── threshold ──► Faulted
//!                                  └───────────────────────────────────────────────┘
//! stop / stop_all ──► Stopped   (device link released)
//! ```
//!
//! ## Features
//! | Area            | Description                                             | Key types / traits                          |
//! |-----------------|---------------------------------------------------------|---------------------------------------------|
//! | **Hub**         | Explicit construct → start_all → stop_all owner.        | [`Hub`], [`HubConfig`]                      |
//! | **Workers**     | Sampling loop around device-specific samplers.          | [`Worker`], [`Sampler`], [`SamplingWorker`] |
//! | **Device link** | Timeout-bounded line protocol engine with discovery.    | [`DeviceLink`], [`Discovery`], [`LineProtocol`] |
//! | **Supervision** | Restarts with backoff, fault isolation, status table.   | [`Supervisor`], [`WorkerState`]             |
//! | **Store**       | Latest value per topic, non-blocking fan-out.           | [`StateStore`], [`Subscription`]            |
//! | **Gateway**     | Viewer connections with replay and write deadlines.     | [`Gateway`], [`ViewerTransport`]            |
//! | **Observers**   | Hook into lifecycle events.                             | [`Observe`], [`LogWriter`]                  |
//! | **Errors**      | Typed errors with stable labels.                        | [`LinkError`], [`SampleError`], [`RuntimeError`] |
//!
//! ## Optional features
//! - `serial` (default): [`SerialConnector`] for real serial ports.
//! - `ws` (default): websocket viewers and an `axum` router.
//! - `cli` (default): dependencies of the `telehubd` binary.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use telehub::{Hub, HubConfig, LogWriter, Observe, SamplingConfig, Topic, UpsSampler};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let observers: Vec<Arc<dyn Observe>> = vec![Arc::new(LogWriter::default())];
//!     let hub = Hub::with_observers(HubConfig::default(), observers);
//!
//!     hub.register_sampler(
//!         UpsSampler::new("/sys/class/power_supply/BAT0"),
//!         SamplingConfig::every(Duration::from_secs(5)),
//!     )?;
//!     hub.start_all();
//!
//!     for state in hub.status() {
//!         println!("{}: {:?}", state.topic, state.status);
//!     }
//!     let _latest = hub.read_latest(Topic::Ups);
//!
//!     hub.stop_all().await?;
//!     Ok(())
//! }
//! ```

mod config;
mod core;
mod error;
mod events;
mod gateway;
mod hub;
mod link;
mod policies;
mod sources;
mod store;
mod subscribers;
mod workers;

// ---- Public re-exports ----

pub use config::{GatewayConfig, HubConfig, RouterConfig, SamplingConfig, SupervisorConfig};
pub use crate::core::{Supervisor, SupervisorBuilder, WorkerState, WorkerStatus, wait_for_shutdown_signal};
pub use error::{LinkError, RuntimeError, SampleError, WorkerError};
pub use events::{Event, EventKind};
pub use gateway::{Disconnect, Envelope, Gateway, GatewayError, ViewerTransport};
pub use hub::Hub;
pub use link::{Connector, DeviceLink, Discovery, LineProtocol, LinkStream};
pub use policies::{BackoffPolicy, JitterPolicy};
pub use sources::{
    BluetoothSampler, CommandRunner, GpsSampler, ModemSampler, NetworkSampler, ObdSampler,
    SystemRunner, SystemSampler, UpsSampler,
};
pub use store::{
    ActiveInterface, BluetoothStatus, GpsFix, Interest, ModemStatus, NetworkStatus, ObdSnapshot,
    ParseTopicError, Payload, PublishOutcome, Record, Registration, SpaceUsage, SpeedUnit,
    StateStore, SubscriberId, Subscription, SystemStatus, Topic, UpsStatus,
};
pub use subscribers::{LogWriter, Observe};
pub use workers::{Sampler, SamplingWorker, Worker, WorkerCommand, WorkerContext, WorkerFn, WorkerRef};

// Serial-port connector for real hardware.
// Enable with: `--features serial`
#[cfg(feature = "serial")]
pub use link::SerialConnector;

// WebSocket viewer transport and `GET /ws` route.
// Enable with: `--features ws`
#[cfg(feature = "ws")]
pub use gateway::{WsViewer, router};
