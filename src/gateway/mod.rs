//! # Fan-out gateway: viewer connections ⇄ router subscriptions.
//!
//! One [`Gateway::on_client_connect`] call per viewer connection. Each call
//! owns its transport and its [`Subscription`](crate::Subscription); a slow or
//! broken viewer only ever tears down its own connection.
//!
//! ## Connection flow
//! ```text
//! on_client_connect(transport)
//!   ├─► store.subscribe(All)                        (before the snapshot: no gap)
//!   ├─► replay snapshot()       ──► transport.send(Envelope)   one per topic
//!   └─► loop select!
//!         ├─ shutdown token          → Disconnect::Shutdown
//!         ├─ transport.closed()      → Disconnect::ViewerClosed
//!         └─ subscription.recv()
//!               ├─ None              → Disconnect::HubClosed
//!               ├─ seq <= replayed   → skip
//!               └─ send within write_timeout
//!                     └─ error/timeout → Disconnect::WriteFailed
//!   ├─► store.unsubscribe(subscription)
//!   └─► transport.close()
//! ```
//!
//! The subscription is also released by `Drop`, so a panic or a dropped
//! connection future cannot leak it.

mod error;
#[cfg(feature = "ws")]
mod ws;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::GatewayConfig;
use crate::store::{Interest, Payload, Record, StateStore, Subscription, Topic};

pub use error::GatewayError;
#[cfg(feature = "ws")]
pub use ws::{WsViewer, router};

/// Message sent to viewers for every record.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Envelope<'a> {
    pub topic: Topic,
    pub payload: &'a Payload,
    /// Unix epoch milliseconds.
    pub captured_at: i64,
    pub sequence: u64,
}

impl<'a> From<&'a Record> for Envelope<'a> {
    fn from(rec: &'a Record) -> Self {
        Self {
            topic: rec.topic,
            payload: &rec.payload,
            captured_at: rec.captured_at,
            sequence: rec.sequence,
        }
    }
}

impl Envelope<'_> {
    /// One JSON object per message.
    pub fn to_json(&self) -> Result<String, GatewayError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Push transport to one viewer.
///
/// `closed` must be cancel-safe: the gateway races it against incoming
/// records and calls it again on the next iteration.
#[async_trait]
pub trait ViewerTransport: Send {
    async fn send(&mut self, envelope: &Envelope<'_>) -> Result<(), GatewayError>;

    /// Completes when the viewer hangs up.
    async fn closed(&mut self);

    /// Releases the transport; called once, after unsubscribing.
    async fn close(&mut self) {}
}

/// Why a viewer connection ended.
#[derive(Debug)]
pub enum Disconnect {
    ViewerClosed,
    WriteFailed(GatewayError),
    /// The store was closed (hub shutdown) and the queue drained.
    HubClosed,
    /// [`Gateway::shutdown`] was called.
    Shutdown,
}

/// Bridges viewer transports to the state store's router.
#[derive(Clone)]
pub struct Gateway {
    store: Arc<StateStore>,
    cfg: GatewayConfig,
    token: CancellationToken,
}

impl Gateway {
    pub fn new(store: Arc<StateStore>, cfg: GatewayConfig) -> Self {
        Self {
            store,
            cfg,
            token: CancellationToken::new(),
        }
    }

    /// Ends every connection served by this gateway (and its clones).
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Serves one viewer until it disconnects, fails or the gateway shuts down.
    pub async fn on_client_connect<T: ViewerTransport>(&self, mut transport: T) -> Disconnect {
        let subscription = self.store.subscribe(Interest::All);
        let id = subscription.id();
        debug!(subscriber = id, "viewer connected");

        let reason = self.pump(&subscription, &mut transport).await;

        let overruns = subscription.overruns();
        self.store.unsubscribe(subscription);
        transport.close().await;

        match &reason {
            Disconnect::WriteFailed(e) => {
                info!(subscriber = id, overruns, error = %e, label = e.as_label(), "viewer dropped")
            }
            other => debug!(subscriber = id, overruns, reason = ?other, "viewer disconnected"),
        }
        reason
    }

    async fn pump<T: ViewerTransport>(&self, sub: &Subscription, transport: &mut T) -> Disconnect {
        let mut replayed: HashMap<Topic, u64> = HashMap::new();
        for rec in self.store.snapshot() {
            if let Err(e) = self.write(transport, &rec).await {
                return Disconnect::WriteFailed(e);
            }
            replayed.insert(rec.topic, rec.sequence);
        }

        loop {
            let rec = tokio::select! {
                biased;
                _ = self.token.cancelled() => return Disconnect::Shutdown,
                _ = transport.closed() => return Disconnect::ViewerClosed,
                rec = sub.recv() => match rec {
                    Some(rec) => rec,
                    None => return Disconnect::HubClosed,
                },
            };
            if replayed
                .get(&rec.topic)
                .is_some_and(|&seq| rec.sequence <= seq)
            {
                continue;
            }
            if let Err(e) = self.write(transport, &rec).await {
                return Disconnect::WriteFailed(e);
            }
        }
    }

    async fn write<T: ViewerTransport>(
        &self,
        transport: &mut T,
        rec: &Record,
    ) -> Result<(), GatewayError> {
        let envelope = Envelope::from(rec);
        match time::timeout(self.cfg.write_timeout, transport.send(&envelope)).await {
            Ok(res) => res,
            Err(_) => Err(GatewayError::WriteTimeout(self.cfg.write_timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::mpsc;

    use super::*;
    use crate::config::RouterConfig;
    use crate::store::{ActiveInterface, NetworkStatus, UpsStatus};

    struct TestViewer {
        out: mpsc::UnboundedSender<(Topic, u64)>,
        hangup: mpsc::Receiver<()>,
        stall: bool,
    }

    #[async_trait]
    impl ViewerTransport for TestViewer {
        async fn send(&mut self, env: &Envelope<'_>) -> Result<(), GatewayError> {
            if self.stall {
                std::future::pending::<()>().await;
            }
            self.out
                .send((env.topic, env.sequence))
                .map_err(|e| GatewayError::Transport(e.to_string()))
        }

        async fn closed(&mut self) {
            self.hangup.recv().await;
        }
    }

    fn viewer(stall: bool) -> (TestViewer, mpsc::UnboundedReceiver<(Topic, u64)>, mpsc::Sender<()>) {
        let (out, rx) = mpsc::unbounded_channel();
        let (hang_tx, hangup) = mpsc::channel(1);
        (TestViewer { out, hangup, stall }, rx, hang_tx)
    }

    fn network(seq: u64) -> Record {
        Record::at(
            Payload::Network(NetworkStatus {
                active: ActiveInterface::Ethernet,
                ethernet_up: true,
                wifi_up: false,
            }),
            seq,
            1_700_000_000_000,
        )
    }

    fn ups(seq: u64) -> Record {
        Record::at(
            Payload::Ups(UpsStatus {
                percent: 80,
                voltage: Some(4.05),
                charging: false,
                on_battery: true,
                state: "Discharging".into(),
            }),
            seq,
            1_700_000_000_000,
        )
    }

    fn gateway(store: &Arc<StateStore>) -> Gateway {
        Gateway::new(Arc::clone(store), GatewayConfig::default())
    }

    #[tokio::test]
    async fn replays_snapshot_then_streams_live_records() {
        let store = Arc::new(StateStore::default());
        store.publish(network(1));
        let gw = gateway(&store);
        let (v, mut rx, hangup) = viewer(false);

        let conn = tokio::spawn({
            let gw = gw.clone();
            async move { gw.on_client_connect(v).await }
        });

        assert_eq!(rx.recv().await, Some((Topic::Network, 1)));
        store.publish(network(2));
        store.publish(ups(1));
        assert_eq!(rx.recv().await, Some((Topic::Network, 2)));
        assert_eq!(rx.recv().await, Some((Topic::Ups, 1)));

        hangup.send(()).await.unwrap();
        assert!(matches!(conn.await.unwrap(), Disconnect::ViewerClosed));
        assert_eq!(store.subscriber_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_viewer_is_dropped_without_blocking_publishers() {
        let store = Arc::new(StateStore::new(RouterConfig {
            subscriber_capacity: 4,
        }));
        let gw = gateway(&store);
        let (slow, _slow_rx, _slow_hangup) = viewer(true);
        let (fast, mut fast_rx, _fast_hangup) = viewer(false);

        let slow_conn = tokio::spawn({
            let gw = gw.clone();
            async move { gw.on_client_connect(slow).await }
        });
        let fast_conn = tokio::spawn({
            let gw = gw.clone();
            async move { gw.on_client_connect(fast).await }
        });
        while store.subscriber_count() < 2 {
            tokio::task::yield_now().await;
        }

        for seq in 1..=20 {
            assert!(store.publish(network(seq)).is_accepted());
        }
        for seq in 1..=20 {
            assert_eq!(fast_rx.recv().await, Some((Topic::Network, seq)));
        }

        let reason = slow_conn.await.unwrap();
        assert!(matches!(
            reason,
            Disconnect::WriteFailed(GatewayError::WriteTimeout(d)) if d == Duration::from_secs(5)
        ));
        assert_eq!(store.subscriber_count(), 1);

        gw.shutdown();
        assert!(matches!(fast_conn.await.unwrap(), Disconnect::Shutdown));
        assert_eq!(store.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn closing_the_store_ends_connections() {
        let store = Arc::new(StateStore::default());
        let gw = gateway(&store);
        let (v, _rx, _hangup) = viewer(false);
        let conn = tokio::spawn(async move { gw.on_client_connect(v).await });
        while store.subscriber_count() < 1 {
            tokio::task::yield_now().await;
        }

        store.close();
        assert!(matches!(conn.await.unwrap(), Disconnect::HubClosed));
    }

    #[test]
    fn envelope_carries_every_field() {
        let rec = ups(7);
        let json: serde_json::Value =
            serde_json::from_str(&Envelope::from(&rec).to_json().unwrap()).unwrap();
        assert_eq!(json["topic"], "ups");
        assert_eq!(json["sequence"], 7);
        assert_eq!(json["captured_at"], 1_700_000_000_000_i64);
        assert_eq!(json["payload"]["percent"], 80);
    }
}
