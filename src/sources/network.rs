//! Host interface state from `/sys/class/net/<iface>/operstate`.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::SampleError;
use crate::store::{ActiveInterface, NetworkStatus, Payload, Topic};
use crate::workers::Sampler;

const SYS_CLASS_NET: &str = "/sys/class/net";

/// Reports which interface carries traffic: ethernet first, then wifi.
///
/// An interface that does not exist counts as down.
pub struct NetworkSampler {
    root: PathBuf,
    ethernet: String,
    wifi: String,
}

impl NetworkSampler {
    pub fn new(ethernet: impl Into<String>, wifi: impl Into<String>) -> Self {
        Self {
            root: PathBuf::from(SYS_CLASS_NET),
            ethernet: ethernet.into(),
            wifi: wifi.into(),
        }
    }

    /// Reads interfaces under `root` instead of `/sys/class/net`.
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    async fn is_up(&self, iface: &str) -> bool {
        tokio::fs::read_to_string(self.root.join(iface).join("operstate"))
            .await
            .is_ok_and(|s| s.trim() == "up")
    }
}

#[async_trait]
impl Sampler for NetworkSampler {
    fn topic(&self) -> Topic {
        Topic::Network
    }

    async fn sample(&mut self) -> Result<Payload, SampleError> {
        let ethernet_up = self.is_up(&self.ethernet).await;
        let wifi_up = self.is_up(&self.wifi).await;
        let active = if ethernet_up {
            ActiveInterface::Ethernet
        } else if wifi_up {
            ActiveInterface::Wifi
        } else {
            ActiveInterface::None
        };
        Ok(Payload::Network(NetworkStatus {
            active,
            ethernet_up,
            wifi_up,
        }))
    }
}
