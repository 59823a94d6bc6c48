//! # Cache-first device discovery.
//!
//! A worker knows a short, bounded list of addresses where its device may
//! appear (USB serial numbering shifts across reboots). [`Discovery`] finds
//! the one that answers and remembers it:
//!
//! ```text
//! discover()
//!   ├─ adopted? ──► connect + probe ──► ok: return link (no scan)
//!   │                                 └► fail: forget, fall through
//!   └─ for addr in candidates (skipping the one just tried):
//!          connect + probe ──► first success is adopted and returned
//!   none answered ──► LinkError::Unavailable
//! ```
//!
//! Discovery only runs when the worker has no usable link, so a healthy
//! device costs nothing per sample.

use tracing::{debug, info};

use super::connector::Connector;
use super::device::DeviceLink;
use super::protocol::LineProtocol;
use crate::error::LinkError;

/// Bounded candidate scan with a cached winner.
#[derive(Debug, Clone)]
pub struct Discovery {
    candidates: Vec<String>,
    adopted: Option<String>,
    protocol: LineProtocol,
}

impl Discovery {
    pub fn new(candidates: impl IntoIterator<Item = impl Into<String>>, protocol: LineProtocol) -> Self {
        Self {
            candidates: candidates.into_iter().map(Into::into).collect(),
            adopted: None,
            protocol,
        }
    }

    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    /// Address that answered last time, if any.
    pub fn adopted(&self) -> Option<&str> {
        self.adopted.as_deref()
    }

    /// Drops the cached address; the next discovery scans from the start.
    pub fn forget(&mut self) {
        self.adopted = None;
    }

    /// Returns an open, probed link.
    pub async fn discover(&mut self, connector: &dyn Connector) -> Result<DeviceLink, LinkError> {
        let cached = self.adopted.take();
        if let Some(addr) = &cached {
            if let Some(link) = try_candidate(connector, addr, self.protocol).await {
                self.adopted = cached;
                return Ok(link);
            }
            debug!(address = %addr, "adopted device no longer answers, rescanning");
        }

        for addr in &self.candidates {
            if cached.as_deref() == Some(addr.as_str()) {
                continue;
            }
            if let Some(link) = try_candidate(connector, addr, self.protocol).await {
                info!(address = %addr, "device adopted");
                self.adopted = Some(addr.clone());
                return Ok(link);
            }
        }

        Err(LinkError::Unavailable {
            address: self.candidates.join(","),
            reason: if self.candidates.is_empty() {
                "no candidate addresses".into()
            } else {
                "no candidate answered the probe".into()
            },
        })
    }
}

async fn try_candidate(
    connector: &dyn Connector,
    address: &str,
    protocol: LineProtocol,
) -> Option<DeviceLink> {
    let mut link = match DeviceLink::connect(connector, address, protocol).await {
        Ok(link) => link,
        Err(e) => {
            debug!(address, error = %e, "candidate not opened");
            return None;
        }
    };
    if link.probe().await {
        Some(link)
    } else {
        link.disconnect().await;
        None
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::link::testing::{ScriptedConnector, at_modem};

    fn ports(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("/dev/ttyUSB{i}")).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn adopts_first_answering_candidate() {
        let connector = ScriptedConnector::new()
            .silent("/dev/ttyUSB0")
            .silent("/dev/ttyUSB1")
            .silent("/dev/ttyUSB3")
            .device("/dev/ttyUSB4", at_modem);
        let mut discovery = Discovery::new(ports(6), LineProtocol::AT);

        let mut link = discovery.discover(&connector).await.unwrap();
        assert_eq!(link.address(), "/dev/ttyUSB4");
        assert_eq!(discovery.adopted(), Some("/dev/ttyUSB4"));
        assert_eq!(
            connector.opened(),
            vec!["/dev/ttyUSB0", "/dev/ttyUSB1", "/dev/ttyUSB3", "/dev/ttyUSB4"]
        );

        let lines = link.send("AT+CSQ", Duration::from_secs(1)).await.unwrap();
        assert_eq!(lines, vec!["+CSQ: 20,99"]);
        assert_eq!(connector.opened().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn cached_address_skips_rescan() {
        let connector = ScriptedConnector::new()
            .silent("/dev/ttyUSB0")
            .device("/dev/ttyUSB2", at_modem);
        let mut discovery = Discovery::new(ports(3), LineProtocol::AT);

        let mut first = discovery.discover(&connector).await.unwrap();
        first.disconnect().await;
        let before = connector.opened().len();

        let second = discovery.discover(&connector).await.unwrap();
        assert_eq!(second.address(), "/dev/ttyUSB2");
        assert_eq!(connector.opened()[before..].to_vec(), vec!["/dev/ttyUSB2".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn lost_device_triggers_full_rescan() {
        let connector = ScriptedConnector::new()
            .device("/dev/ttyUSB1", at_modem)
            .device("/dev/ttyUSB2", at_modem);
        let mut discovery = Discovery::new(ports(3), LineProtocol::AT);
        discovery.discover(&connector).await.unwrap();
        assert_eq!(discovery.adopted(), Some("/dev/ttyUSB1"));

        connector.unplug("/dev/ttyUSB1");
        let link = discovery.discover(&connector).await.unwrap();
        assert_eq!(link.address(), "/dev/ttyUSB2");
        assert_eq!(discovery.adopted(), Some("/dev/ttyUSB2"));
    }

    #[tokio::test]
    async fn empty_or_dead_candidates_are_unavailable() {
        let connector = ScriptedConnector::new();
        let mut none = Discovery::new(Vec::<String>::new(), LineProtocol::AT);
        assert!(matches!(
            none.discover(&connector).await,
            Err(LinkError::Unavailable { .. })
        ));

        let mut missing = Discovery::new(ports(2), LineProtocol::AT);
        assert!(matches!(
            missing.discover(&connector).await,
            Err(LinkError::Unavailable { .. })
        ));
        assert!(missing.adopted().is_none());
    }
}
