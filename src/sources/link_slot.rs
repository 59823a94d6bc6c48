use std::sync::Arc;
use std::time::Duration;

use crate::error::LinkError;
use crate::link::{Connector, DeviceLink, Discovery, LineProtocol};

/// Default bound for one command exchange.
pub(crate) const COMMAND_TIMEOUT: Duration = Duration::from_secs(3);

/// A discovered device link owned by one sampler.
pub(crate) struct LinkSlot {
    connector: Arc<dyn Connector>,
    discovery: Discovery,
    link: Option<DeviceLink>,
    timeout: Duration,
}

impl LinkSlot {
    pub(crate) fn new<I, S>(connector: Arc<dyn Connector>, candidates: I, protocol: LineProtocol) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            connector,
            discovery: Discovery::new(candidates, protocol),
            link: None,
            timeout: COMMAND_TIMEOUT,
        }
    }

    pub(crate) fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.link.as_ref().is_some_and(DeviceLink::is_usable)
    }

    /// Address of the current link, if connected.
    pub(crate) fn address(&self) -> Option<&str> {
        self.link
            .as_ref()
            .filter(|l| l.is_usable())
            .map(DeviceLink::address)
    }

    /// Rediscovers unless the current link is still usable.
    pub(crate) async fn connect(&mut self) -> Result<(), LinkError> {
        if self.is_connected() {
            return Ok(());
        }
        self.disconnect().await;
        let link = self.discovery.discover(self.connector.as_ref()).await?;
        self.link = Some(link);
        Ok(())
    }

    pub(crate) async fn send(&mut self, command: &str) -> Result<Vec<String>, LinkError> {
        let link = self.link.as_mut().ok_or(LinkError::Closed)?;
        link.send(command, self.timeout).await
    }

    /// Like [`send`](Self::send), but a rejected command yields `None`
    /// instead of an error.
    pub(crate) async fn send_optional(&mut self, command: &str) -> Result<Option<Vec<String>>, LinkError> {
        match self.send(command).await {
            Ok(lines) => Ok(Some(lines)),
            Err(LinkError::Rejected { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub(crate) async fn disconnect(&mut self) {
        if let Some(mut link) = self.link.take() {
            link.disconnect().await;
        }
    }
}

/// The text after `prefix` on the first line that starts with it.
pub(crate) fn reply_field<'a>(lines: &'a [String], prefix: &str) -> Option<&'a str> {
    lines
        .iter()
        .find_map(|l| l.strip_prefix(prefix))
        .map(str::trim)
}
