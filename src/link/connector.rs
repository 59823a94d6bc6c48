//! # Byte-stream connectors.
//!
//! A [`Connector`] turns an address into an open byte stream. The device
//! link only needs `AsyncRead + AsyncWrite`; serial ports, pseudo-terminals
//! and in-memory pipes all qualify.

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::LinkError;

/// Any bidirectional async byte stream a link can own.
pub trait LinkStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T> LinkStream for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

/// Opens byte streams by address.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Opens `address`. Does not check what kind of device answers there.
    async fn open(&self, address: &str) -> Result<Box<dyn LinkStream>, LinkError>;
}

#[cfg(feature = "serial")]
pub use serial::SerialConnector;

#[cfg(feature = "serial")]
mod serial {
    use async_trait::async_trait;
    use tokio_serial::{DataBits, FlowControl, Parity, SerialPortBuilderExt, StopBits};
    use tracing::debug;

    use super::{Connector, LinkStream};
    use crate::error::LinkError;

    /// Opens serial devices (8N1, no flow control) at a fixed baud rate.
    #[derive(Debug, Clone)]
    pub struct SerialConnector {
        baud_rate: u32,
    }

    impl SerialConnector {
        pub fn new(baud_rate: u32) -> Self {
            Self { baud_rate }
        }
    }

    impl Default for SerialConnector {
        fn default() -> Self {
            Self::new(115_200)
        }
    }

    #[async_trait]
    impl Connector for SerialConnector {
        async fn open(&self, address: &str) -> Result<Box<dyn LinkStream>, LinkError> {
            let unavailable = |reason: String| LinkError::Unavailable {
                address: address.to_string(),
                reason,
            };

            if !tokio::fs::try_exists(address).await.unwrap_or(false) {
                return Err(unavailable("no such device".into()));
            }

            let stream = tokio_serial::new(address, self.baud_rate)
                .data_bits(DataBits::Eight)
                .parity(Parity::None)
                .stop_bits(StopBits::One)
                .flow_control(FlowControl::None)
                .open_native_async()
                .map_err(|e| unavailable(e.to_string()))?;

            debug!(address, baud = self.baud_rate, "serial port opened");
            Ok(Box::new(stream))
        }
    }
}
