use std::time::Duration;

use thiserror::Error;

/// # Errors that end one viewer connection.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum GatewayError {
    /// The envelope could not be serialized.
    #[error("envelope encoding failed: {0}")]
    Encode(#[from] serde_json::Error),

    /// The transport refused the write or is gone.
    #[error("transport error: {0}")]
    Transport(String),

    /// The write did not complete in time; the viewer is too slow.
    #[error("write timed out after {0:?}")]
    WriteTimeout(Duration),
}

impl GatewayError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            GatewayError::Encode(_) => "gateway_encode",
            GatewayError::Transport(_) => "gateway_transport",
            GatewayError::WriteTimeout(_) => "gateway_write_timeout",
        }
    }
}
