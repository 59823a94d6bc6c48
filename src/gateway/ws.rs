//! WebSocket viewers over `axum`: `GET /ws` streams one JSON envelope per
//! text message. Incoming messages other than `Close` are ignored.

use async_trait::async_trait;
use axum::Router;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;

use super::{Envelope, Gateway, GatewayError, ViewerTransport};

/// [`ViewerTransport`] over an upgraded websocket.
pub struct WsViewer {
    socket: WebSocket,
}

impl WsViewer {
    pub fn new(socket: WebSocket) -> Self {
        Self { socket }
    }
}

#[async_trait]
impl ViewerTransport for WsViewer {
    async fn send(&mut self, envelope: &Envelope<'_>) -> Result<(), GatewayError> {
        let text = envelope.to_json()?;
        self.socket
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))
    }

    async fn closed(&mut self) {
        loop {
            match self.socket.recv().await {
                None | Some(Err(_)) | Some(Ok(Message::Close(_))) => return,
                Some(Ok(_)) => continue,
            }
        }
    }

    async fn close(&mut self) {
        let _ = self.socket.send(Message::Close(None)).await;
    }
}

/// Routes `GET /ws` to the gateway.
pub fn router(gateway: Gateway) -> Router {
    Router::new()
        .route("/ws", get(handle_ws))
        .with_state(gateway)
}

async fn handle_ws(State(gateway): State<Gateway>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| async move {
        gateway.on_client_connect(WsViewer::new(socket)).await;
    })
}
