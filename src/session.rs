// ABOUTME: Realtime connection seam plus the websocket transport implementation
// ABOUTME: Authenticates each fresh connection with a single bearer authorization frame

use anyhow::Result;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::error::BridgeError;

/// A single bidirectional realtime connection.
///
/// The connection is owned by exactly one reader; it is not safe for
/// concurrent reads. Outbound application traffic goes through the REST
/// collaborator, so `send` is only used for the authorization handshake.
#[async_trait]
pub trait RealtimeConnection: Send {
    async fn send(&mut self, text: String) -> Result<()>;

    /// Next inbound text frame, or `None` on clean close.
    async fn recv(&mut self) -> Result<Option<String>>;
}

/// Opens realtime connections. The seam exists so tests (and exotic
/// deployments) can substitute the transport.
#[async_trait]
pub trait RealtimeTransport: Send + Sync {
    async fn connect(&self, endpoint: &str) -> Result<Box<dyn RealtimeConnection>>;
}

/// Build the one-shot authorization frame sent before anything is read.
pub fn auth_frame(token: &str) -> serde_json::Value {
    serde_json::json!({
        "id": uuid::Uuid::new_v4().to_string(),
        "type": "authorization",
        "data": {
            "token": format!("Bearer {token}"),
        },
    })
}

/// Authenticate a fresh connection. The connection is ready only after this
/// returns; no inbound frame may be processed before it.
pub async fn authenticate(conn: &mut dyn RealtimeConnection, token: &str) -> Result<()> {
    let frame = auth_frame(token).to_string();
    conn.send(frame).await.map_err(|e| {
        BridgeError::Transport(format!("failed to send authorization frame: {e:#}"))
    })?;
    tracing::debug!("Sent authorization frame");
    Ok(())
}

// =============================================================================
// Websocket transport
// =============================================================================

/// Production transport backed by tokio-tungstenite.
#[derive(Debug, Clone, Default)]
pub struct WebSocketTransport;

#[async_trait]
impl RealtimeTransport for WebSocketTransport {
    async fn connect(&self, endpoint: &str) -> Result<Box<dyn RealtimeConnection>> {
        tracing::info!(endpoint, "Opening websocket connection");
        let (stream, _response) = connect_async(endpoint).await.map_err(|e| {
            BridgeError::Transport(format!("websocket connect to {endpoint} failed: {e}"))
        })?;
        Ok(Box::new(WebSocketConnection { inner: stream }))
    }
}

struct WebSocketConnection {
    inner: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl RealtimeConnection for WebSocketConnection {
    async fn send(&mut self, text: String) -> Result<()> {
        self.inner
            .send(WsMessage::Text(text))
            .await
            .map_err(|e| BridgeError::Transport(e.to_string()).into())
    }

    async fn recv(&mut self) -> Result<Option<String>> {
        loop {
            match self.inner.next().await {
                None => return Ok(None),
                Some(Ok(WsMessage::Text(text))) => return Ok(Some(text)),
                Some(Ok(WsMessage::Binary(bytes))) => match String::from_utf8(bytes) {
                    Ok(text) => return Ok(Some(text)),
                    Err(_) => tracing::debug!("Dropping non-utf8 binary frame"),
                },
                Some(Ok(WsMessage::Close(_))) => return Ok(None),
                // Ping/pong are answered by tungstenite itself
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(BridgeError::Transport(e.to_string()).into()),
            }
        }
    }
}
