//! WebSocket client for the dispatch channel.
//!
//! Gated behind the `client` cargo feature so downstream crates that only
//! need the shared types do not pull in `tokio-tungstenite`.

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;

use crate::objects::{ClientMessage, ServerMessage};

/// Errors produced by the SDK websocket client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Transport-level failure (connection refused, reset, …).
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// A frame could not be encoded or decoded.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Typed client for the `GET /ws` dispatch endpoint.
///
/// The client does not reconnect; a dropped socket surfaces as `None` from
/// [`next_message`](DispatchClient::next_message).
pub struct DispatchClient {
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl DispatchClient {
    /// Connect to a dispatch server, e.g. `ws://127.0.0.1:8080/ws`.
    pub async fn connect(url: &Url) -> Result<Self, ClientError> {
        let (socket, _response) = connect_async(url.as_str()).await?;
        Ok(Self { socket })
    }

    /// Send one message as a JSON text frame.
    pub async fn send(&mut self, message: &ClientMessage) -> Result<(), ClientError> {
        let json = serde_json::to_string(message)?;
        self.socket.send(Message::Text(json)).await?;
        Ok(())
    }

    /// Send a pre-encoded text frame as is.
    pub async fn send_raw(&mut self, text: &str) -> Result<(), ClientError> {
        self.socket.send(Message::Text(text.to_owned())).await?;
        Ok(())
    }

    /// Wait for the next server message.
    ///
    /// Non-text frames are skipped. Returns `None` once the socket is closed.
    pub async fn next_message(&mut self) -> Option<Result<ServerMessage, ClientError>> {
        while let Some(frame) = self.socket.next().await {
            match frame {
                Ok(Message::Text(text)) => {
                    return Some(serde_json::from_str(&text).map_err(ClientError::from));
                }
                Ok(Message::Close(_)) => return None,
                Ok(_) => continue,
                Err(e) => return Some(Err(e.into())),
            }
        }
        None
    }

    /// Send a close frame and drop the connection.
    pub async fn close(mut self) -> Result<(), ClientError> {
        self.socket.close(None).await?;
        Ok(())
    }
}
