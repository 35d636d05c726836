//! Transport layer
//!
//! The channel speaks to the backend through the [`Transport`] trait
//! rather than a concrete socket type, so the streaming logic can be
//! exercised against an in-memory transport in tests. [`WsTransport`] is
//! the production implementation over tokio-tungstenite; TLS is selected
//! by the URL scheme (`ws://` vs `wss://`).

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;

use crate::error::{Result, StreamError};

/// Factory for one persistent connection to the backend
#[async_trait]
pub trait Transport: Send + Sync {
    /// Establish a connection, returning its send and receive halves
    async fn connect(&self, url: &str) -> Result<(Box<dyn TransportSink>, Box<dyn TransportStream>)>;
}

/// Outbound half of a connection
#[async_trait]
pub trait TransportSink: Send {
    /// Send one text message
    async fn send_text(&mut self, text: String) -> Result<()>;

    /// Close the connection. Idempotent; errors are swallowed.
    async fn close(&mut self);
}

/// Inbound half of a connection
#[async_trait]
pub trait TransportStream: Send {
    /// Next inbound text message
    ///
    /// `None` once the peer has closed the connection; `Some(Err(_))` on a
    /// transport-level failure, after which the stream is dead.
    async fn next_text(&mut self) -> Option<Result<String>>;
}

type WsConn = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket transport over tokio-tungstenite
#[derive(Debug, Default)]
pub struct WsTransport;

impl WsTransport {
    /// Create the production transport
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn connect(&self, url: &str) -> Result<(Box<dyn TransportSink>, Box<dyn TransportStream>)> {
        let (ws, response) = connect_async(url)
            .await
            .map_err(|e| StreamError::connection(e.to_string()))?;
        debug!("WebSocket handshake complete: HTTP {}", response.status());

        let (sink, stream) = ws.split();
        Ok((Box::new(WsSink { sink }), Box::new(WsStream { stream })))
    }
}

struct WsSink {
    sink: SplitSink<WsConn, Message>,
}

#[async_trait]
impl TransportSink for WsSink {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.sink
            .send(Message::Text(text))
            .await
            .map_err(|e| StreamError::connection(e.to_string()))
    }

    async fn close(&mut self) {
        let _ = self.sink.send(Message::Close(None)).await;
        let _ = self.sink.close().await;
    }
}

struct WsStream {
    stream: SplitStream<WsConn>,
}

#[async_trait]
impl TransportStream for WsStream {
    async fn next_text(&mut self) -> Option<Result<String>> {
        while let Some(message) = self.stream.next().await {
            match message {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                Ok(Message::Close(_)) => return None,
                // Control and binary frames are not part of the protocol
                Ok(_) => continue,
                Err(e) => return Some(Err(StreamError::connection(e.to_string()))),
            }
        }
        None
    }
}
