//! WebSocket Connector
//!
//! `UpstreamConnector` over tokio-tungstenite. One connection per symbol,
//! read-only apart from answering pings.
//!
//! # Stream URL
//!
//! `<base>/<lower(symbol)>@trade`, e.g.
//! `wss://stream.binance.com:9443/ws/btcusdt@trade`.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::application::ports::{ConnectionError, UpstreamConnector, UpstreamStream};
use crate::domain::market_data::Symbol;

/// Default upstream base URL.
pub const DEFAULT_STREAM_BASE_URL: &str = "wss://stream.binance.com:9443/ws";

/// Build the per-symbol stream URL.
#[must_use]
pub fn stream_url(base_url: &str, symbol: &Symbol) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), symbol.stream_name())
}

// =============================================================================
// Connector
// =============================================================================

/// Dials upstream trade streams over WebSocket (TLS via rustls).
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    /// Create a connector.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl UpstreamConnector for WebSocketConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn UpstreamStream>, ConnectionError> {
        tracing::debug!(url, "Dialing upstream stream");

        let (ws_stream, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| ConnectionError::Dial(e.to_string()))?;

        Ok(Box::new(WebSocketUpstream { ws: ws_stream }))
    }
}

// =============================================================================
// Connection
// =============================================================================

struct WebSocketUpstream {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl UpstreamStream for WebSocketUpstream {
    async fn next_message(&mut self) -> Result<Vec<u8>, ConnectionError> {
        loop {
            match self.ws.next().await {
                Some(Ok(Message::Text(text))) => return Ok(text.as_str().as_bytes().to_vec()),
                Some(Ok(Message::Binary(data))) => return Ok(data.to_vec()),
                Some(Ok(Message::Ping(data))) => {
                    self.ws
                        .send(Message::Pong(data))
                        .await
                        .map_err(|e| ConnectionError::Read(e.to_string()))?;
                }
                Some(Ok(Message::Close(frame))) => {
                    tracing::info!(?frame, "Upstream sent close frame");
                    return Err(ConnectionError::Closed);
                }
                Some(Ok(_)) => {
                    // Pong and raw frames carry no trades
                }
                Some(Err(e)) => return Err(ConnectionError::Read(e.to_string())),
                None => return Err(ConnectionError::Closed),
            }
        }
    }
}
