//! Binance Trade Stream Adapters
//!
//! - **messages**: raw trade event wire type
//! - **codec**: payload → `NormalizedTrade`
//! - **connector**: WebSocket `UpstreamConnector`

pub mod codec;
pub mod connector;
pub mod messages;

pub use codec::{BINANCE_EXCHANGE, TradeDecoder};
pub use connector::{DEFAULT_STREAM_BASE_URL, WebSocketConnector, stream_url};
pub use messages::TradeEvent;
