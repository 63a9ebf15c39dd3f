//! Binance WebSocket Message Types
//!
//! Wire format for the raw trade stream (`<symbol>@trade`).
//!
//! # Wire Format (JSON)
//! ```json
//! {
//!   "e": "trade",
//!   "E": 1690000000001,
//!   "s": "BTCUSDT",
//!   "t": 12345,
//!   "p": "65000.50",
//!   "q": "0.0012",
//!   "T": 1690000000000,
//!   "m": false
//! }
//! ```
//!
//! Price and quantity arrive as decimal strings and stay strings here; the
//! decoder parses them into exact decimals.
//!
//! # References
//!
//! - [Trade Streams](https://developers.binance.com/docs/binance-spot-api-docs/web-socket-streams#trade-streams)

use serde::{Deserialize, Serialize};

/// One trade event from the raw trade stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeEvent {
    /// Event type marker (`"trade"`). Not interpreted.
    #[serde(rename = "e")]
    pub event_type: String,

    /// Event time (ms since epoch). Not interpreted.
    #[serde(rename = "E", default)]
    pub event_time: i64,

    /// Instrument symbol, as the exchange spells it.
    #[serde(rename = "s")]
    pub symbol: String,

    /// Exchange trade id. Not interpreted.
    #[serde(rename = "t", default)]
    pub trade_id: i64,

    /// Price as a decimal string.
    #[serde(rename = "p")]
    pub price: String,

    /// Quantity as a decimal string.
    #[serde(rename = "q")]
    pub quantity: String,

    /// Trade time (ms since epoch).
    #[serde(rename = "T")]
    pub trade_time: i64,

    /// Whether the buyer was the maker. Not interpreted.
    #[serde(rename = "m", default)]
    pub is_buyer_maker: bool,
}
