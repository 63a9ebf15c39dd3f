//! Trade Stream Codec
//!
//! Decodes one raw trade-stream payload into a `NormalizedTrade`.
//!
//! Every failure is per message: the caller drops the payload and keeps
//! reading. Failure points, in order:
//!
//! 1. Structural JSON parse (`e`, `s`, `p`, `q`, `T` must be present)
//! 2. Price string → exact decimal
//! 3. Quantity string → exact decimal
//! 4. Trade time (ms epoch) → UTC instant
//! 5. Trade invariants (non-empty symbol, positive price and size)

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use super::messages::TradeEvent;
use crate::application::ports::{DecodeError, WireDecoder};
use crate::domain::market_data::NormalizedTrade;

/// Exchange tag stamped on trades decoded from this feed.
pub const BINANCE_EXCHANGE: &str = "Binance";

/// Decoder for the raw trade stream.
#[derive(Debug, Clone)]
pub struct TradeDecoder {
    exchange: String,
}

impl Default for TradeDecoder {
    fn default() -> Self {
        Self::new(BINANCE_EXCHANGE)
    }
}

impl TradeDecoder {
    /// Create a decoder stamping `exchange` on every trade.
    #[must_use]
    pub fn new(exchange: impl Into<String>) -> Self {
        Self {
            exchange: exchange.into(),
        }
    }

    /// Exchange tag this decoder stamps.
    #[must_use]
    pub fn exchange(&self) -> &str {
        &self.exchange
    }
}

impl WireDecoder for TradeDecoder {
    fn decode(&self, payload: &[u8]) -> Result<NormalizedTrade, DecodeError> {
        let event: TradeEvent = serde_json::from_slice(payload)
            .map_err(|e| DecodeError::Malformed(e.to_string()))?;

        let price = parse_decimal(&event.price).map_err(|reason| DecodeError::InvalidPrice {
            value: event.price.clone(),
            reason,
        })?;

        let size = parse_decimal(&event.quantity).map_err(|reason| DecodeError::InvalidSize {
            value: event.quantity.clone(),
            reason,
        })?;

        let timestamp = DateTime::<Utc>::from_timestamp_millis(event.trade_time)
            .ok_or(DecodeError::InvalidTimestamp(event.trade_time))?;

        Ok(NormalizedTrade::new(
            event.symbol,
            price,
            size,
            timestamp,
            self.exchange.clone(),
        )?)
    }
}

/// Parse a decimal string exactly, keeping its scale (`"65000.50"` stays
/// two decimal places).
///
/// Only an optional sign, digits and one decimal point are accepted. Values
/// that cannot be held without rounding are rejected.
fn parse_decimal(raw: &str) -> Result<Decimal, String> {
    let digits = raw.strip_prefix(['-', '+']).unwrap_or(raw);
    if let Some(c) = digits.chars().find(|c| !c.is_ascii_digit() && *c != '.') {
        return Err(format!("unexpected character {c:?}"));
    }
    Decimal::from_str_exact(raw).map_err(|e| e.to_string())
}
