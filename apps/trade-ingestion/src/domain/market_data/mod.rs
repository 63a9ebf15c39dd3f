//! Market Data Types
//!
//! Canonical, codec-agnostic records for market data flowing through the
//! ingestion pipeline. Prices and sizes are exact decimals end to end; a
//! binary float never appears in these types or in their serialized form.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Topic prefix for normalized trades on the bus.
pub const TRADE_TOPIC_PREFIX: &str = "market.trade";

/// Suffix appended to the lowercased symbol to form the upstream stream name.
pub const TRADE_STREAM_SUFFIX: &str = "@trade";

// =============================================================================
// Symbol
// =============================================================================

/// Errors raised when a raw string is not a usable instrument identifier.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SymbolError {
    /// Symbol is empty after trimming.
    #[error("symbol cannot be empty")]
    Empty,

    /// Symbol contains a character that cannot appear in a stream name.
    #[error("symbol '{symbol}' contains invalid character '{character}'")]
    InvalidCharacter {
        /// The rejected symbol.
        symbol: String,
        /// The offending character.
        character: char,
    },
}

/// Upstream-assigned instrument identifier (e.g. `BTCUSDT`).
///
/// The text is kept exactly as supplied. Only the upstream stream name is
/// lowercased; topics and normalized trades use the symbol verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(String);

impl Symbol {
    /// Parse and validate a symbol.
    ///
    /// # Errors
    ///
    /// Returns `SymbolError` if the symbol is empty or contains whitespace,
    /// `@`, `/`, `?` or `#`.
    pub fn parse(raw: &str) -> Result<Self, SymbolError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(SymbolError::Empty);
        }

        if let Some(character) = trimmed
            .chars()
            .find(|c| c.is_whitespace() || matches!(c, '@' | '/' | '?' | '#'))
        {
            return Err(SymbolError::InvalidCharacter {
                symbol: trimmed.to_string(),
                character,
            });
        }

        Ok(Self(trimmed.to_string()))
    }

    /// Get the symbol as given.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Upstream stream name: lowercased symbol plus the trade suffix.
    #[must_use]
    pub fn stream_name(&self) -> String {
        format!("{}{TRADE_STREAM_SUFFIX}", self.0.to_lowercase())
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Symbol {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// =============================================================================
// Normalized Trade
// =============================================================================

/// Validation failures for a normalized trade.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TradeValidationError {
    /// Trade symbol is empty.
    #[error("trade symbol cannot be empty")]
    EmptySymbol,

    /// Price is zero or negative.
    #[error("price must be positive, got {0}")]
    NonPositivePrice(Decimal),

    /// Size is zero or negative.
    #[error("size must be positive, got {0}")]
    NonPositiveSize(Decimal),

    /// Exchange tag is empty.
    #[error("exchange cannot be empty")]
    EmptyExchange,
}

/// Canonical trade record published on the bus.
///
/// # Wire Format (JSON)
/// ```json
/// {
///   "symbol": "BTCUSDT",
///   "price": "65000.50",
///   "size": "0.0012",
///   "timestamp": "2023-07-22T04:26:40Z",
///   "exchange": "Binance"
/// }
/// ```
///
/// Deserialization applies the same validation as [`NormalizedTrade::new`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "TradeRecord")]
pub struct NormalizedTrade {
    symbol: String,
    #[serde(with = "rust_decimal::serde::str")]
    price: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    size: Decimal,
    timestamp: DateTime<Utc>,
    exchange: String,
}

impl NormalizedTrade {
    /// Build a validated trade.
    ///
    /// # Errors
    ///
    /// Returns `TradeValidationError` if the symbol or exchange is empty, or
    /// if price or size is not strictly positive.
    pub fn new(
        symbol: impl Into<String>,
        price: Decimal,
        size: Decimal,
        timestamp: DateTime<Utc>,
        exchange: impl Into<String>,
    ) -> Result<Self, TradeValidationError> {
        let symbol = symbol.into();
        let exchange = exchange.into();

        if symbol.is_empty() {
            return Err(TradeValidationError::EmptySymbol);
        }
        if price <= Decimal::ZERO {
            return Err(TradeValidationError::NonPositivePrice(price));
        }
        if size <= Decimal::ZERO {
            return Err(TradeValidationError::NonPositiveSize(size));
        }
        if exchange.is_empty() {
            return Err(TradeValidationError::EmptyExchange);
        }

        Ok(Self {
            symbol,
            price,
            size,
            timestamp,
            exchange,
        })
    }

    /// Instrument identifier as received from upstream.
    #[must_use]
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Trade price.
    #[must_use]
    pub const fn price(&self) -> Decimal {
        self.price
    }

    /// Trade size.
    #[must_use]
    pub const fn size(&self) -> Decimal {
        self.size
    }

    /// Upstream trade time.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Source exchange tag.
    #[must_use]
    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    /// Bus topic for this trade. The symbol is not case-normalized.
    #[must_use]
    pub fn topic(&self) -> String {
        trade_topic(&self.symbol)
    }
}

/// Unvalidated shape of a serialized trade.
#[derive(Deserialize)]
struct TradeRecord {
    symbol: String,
    #[serde(with = "rust_decimal::serde::str")]
    price: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    size: Decimal,
    timestamp: DateTime<Utc>,
    exchange: String,
}

impl TryFrom<TradeRecord> for NormalizedTrade {
    type Error = TradeValidationError;

    fn try_from(record: TradeRecord) -> Result<Self, Self::Error> {
        Self::new(
            record.symbol,
            record.price,
            record.size,
            record.timestamp,
            record.exchange,
        )
    }
}

/// Bus topic for trades of `symbol`, e.g. `market.trade.BTCUSDT`.
#[must_use]
pub fn trade_topic(symbol: &str) -> String {
    format!("{TRADE_TOPIC_PREFIX}.{symbol}")
}

// =============================================================================
// Quote
// =============================================================================

/// Top-of-book bid/ask snapshot.
///
/// Reserved for future adapters; nothing in this service produces quotes yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    /// Instrument identifier.
    pub symbol: String,
    /// Best bid price.
    #[serde(with = "rust_decimal::serde::str")]
    pub bid_price: Decimal,
    /// Best bid size.
    #[serde(with = "rust_decimal::serde::str")]
    pub bid_size: Decimal,
    /// Best ask price.
    #[serde(with = "rust_decimal::serde::str")]
    pub ask_price: Decimal,
    /// Best ask size.
    #[serde(with = "rust_decimal::serde::str")]
    pub ask_size: Decimal,
    /// Quote time.
    pub timestamp: DateTime<Utc>,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use chrono::TimeZone;

    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn ts() -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_690_000_000_000).unwrap()
    }

    #[test]
    fn symbol_keeps_case() {
        let symbol = Symbol::parse("BTCUSDT").unwrap();
        assert_eq!(symbol.as_str(), "BTCUSDT");
        assert_eq!(symbol.to_string(), "BTCUSDT");
    }

    #[test]
    fn symbol_trims_surrounding_whitespace() {
        let symbol = Symbol::parse("  ethusdt ").unwrap();
        assert_eq!(symbol.as_str(), "ethusdt");
    }

    #[test]
    fn symbol_stream_name_is_lowercase() {
        let symbol = Symbol::parse("BtcUsdt").unwrap();
        assert_eq!(symbol.stream_name(), "btcusdt@trade");
    }

    #[test]
    fn symbol_rejects_empty() {
        assert_eq!(Symbol::parse(""), Err(SymbolError::Empty));
        assert_eq!(Symbol::parse("   "), Err(SymbolError::Empty));
    }

    #[test]
    fn symbol_rejects_url_characters() {
        for raw in ["btc@usdt", "btc/usdt", "btc usdt", "btc?x", "btc#1"] {
            assert!(
                matches!(
                    Symbol::parse(raw),
                    Err(SymbolError::InvalidCharacter { .. })
                ),
                "{raw} should be rejected"
            );
        }
    }

    #[test]
    fn trade_accepts_valid_values() {
        let trade =
            NormalizedTrade::new("BTCUSDT", dec("65000.50"), dec("0.0012"), ts(), "Binance")
                .unwrap();
        assert_eq!(trade.symbol(), "BTCUSDT");
        assert_eq!(trade.price().to_string(), "65000.50");
        assert_eq!(trade.size().to_string(), "0.0012");
        assert_eq!(trade.exchange(), "Binance");
    }

    #[test]
    fn trade_rejects_invalid_values() {
        assert_eq!(
            NormalizedTrade::new("", dec("1"), dec("1"), ts(), "Binance"),
            Err(TradeValidationError::EmptySymbol)
        );
        assert_eq!(
            NormalizedTrade::new("BTCUSDT", Decimal::ZERO, dec("1"), ts(), "Binance"),
            Err(TradeValidationError::NonPositivePrice(Decimal::ZERO))
        );
        assert_eq!(
            NormalizedTrade::new("BTCUSDT", dec("1"), dec("-0.5"), ts(), "Binance"),
            Err(TradeValidationError::NonPositiveSize(dec("-0.5")))
        );
        assert_eq!(
            NormalizedTrade::new("BTCUSDT", dec("1"), dec("1"), ts(), ""),
            Err(TradeValidationError::EmptyExchange)
        );
    }

    #[test]
    fn trade_topic_uses_symbol_verbatim() {
        let trade =
            NormalizedTrade::new("BTCUSDT", dec("1"), dec("1"), ts(), "Binance").unwrap();
        assert_eq!(trade.topic(), "market.trade.BTCUSDT");
        assert_eq!(trade_topic("ethusdt"), "market.trade.ethusdt");
    }

    #[test]
    fn trade_serializes_decimals_as_strings() {
        let trade =
            NormalizedTrade::new("BTCUSDT", dec("65000.50"), dec("0.0012"), ts(), "Binance")
                .unwrap();
        let value = serde_json::to_value(&trade).unwrap();

        assert_eq!(value["symbol"], "BTCUSDT");
        assert_eq!(value["price"], "65000.50");
        assert_eq!(value["size"], "0.0012");
        assert_eq!(value["exchange"], "Binance");
        assert_eq!(value["timestamp"], "2023-07-22T04:26:40Z");
        assert_eq!(value.as_object().unwrap().len(), 5);
    }

    #[test]
    fn trade_deserializes_from_bus_payload() {
        let json = r#"{"symbol":"BTCUSDT","price":"65000.50","size":"0.0012","timestamp":"2023-07-22T04:26:40Z","exchange":"Binance"}"#;
        let trade: NormalizedTrade = serde_json::from_str(json).unwrap();

        assert_eq!(trade.price().to_string(), "65000.50");
        assert_eq!(serde_json::to_string(&trade).unwrap(), json);
    }

    #[test]
    fn trade_deserialization_enforces_invariants() {
        let cases = [
            r#"{"symbol":"","price":"1","size":"1","timestamp":"2023-07-22T04:26:40Z","exchange":"Binance"}"#,
            r#"{"symbol":"BTCUSDT","price":"0","size":"1","timestamp":"2023-07-22T04:26:40Z","exchange":"Binance"}"#,
            r#"{"symbol":"BTCUSDT","price":"1","size":"-2","timestamp":"2023-07-22T04:26:40Z","exchange":"Binance"}"#,
            r#"{"symbol":"BTCUSDT","price":"1","size":"1","timestamp":"2023-07-22T04:26:40Z","exchange":""}"#,
        ];

        for json in cases {
            let result = serde_json::from_str::<NormalizedTrade>(json);
            assert!(result.is_err(), "accepted {json}");
        }
    }

    #[test]
    fn quote_serializes_decimals_as_strings() {
        let quote = Quote {
            symbol: "BTCUSDT".to_string(),
            bid_price: dec("64999.99"),
            bid_size: dec("1.5"),
            ask_price: dec("65000.01"),
            ask_size: dec("2"),
            timestamp: ts(),
        };
        let value = serde_json::to_value(&quote).unwrap();
        assert_eq!(value["bid_price"], "64999.99");
        assert_eq!(value["ask_size"], "2");
    }
}
