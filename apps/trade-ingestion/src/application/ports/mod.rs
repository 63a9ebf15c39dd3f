//! Port Interfaces
//!
//! Defines the interfaces (ports) for external systems following
//! the Hexagonal Architecture pattern. These are the contracts that
//! infrastructure adapters must implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - `UpstreamConnector` / `UpstreamStream`: streaming connection to the
//!   upstream trade feed
//! - `WireDecoder`: upstream payload → `NormalizedTrade`
//! - `MessageBus`: topic-based publish to the internal bus
//! - `BackoffPolicy`: wait between connection attempts

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::domain::market_data::{NormalizedTrade, TradeValidationError};

// =============================================================================
// Upstream Connection Port
// =============================================================================

/// Connection-layer failures. Always retryable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    /// Dialing the upstream endpoint failed.
    #[error("connect failed: {0}")]
    Dial(String),

    /// Reading from an established connection failed.
    #[error("read failed: {0}")]
    Read(String),

    /// The upstream closed the connection.
    #[error("connection closed by upstream")]
    Closed,
}

/// An established upstream connection delivering one payload per event.
#[async_trait]
pub trait UpstreamStream: Send {
    /// Wait for the next upstream message payload.
    ///
    /// Any error means the connection is unusable and must be torn down.
    async fn next_message(&mut self) -> Result<Vec<u8>, ConnectionError>;
}

/// Dials upstream streaming endpoints.
#[async_trait]
pub trait UpstreamConnector: Send + Sync {
    /// Open a connection to `url`.
    async fn connect(&self, url: &str) -> Result<Box<dyn UpstreamStream>, ConnectionError>;
}

// =============================================================================
// Wire Decoder Port
// =============================================================================

/// Per-message decode failures. Never fatal to the read loop.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// Payload is not a trade event.
    #[error("malformed message: {0}")]
    Malformed(String),

    /// Price is not a decimal number.
    #[error("invalid price '{value}': {reason}")]
    InvalidPrice {
        /// Raw price string.
        value: String,
        /// Parser message.
        reason: String,
    },

    /// Quantity is not a decimal number.
    #[error("invalid size '{value}': {reason}")]
    InvalidSize {
        /// Raw quantity string.
        value: String,
        /// Parser message.
        reason: String,
    },

    /// Trade time is outside the representable range.
    #[error("invalid trade time {0}")]
    InvalidTimestamp(i64),

    /// Parsed values violate trade invariants.
    #[error("invalid trade: {0}")]
    InvalidTrade(#[from] TradeValidationError),
}

impl DecodeError {
    /// Short label for logs and metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Malformed(_) => "malformed",
            Self::InvalidPrice { .. } => "invalid_price",
            Self::InvalidSize { .. } => "invalid_size",
            Self::InvalidTimestamp(_) => "invalid_timestamp",
            Self::InvalidTrade(_) => "invalid_trade",
        }
    }
}

/// Parses one upstream payload into a trade.
pub trait WireDecoder: Send + Sync + fmt::Debug {
    /// Decode one payload.
    ///
    /// # Errors
    ///
    /// Returns `DecodeError` describing the first failed step. The error
    /// never affects later messages.
    fn decode(&self, payload: &[u8]) -> Result<NormalizedTrade, DecodeError>;
}

// =============================================================================
// Message Bus Port
// =============================================================================

/// Bus transport failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BusError {
    /// The bus could not be reached.
    #[error("bus connection error: {0}")]
    Connection(String),

    /// The bus refused the message.
    #[error("bus rejected message: {0}")]
    Rejected(String),
}

/// Topic-scoped publish to the internal bus.
///
/// Delivery semantics belong to the transport; callers only learn whether
/// the single attempt was accepted.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Publish `payload` on `topic`.
    async fn publish(&self, topic: &str, payload: String) -> Result<(), BusError>;
}

/// A message captured by `InMemoryMessageBus`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedMessage {
    /// Topic the message was published on.
    pub topic: String,
    /// Serialized payload.
    pub payload: String,
}

/// Bus that records every publish, for tests and dry runs.
#[derive(Debug, Default)]
pub struct InMemoryMessageBus {
    messages: Mutex<Vec<RecordedMessage>>,
    failing: Mutex<bool>,
}

impl InMemoryMessageBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent publishes fail (`true`) or succeed (`false`).
    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock() = failing;
    }

    /// Messages published so far, in publish order.
    #[must_use]
    pub fn messages(&self) -> Vec<RecordedMessage> {
        self.messages.lock().clone()
    }

    /// Number of messages published so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }

    /// Whether nothing has been published.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.lock().is_empty()
    }
}

#[async_trait]
impl MessageBus for InMemoryMessageBus {
    async fn publish(&self, topic: &str, payload: String) -> Result<(), BusError> {
        if *self.failing.lock() {
            return Err(BusError::Connection("in-memory bus set to fail".to_string()));
        }
        self.messages.lock().push(RecordedMessage {
            topic: topic.to_string(),
            payload,
        });
        Ok(())
    }
}

// =============================================================================
// Backoff Policy Port
// =============================================================================

/// Which failure a backoff delay is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Dialing the upstream failed.
    ConnectFailure,
    /// An established connection dropped.
    ConnectionLost,
}

impl FailureKind {
    /// Name for logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ConnectFailure => "connect_failure",
            Self::ConnectionLost => "connection_lost",
        }
    }
}

/// Decides how long a supervisor waits before its next dial.
///
/// Policies never give up; a symbol is only abandoned on cancellation.
pub trait BackoffPolicy: Send + Sync + fmt::Debug {
    /// Delay before the next dial after the `attempt`-th consecutive
    /// failure of `kind` (1-based).
    fn delay(&self, kind: FailureKind, attempt: u32) -> Duration;
}

// =============================================================================
// Scripted Connector
// =============================================================================

/// One event on a scripted connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedMessage {
    /// Deliver this payload.
    Payload(Vec<u8>),
    /// Fail the read with this reason, dropping the connection.
    Fail(String),
}

impl ScriptedMessage {
    /// Payload from a string slice.
    #[must_use]
    pub fn text(text: &str) -> Self {
        Self::Payload(text.as_bytes().to_vec())
    }
}

/// Outcome of one scripted dial.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedDial {
    /// The dial fails with this reason.
    Fail(String),
    /// The dial succeeds and the connection delivers these events, then
    /// stays open without further messages.
    Connect(Vec<ScriptedMessage>),
}

/// A dial observed by `ScriptedConnector`.
#[derive(Debug, Clone)]
pub struct DialRecord {
    /// Dialed URL.
    pub url: String,
    /// When the dial started.
    pub at: tokio::time::Instant,
}

/// In-memory connector replaying per-URL scripts, for tests.
///
/// Once a URL's script is exhausted, further dials to it never complete.
#[derive(Debug, Default)]
pub struct ScriptedConnector {
    scripts: Mutex<HashMap<String, VecDeque<ScriptedDial>>>,
    dials: Mutex<Vec<DialRecord>>,
}

impl ScriptedConnector {
    /// Create a connector with no scripts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append dial outcomes for `url`.
    #[must_use]
    pub fn script(self, url: &str, dials: impl IntoIterator<Item = ScriptedDial>) -> Self {
        self.scripts
            .lock()
            .entry(url.to_string())
            .or_default()
            .extend(dials);
        self
    }

    /// Every dial so far, in order.
    #[must_use]
    pub fn dials(&self) -> Vec<DialRecord> {
        self.dials.lock().clone()
    }

    /// Number of dials to `url` so far.
    #[must_use]
    pub fn dial_count(&self, url: &str) -> usize {
        self.dials.lock().iter().filter(|d| d.url == url).count()
    }
}

#[async_trait]
impl UpstreamConnector for ScriptedConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn UpstreamStream>, ConnectionError> {
        self.dials.lock().push(DialRecord {
            url: url.to_string(),
            at: tokio::time::Instant::now(),
        });

        let next = self
            .scripts
            .lock()
            .get_mut(url)
            .and_then(VecDeque::pop_front);

        match next {
            Some(ScriptedDial::Fail(reason)) => Err(ConnectionError::Dial(reason)),
            Some(ScriptedDial::Connect(messages)) => Ok(Box::new(ScriptedStream {
                messages: messages.into(),
            })),
            None => std::future::pending().await,
        }
    }
}

struct ScriptedStream {
    messages: VecDeque<ScriptedMessage>,
}

#[async_trait]
impl UpstreamStream for ScriptedStream {
    async fn next_message(&mut self) -> Result<Vec<u8>, ConnectionError> {
        match self.messages.pop_front() {
            Some(ScriptedMessage::Payload(payload)) => Ok(payload),
            Some(ScriptedMessage::Fail(reason)) => Err(ConnectionError::Read(reason)),
            None => std::future::pending().await,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_bus_records_in_order() {
        let bus = InMemoryMessageBus::new();
        bus.publish("market.trade.A", "1".to_string()).await.unwrap();
        bus.publish("market.trade.B", "2".to_string()).await.unwrap();

        let messages = bus.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].topic, "market.trade.A");
        assert_eq!(messages[1].payload, "2");
    }

    #[tokio::test]
    async fn in_memory_bus_can_fail() {
        let bus = InMemoryMessageBus::new();
        bus.set_failing(true);

        let result = bus.publish("market.trade.A", "1".to_string()).await;
        assert!(matches!(result, Err(BusError::Connection(_))));
        assert!(bus.is_empty());
    }

    #[tokio::test]
    async fn scripted_connector_replays_dials() {
        let connector = ScriptedConnector::new().script(
            "ws://a",
            [
                ScriptedDial::Fail("refused".to_string()),
                ScriptedDial::Connect(vec![
                    ScriptedMessage::text("hello"),
                    ScriptedMessage::Fail("reset".to_string()),
                ]),
            ],
        );

        let first = connector.connect("ws://a").await;
        assert!(matches!(first, Err(ConnectionError::Dial(_))));

        let mut stream = connector.connect("ws://a").await.unwrap();
        assert_eq!(stream.next_message().await.unwrap(), b"hello".to_vec());
        assert!(matches!(
            stream.next_message().await,
            Err(ConnectionError::Read(_))
        ));

        assert_eq!(connector.dial_count("ws://a"), 2);
    }

    #[tokio::test]
    async fn scripted_connector_hangs_when_exhausted() {
        let connector = ScriptedConnector::new();
        let result =
            tokio::time::timeout(Duration::from_millis(20), connector.connect("ws://none")).await;
        assert!(result.is_err());
        assert_eq!(connector.dial_count("ws://none"), 1);
    }

    #[test]
    fn decode_error_kinds() {
        assert_eq!(DecodeError::Malformed(String::new()).kind(), "malformed");
        assert_eq!(DecodeError::InvalidTimestamp(0).kind(), "invalid_timestamp");
        assert_eq!(
            DecodeError::InvalidTrade(TradeValidationError::EmptySymbol).kind(),
            "invalid_trade"
        );
    }

    #[test]
    fn failure_kind_names() {
        assert_eq!(FailureKind::ConnectFailure.as_str(), "connect_failure");
        assert_eq!(FailureKind::ConnectionLost.as_str(), "connection_lost");
    }
}
