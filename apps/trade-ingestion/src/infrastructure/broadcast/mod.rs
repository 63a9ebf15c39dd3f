//! Broadcast Bus Adapter
//!
//! In-process `MessageBus` built on a tokio broadcast channel, for running
//! without Redis and for wiring in-process consumers.
//!
//! # Architecture
//!
//! Every published message goes onto one channel. Each subscriber holds a
//! `TopicFilter` and skips messages whose topic does not match:
//!
//! - `Exact("market.trade.BTCUSDT")`: one symbol
//! - `Pattern("market.trade.*")`: glob where `*` matches any run of
//!   characters, like Redis `PSUBSCRIBE`
//!
//! A subscriber that falls more than `capacity` messages behind loses the
//! oldest ones; the loss is logged and reception continues.

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::application::ports::{BusError, MessageBus};

/// Default channel capacity.
pub const DEFAULT_BROADCAST_CAPACITY: usize = 10_000;

// =============================================================================
// Messages and Filters
// =============================================================================

/// One message on the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    /// Topic, e.g. `market.trade.BTCUSDT`.
    pub topic: String,
    /// Serialized payload.
    pub payload: String,
}

/// Topic selection for a subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicFilter {
    /// Match one topic exactly.
    Exact(String),
    /// Match topics against a `*` glob.
    Pattern(String),
}

impl TopicFilter {
    /// Whether `topic` passes this filter.
    #[must_use]
    pub fn matches(&self, topic: &str) -> bool {
        match self {
            Self::Exact(expected) => expected == topic,
            Self::Pattern(pattern) => glob_match(pattern.as_bytes(), topic.as_bytes()),
        }
    }
}

/// `*` glob match with backtracking to the most recent star.
fn glob_match(pattern: &[u8], text: &[u8]) -> bool {
    let (mut p, mut t) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() && pattern[p] == b'*' {
            star = Some((p, t));
            p += 1;
        } else if p < pattern.len() && pattern[p] == text[t] {
            p += 1;
            t += 1;
        } else if let Some((star_p, star_t)) = star {
            p = star_p + 1;
            t = star_t + 1;
            star = Some((star_p, star_t + 1));
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|&c| c == b'*')
}

// =============================================================================
// Broadcast Bus
// =============================================================================

/// In-process topic bus.
#[derive(Debug, Clone)]
pub struct BroadcastBus {
    tx: broadcast::Sender<BusMessage>,
}

impl Default for BroadcastBus {
    fn default() -> Self {
        Self::new(DEFAULT_BROADCAST_CAPACITY)
    }
}

impl BroadcastBus {
    /// Create a bus buffering up to `capacity` messages per subscriber.
    ///
    /// A zero capacity is raised to 1.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            tx: broadcast::channel(capacity.max(1)).0,
        }
    }

    /// Subscribe to topics matching `filter`.
    #[must_use]
    pub fn subscribe(&self, filter: TopicFilter) -> TopicSubscriber {
        TopicSubscriber {
            rx: self.tx.subscribe(),
            filter,
        }
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[async_trait]
impl MessageBus for BroadcastBus {
    async fn publish(&self, topic: &str, payload: String) -> Result<(), BusError> {
        // No subscribers is not an error; the message is simply unseen.
        let _ = self.tx.send(BusMessage {
            topic: topic.to_string(),
            payload,
        });
        Ok(())
    }
}

// =============================================================================
// Subscriber
// =============================================================================

/// Receiving end filtered to a set of topics.
#[derive(Debug)]
pub struct TopicSubscriber {
    rx: broadcast::Receiver<BusMessage>,
    filter: TopicFilter,
}

impl TopicSubscriber {
    /// The filter this subscriber applies.
    #[must_use]
    pub const fn filter(&self) -> &TopicFilter {
        &self.filter
    }

    /// Next matching message, or `None` once the bus is dropped.
    pub async fn recv(&mut self) -> Option<BusMessage> {
        loop {
            match self.rx.recv().await {
                Ok(message) if self.filter.matches(&message.topic) => return Some(message),
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, filter = ?self.filter, "Bus subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case("market.trade.*", "market.trade.BTCUSDT", true ; "trailing star")]
    #[test_case("market.trade.*", "market.trade.", true ; "star matches empty")]
    #[test_case("market.trade.*", "market.quote.BTCUSDT", false ; "other prefix")]
    #[test_case("market.*.BTCUSDT", "market.trade.BTCUSDT", true ; "inner star")]
    #[test_case("*USDT", "market.trade.ETHUSDT", true ; "leading star")]
    #[test_case("*", "anything", true ; "lone star")]
    #[test_case("market.trade.BTC*T", "market.trade.BTCUSDTX", false ; "suffix mismatch")]
    #[test_case("a*b*c", "aXbYbZc", true ; "backtracking")]
    fn pattern_matching(pattern: &str, topic: &str, expected: bool) {
        assert_eq!(
            TopicFilter::Pattern(pattern.to_string()).matches(topic),
            expected
        );
    }

    #[test]
    fn exact_matching_is_case_sensitive() {
        let filter = TopicFilter::Exact("market.trade.BTCUSDT".to_string());
        assert!(filter.matches("market.trade.BTCUSDT"));
        assert!(!filter.matches("market.trade.btcusdt"));
    }

    #[tokio::test]
    async fn subscribers_receive_matching_topics_only() {
        let bus = BroadcastBus::default();
        let mut btc = bus.subscribe(TopicFilter::Exact("market.trade.BTCUSDT".to_string()));
        let mut all = bus.subscribe(TopicFilter::Pattern("market.trade.*".to_string()));
        assert_eq!(bus.subscriber_count(), 2);

        bus.publish("market.trade.ETHUSDT", "eth".to_string())
            .await
            .unwrap();
        bus.publish("market.trade.BTCUSDT", "btc".to_string())
            .await
            .unwrap();

        assert_eq!(btc.recv().await.unwrap().payload, "btc");
        assert_eq!(all.recv().await.unwrap().payload, "eth");
        assert_eq!(all.recv().await.unwrap().payload, "btc");
    }

    #[tokio::test]
    async fn shared_as_message_bus() {
        let bus = BroadcastBus::new(4);
        let mut sub = bus.subscribe(TopicFilter::Pattern("market.trade.*".to_string()));
        let shared: std::sync::Arc<dyn MessageBus> = std::sync::Arc::new(bus);

        shared
            .publish("market.trade.SOLUSDT", "sol".to_string())
            .await
            .unwrap();

        let message = sub.recv().await.unwrap();
        assert_eq!(message.topic, "market.trade.SOLUSDT");
        assert_eq!(message.payload, "sol");
    }

    #[tokio::test]
    async fn publish_without_subscribers_succeeds() {
        let bus = BroadcastBus::new(4);
        assert!(bus.publish("market.trade.X", "x".to_string()).await.is_ok());
    }

    #[tokio::test]
    async fn lagging_subscriber_keeps_receiving() {
        let bus = BroadcastBus::new(2);
        let mut sub = bus.subscribe(TopicFilter::Pattern("*".to_string()));

        for i in 0..5 {
            bus.publish("t", i.to_string()).await.unwrap();
        }

        assert_eq!(sub.recv().await.unwrap().payload, "3");
        assert_eq!(sub.recv().await.unwrap().payload, "4");
    }

    #[tokio::test]
    async fn recv_ends_when_bus_dropped() {
        let bus = BroadcastBus::new(4);
        let mut sub = bus.subscribe(TopicFilter::Exact("t".to_string()));
        drop(bus);
        assert!(sub.recv().await.is_none());
    }
}
