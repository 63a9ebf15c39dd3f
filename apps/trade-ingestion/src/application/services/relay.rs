//! Trade Relay
//!
//! The single consumer of the merged queue. Drains trades in arrival order
//! and publishes each one before taking the next, so a slow bus throttles
//! every supervisor through the bounded queue.

use tokio_stream::StreamExt;

use super::publisher::BusPublisher;
use crate::infrastructure::queue::TradeStream;

/// Outcome counts for one relay run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    /// Trades accepted by the bus.
    pub published: u64,
    /// Trades dropped because publishing failed.
    pub failed: u64,
}

/// Drains the merged stream into the bus.
#[derive(Clone)]
pub struct TradeRelay {
    publisher: BusPublisher,
}

impl TradeRelay {
    /// Create a relay publishing through `publisher`.
    #[must_use]
    pub const fn new(publisher: BusPublisher) -> Self {
        Self { publisher }
    }

    /// Publish every trade until the stream ends.
    pub async fn run(self, mut trades: TradeStream) -> RelayStats {
        let mut stats = RelayStats::default();

        while let Some(trade) = trades.next().await {
            // Failures are logged by the publisher.
            if self.publisher.publish(&trade).await.is_ok() {
                stats.published += 1;
            } else {
                stats.failed += 1;
            }
        }

        tracing::info!(
            published = stats.published,
            failed = stats.failed,
            "Trade relay drained"
        );
        stats
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;
    use std::sync::Arc;

    use chrono::Utc;
    use rust_decimal::Decimal;

    use super::*;
    use crate::application::ports::InMemoryMessageBus;
    use crate::domain::market_data::NormalizedTrade;
    use crate::infrastructure::queue::trade_queue;

    fn trade(symbol: &str, price: &str) -> NormalizedTrade {
        NormalizedTrade::new(
            symbol,
            Decimal::from_str(price).unwrap(),
            Decimal::ONE,
            Utc::now(),
            "Binance",
        )
        .unwrap()
    }

    #[tokio::test]
    async fn publishes_in_arrival_order() {
        let bus = Arc::new(InMemoryMessageBus::new());
        let (sink, stream) = trade_queue(10).unwrap();

        sink.send(trade("BTCUSDT", "1")).await.unwrap();
        sink.send(trade("ETHUSDT", "2")).await.unwrap();
        sink.send(trade("BTCUSDT", "3")).await.unwrap();
        drop(sink);

        let stats = TradeRelay::new(BusPublisher::new(bus.clone()))
            .run(stream)
            .await;

        assert_eq!(
            stats,
            RelayStats {
                published: 3,
                failed: 0
            }
        );
        let topics: Vec<_> = bus.messages().into_iter().map(|m| m.topic).collect();
        assert_eq!(
            topics,
            vec![
                "market.trade.BTCUSDT",
                "market.trade.ETHUSDT",
                "market.trade.BTCUSDT"
            ]
        );
    }

    #[tokio::test]
    async fn failures_are_counted_and_skipped() {
        let bus = Arc::new(InMemoryMessageBus::new());
        bus.set_failing(true);
        let (sink, stream) = trade_queue(10).unwrap();

        sink.send(trade("BTCUSDT", "1")).await.unwrap();
        sink.send(trade("BTCUSDT", "2")).await.unwrap();
        drop(sink);

        let stats = TradeRelay::new(BusPublisher::new(bus.clone()))
            .run(stream)
            .await;

        assert_eq!(stats.failed, 2);
        assert_eq!(stats.published, 0);
        assert!(bus.is_empty());
    }
}
