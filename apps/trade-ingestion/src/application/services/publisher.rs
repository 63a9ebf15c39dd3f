//! Bus Publisher
//!
//! Republishes one `NormalizedTrade` on `market.trade.<symbol>`. A single
//! attempt is made; failures are logged, counted and returned, and the trade
//! is dropped.

use std::sync::Arc;
use std::time::Instant;

use crate::application::ports::{BusError, MessageBus};
use crate::domain::market_data::NormalizedTrade;
use crate::infrastructure::metrics;

/// Publish failures.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// The trade could not be serialized.
    #[error("failed to serialize trade: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The bus did not accept the message.
    #[error("publish failed: {0}")]
    Bus(#[from] BusError),
}

/// Serializes trades and hands them to a `MessageBus`.
#[derive(Clone)]
pub struct BusPublisher {
    bus: Arc<dyn MessageBus>,
}

impl BusPublisher {
    /// Create a publisher over `bus`.
    #[must_use]
    pub fn new(bus: Arc<dyn MessageBus>) -> Self {
        Self { bus }
    }

    /// Publish `trade` once.
    ///
    /// # Errors
    ///
    /// Returns `PublishError` if serialization or the bus publish fails. The
    /// trade is not retried.
    pub async fn publish(&self, trade: &NormalizedTrade) -> Result<(), PublishError> {
        let topic = trade.topic();
        let payload = match serde_json::to_string(trade) {
            Ok(payload) => payload,
            Err(e) => {
                metrics::record_publish_failure();
                tracing::error!(topic = %topic, error = %e, "Failed to serialize trade");
                return Err(e.into());
            }
        };

        let started = Instant::now();
        let result = self.bus.publish(&topic, payload).await;
        metrics::record_publish_duration(started.elapsed());

        match result {
            Ok(()) => {
                metrics::record_trade_published();
                tracing::trace!(topic = %topic, "Published trade");
                Ok(())
            }
            Err(e) => {
                metrics::record_publish_failure();
                tracing::warn!(
                    topic = %topic,
                    symbol = trade.symbol(),
                    error = %e,
                    "Failed to publish trade, dropping"
                );
                Err(e.into())
            }
        }
    }
}
