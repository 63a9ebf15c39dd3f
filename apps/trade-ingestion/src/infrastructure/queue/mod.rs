//! Bounded Trade Queue
//!
//! Multi-producer, single-consumer hand-off between the per-symbol
//! supervisors and the publishing relay.
//!
//! # Semantics
//!
//! - Capacity is fixed at creation (default 100 pending trades).
//! - `TradeSink::send` waits while the queue is full. Nothing is dropped
//!   to make room, so a slow consumer throttles every producer.
//! - Trades from one sink are received in the order they were sent. Trades
//!   from different sinks interleave arbitrarily.
//! - `TradeStream::recv` returns `None` once every sink has been dropped and
//!   the buffer is drained.

use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::mpsc;
use tokio_stream::Stream;

use crate::domain::market_data::NormalizedTrade;

/// Default number of pending trades the queue holds before blocking producers.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Queue errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    /// A queue must hold at least one trade.
    #[error("queue capacity must be at least 1")]
    ZeroCapacity,

    /// The consumer side has been dropped.
    #[error("trade queue is closed")]
    Closed,
}

/// Create a bounded trade queue.
///
/// # Errors
///
/// Returns `QueueError::ZeroCapacity` if `capacity` is zero.
pub fn trade_queue(capacity: usize) -> Result<(TradeSink, TradeStream), QueueError> {
    if capacity == 0 {
        return Err(QueueError::ZeroCapacity);
    }

    let (tx, rx) = mpsc::channel(capacity);
    Ok((TradeSink { tx }, TradeStream { rx, capacity }))
}

// =============================================================================
// Producer Side
// =============================================================================

/// Producer handle. Clone one per supervisor.
#[derive(Debug, Clone)]
pub struct TradeSink {
    tx: mpsc::Sender<NormalizedTrade>,
}

impl TradeSink {
    /// Enqueue a trade, waiting while the queue is full.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::Closed` if the consumer has been dropped.
    pub async fn send(&self, trade: NormalizedTrade) -> Result<(), QueueError> {
        self.tx.send(trade).await.map_err(|_| QueueError::Closed)
    }

    /// Whether the consumer has been dropped.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Maximum number of pending trades.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }
}

// =============================================================================
// Consumer Side
// =============================================================================

/// Consumer handle yielding trades from every sink.
#[derive(Debug)]
pub struct TradeStream {
    rx: mpsc::Receiver<NormalizedTrade>,
    capacity: usize,
}

impl TradeStream {
    /// Receive the next trade, or `None` once all sinks are gone and the
    /// buffer is empty.
    pub async fn recv(&mut self) -> Option<NormalizedTrade> {
        self.rx.recv().await
    }

    /// Number of trades waiting to be received.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Whether no trades are waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Maximum number of pending trades.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Stop accepting new trades. Already buffered trades can still be
    /// received.
    pub fn close(&mut self) {
        self.rx.close();
    }
}

impl Stream for TradeStream {
    type Item = NormalizedTrade;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

// =============================================================================
// Tests
// =============================================================================
