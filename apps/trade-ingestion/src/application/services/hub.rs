//! Ingestion Hub
//!
//! Owns one `StreamSupervisor` per subscribed symbol and the merged queue
//! they all feed.
//!
//! # Lifecycle
//!
//! 1. `IngestionHub::new` creates the bounded queue and a child
//!    cancellation token.
//! 2. `subscribe` spawns a supervisor per new symbol. Network failures are
//!    never reported here; they are retried inside the supervisor.
//! 3. `trades` hands the merged stream to the single consumer.
//! 4. `close` cancels every supervisor and releases the hub's sink. The
//!    merged stream ends once every supervisor has stopped.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::supervisor::{StreamSupervisor, SupervisorContext};
use crate::domain::market_data::{Symbol, SymbolError};
use crate::domain::subscription::{ConnectionState, Subscription, SubscriptionSnapshot};
use crate::infrastructure::binance::{DEFAULT_STREAM_BASE_URL, stream_url};
use crate::infrastructure::queue::{
    DEFAULT_QUEUE_CAPACITY, QueueError, TradeSink, TradeStream, trade_queue,
};

// =============================================================================
// Errors
// =============================================================================

/// Failure to start ingestion for a symbol.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubscriptionError {
    /// The symbol cannot be streamed.
    #[error("subscription error: {0}")]
    InvalidSymbol(#[from] SymbolError),

    /// The hub has been closed.
    #[error("subscription error: hub is closed")]
    HubClosed,
}

/// Hub-level failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HubError {
    /// The merged queue could not be created.
    #[error("failed to create trade queue: {0}")]
    Queue(#[from] QueueError),

    /// The merged stream has already been handed out.
    #[error("merged trade stream already taken")]
    TradesAlreadyTaken,
}

// =============================================================================
// Configuration
// =============================================================================

/// Hub configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubConfig {
    /// Upstream base URL; each symbol dials `<base>/<lower(symbol)>@trade`.
    pub stream_base_url: String,
    /// Bound of the merged queue.
    pub queue_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            stream_base_url: DEFAULT_STREAM_BASE_URL.to_string(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

// =============================================================================
// Hub
// =============================================================================

struct Entry {
    stream_name: String,
    subscription: Arc<Subscription>,
}

/// Supervisor registry and merged trade stream.
pub struct IngestionHub {
    config: HubConfig,
    context: SupervisorContext,
    cancel: CancellationToken,
    sink: Mutex<Option<TradeSink>>,
    stream: Mutex<Option<TradeStream>>,
    entries: RwLock<Vec<Entry>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl IngestionHub {
    /// Create a hub. Supervisors get child tokens of `cancel`, so cancelling
    /// it stops every supervisor.
    ///
    /// # Errors
    ///
    /// Returns `HubError::Queue` if the queue capacity is zero.
    pub fn new(
        config: HubConfig,
        context: SupervisorContext,
        cancel: &CancellationToken,
    ) -> Result<Self, HubError> {
        let (sink, stream) = trade_queue(config.queue_capacity)?;

        Ok(Self {
            config,
            context,
            cancel: cancel.child_token(),
            sink: Mutex::new(Some(sink)),
            stream: Mutex::new(Some(stream)),
            entries: RwLock::new(Vec::new()),
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Hub configuration.
    #[must_use]
    pub const fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Start ingestion for `symbol`.
    ///
    /// Subscribing a symbol that is already active (compared by stream
    /// name, so case-insensitively) returns the existing subscription.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `SubscriptionError::InvalidSymbol` for an unusable symbol and
    /// `SubscriptionError::HubClosed` after `close`.
    pub fn subscribe(&self, symbol: &str) -> Result<Arc<Subscription>, SubscriptionError> {
        let symbol = Symbol::parse(symbol)?;
        let stream_name = symbol.stream_name();

        let mut entries = self.entries.write();
        if let Some(existing) = entries.iter().find(|e| e.stream_name == stream_name) {
            tracing::debug!(symbol = %symbol, "Symbol already subscribed");
            return Ok(existing.subscription.clone());
        }

        let sink = match self.sink.lock().as_ref() {
            Some(sink) if !self.cancel.is_cancelled() => sink.clone(),
            _ => return Err(SubscriptionError::HubClosed),
        };

        let url = stream_url(&self.config.stream_base_url, &symbol);
        let subscription = Arc::new(Subscription::new(symbol));
        let supervisor = StreamSupervisor::new(
            subscription.clone(),
            url,
            self.context.clone(),
            sink,
            self.cancel.child_token(),
        );

        tracing::info!(
            symbol = %subscription.symbol(),
            url = supervisor.url(),
            "Starting stream supervisor"
        );

        self.tasks.lock().push(tokio::spawn(supervisor.run()));
        entries.push(Entry {
            stream_name,
            subscription: subscription.clone(),
        });
        drop(entries);

        Ok(subscription)
    }

    /// Take the merged trade stream.
    ///
    /// # Errors
    ///
    /// Returns `HubError::TradesAlreadyTaken` on every call after the first.
    pub fn trades(&self) -> Result<TradeStream, HubError> {
        self.stream.lock().take().ok_or(HubError::TradesAlreadyTaken)
    }

    /// Cancel every supervisor and release the hub's sink.
    ///
    /// Returns immediately; use `wait_stopped` to wait for supervisors.
    pub fn close(&self) {
        if self.cancel.is_cancelled() && self.sink.lock().is_none() {
            return;
        }

        tracing::info!(symbols = self.entries.read().len(), "Closing ingestion hub");
        self.cancel.cancel();
        self.sink.lock().take();
    }

    /// Whether `close` has been called or the parent token cancelled.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Wait up to `timeout` for every supervisor task to finish.
    ///
    /// Returns `true` if all finished in time.
    pub async fn wait_stopped(&self, timeout: Duration) -> bool {
        let handles = std::mem::take(&mut *self.tasks.lock());
        let count = handles.len();

        if tokio::time::timeout(timeout, futures_util::future::join_all(handles))
            .await
            .is_ok()
        {
            tracing::info!(supervisors = count, "All stream supervisors stopped");
            true
        } else {
            tracing::warn!(
                supervisors = count,
                timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                "Timed out waiting for stream supervisors"
            );
            false
        }
    }

    /// Whether `symbol` has an active subscription.
    #[must_use]
    pub fn is_subscribed(&self, symbol: &str) -> bool {
        Symbol::parse(symbol).is_ok_and(|symbol| {
            let stream_name = symbol.stream_name();
            self.entries
                .read()
                .iter()
                .any(|e| e.stream_name == stream_name)
        })
    }

    /// Subscribed symbols in subscription order.
    #[must_use]
    pub fn symbols(&self) -> Vec<Symbol> {
        self.entries
            .read()
            .iter()
            .map(|e| e.subscription.symbol().clone())
            .collect()
    }

    /// Snapshots of every subscription in subscription order.
    #[must_use]
    pub fn subscriptions(&self) -> Vec<SubscriptionSnapshot> {
        self.entries
            .read()
            .iter()
            .map(|e| e.subscription.snapshot())
            .collect()
    }

    /// Number of symbols with a live upstream connection.
    #[must_use]
    pub fn streaming_count(&self) -> usize {
        self.entries
            .read()
            .iter()
            .filter(|e| e.subscription.state() == ConnectionState::Streaming)
            .count()
    }
}

// =============================================================================
// Tests
// =============================================================================
