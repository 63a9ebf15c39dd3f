//! Stream Supervisor
//!
//! Owns the upstream connection for exactly one symbol and keeps trades
//! flowing through transient failures.
//!
//! # State Machine
//!
//! ```text
//!   Idle ──► Connecting ──ok──► Streaming ──read error──► Reconnecting
//!               ▲  │ dial error                                │
//!               │  └─(backoff)─► Connecting                    │
//!               └───────────────────(backoff)──────────────────┘
//!
//!   any state ──cancel──► Stopped
//! ```
//!
//! Cancellation is checked before every dial and also interrupts a pending
//! dial, a blocked read, a backoff sleep, and a hand-off blocked on a full
//! queue. A trade interrupted mid hand-off is not delivered.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::application::ports::{
    BackoffPolicy, FailureKind, UpstreamConnector, UpstreamStream, WireDecoder,
};
use crate::domain::subscription::{ConnectionState, Subscription};
use crate::infrastructure::metrics;
use crate::infrastructure::queue::TradeSink;

/// Collaborators shared by every supervisor of a hub.
#[derive(Clone)]
pub struct SupervisorContext {
    /// Dials upstream endpoints.
    pub connector: Arc<dyn UpstreamConnector>,
    /// Turns payloads into trades.
    pub decoder: Arc<dyn WireDecoder>,
    /// Waits between dials.
    pub backoff: Arc<dyn BackoffPolicy>,
}

/// Internal phase. Mirrors `ConnectionState` but owns the live connection.
enum Phase {
    Connecting,
    Streaming(Box<dyn UpstreamStream>),
    Reconnecting(u32),
    Stopped,
}

impl Phase {
    const fn state(&self) -> ConnectionState {
        match self {
            Self::Connecting => ConnectionState::Connecting,
            Self::Streaming(_) => ConnectionState::Streaming,
            Self::Reconnecting(_) => ConnectionState::Reconnecting,
            Self::Stopped => ConnectionState::Stopped,
        }
    }
}

/// Per-symbol connection supervisor.
pub struct StreamSupervisor {
    subscription: Arc<Subscription>,
    url: String,
    context: SupervisorContext,
    sink: TradeSink,
    cancel: CancellationToken,
}

impl StreamSupervisor {
    /// Create a supervisor for `subscription`, dialing `url` and handing
    /// trades to `sink`.
    #[must_use]
    pub fn new(
        subscription: Arc<Subscription>,
        url: String,
        context: SupervisorContext,
        sink: TradeSink,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            subscription,
            url,
            context,
            sink,
            cancel,
        }
    }

    /// Endpoint this supervisor dials.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Run until cancelled or until the queue consumer is gone.
    ///
    /// The sink is dropped on return.
    pub async fn run(self) {
        let mut consecutive_drops: u32 = 0;
        let mut phase = Phase::Connecting;

        loop {
            self.enter(phase.state());
            phase = match phase {
                Phase::Connecting => self.connect().await,
                Phase::Streaming(upstream) => self.stream(upstream, &mut consecutive_drops).await,
                Phase::Reconnecting(attempt) => self.reconnect(attempt).await,
                Phase::Stopped => break,
            };
        }

        tracing::info!(symbol = %self.subscription.symbol(), "Stream supervisor stopped");
    }

    fn enter(&self, next: ConnectionState) {
        let previous = self.subscription.state();
        if !self.subscription.transition(next) || previous == next {
            return;
        }

        if next == ConnectionState::Streaming {
            metrics::increment_streaming_symbols();
        } else if previous == ConnectionState::Streaming {
            metrics::decrement_streaming_symbols();
        }
    }

    // =========================================================================
    // Phases
    // =========================================================================

    async fn connect(&self) -> Phase {
        if self.cancel.is_cancelled() {
            return Phase::Stopped;
        }

        let symbol = self.subscription.symbol();
        self.subscription.record_connect_attempt();
        metrics::record_connect_attempt(symbol.as_str());
        tracing::info!(symbol = %symbol, url = %self.url, "Connecting to upstream trade stream");

        let result = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return Phase::Stopped,
            result = self.context.connector.connect(&self.url) => result,
        };

        match result {
            Ok(upstream) => {
                tracing::info!(symbol = %symbol, url = %self.url, "Upstream trade stream connected");
                Phase::Streaming(upstream)
            }
            Err(e) => {
                let attempt = self.subscription.record_connect_failure(e.to_string());
                metrics::record_connect_failure(symbol.as_str());
                let delay = self
                    .context
                    .backoff
                    .delay(FailureKind::ConnectFailure, attempt);

                tracing::warn!(
                    symbol = %symbol,
                    url = %self.url,
                    attempt,
                    delay_ms = delay_millis(delay),
                    error = %e,
                    "Upstream connect failed, retrying"
                );

                if self.sleep(delay).await {
                    Phase::Connecting
                } else {
                    Phase::Stopped
                }
            }
        }
    }

    async fn stream(
        &self,
        mut upstream: Box<dyn UpstreamStream>,
        consecutive_drops: &mut u32,
    ) -> Phase {
        loop {
            let message = tokio::select! {
                biased;
                () = self.cancel.cancelled() => return Phase::Stopped,
                message = upstream.next_message() => message,
            };

            match message {
                Ok(payload) => {
                    *consecutive_drops = 0;
                    if !self.forward(&payload).await {
                        return Phase::Stopped;
                    }
                }
                Err(e) => {
                    let symbol = self.subscription.symbol();
                    self.subscription.record_connection_lost(e.to_string());
                    metrics::record_reconnect(symbol.as_str());
                    *consecutive_drops = consecutive_drops.saturating_add(1);

                    tracing::warn!(
                        symbol = %symbol,
                        url = %self.url,
                        error = %e,
                        "Upstream connection lost"
                    );
                    return Phase::Reconnecting(*consecutive_drops);
                }
            }
        }
    }

    async fn reconnect(&self, attempt: u32) -> Phase {
        let delay = self
            .context
            .backoff
            .delay(FailureKind::ConnectionLost, attempt);

        tracing::info!(
            symbol = %self.subscription.symbol(),
            attempt,
            delay_ms = delay_millis(delay),
            "Reconnecting to upstream trade stream"
        );

        if self.sleep(delay).await {
            Phase::Connecting
        } else {
            Phase::Stopped
        }
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    /// Decode one payload and queue the trade. Returns `false` when the
    /// supervisor must stop.
    async fn forward(&self, payload: &[u8]) -> bool {
        let symbol = self.subscription.symbol();

        let trade = match self.context.decoder.decode(payload) {
            Ok(trade) => trade,
            Err(e) => {
                self.subscription.record_decode_error();
                metrics::record_decode_error(e.kind());
                tracing::warn!(
                    symbol = %symbol,
                    kind = e.kind(),
                    error = %e,
                    "Dropping undecodable upstream message"
                );
                return true;
            }
        };

        tokio::select! {
            biased;
            () = self.cancel.cancelled() => false,
            result = self.sink.send(trade) => match result {
                Ok(()) => {
                    self.subscription.record_trade_forwarded();
                    metrics::record_trade_received(symbol.as_str());
                    true
                }
                Err(e) => {
                    tracing::warn!(symbol = %symbol, error = %e, "Trade queue closed");
                    false
                }
            },
        }
    }

    /// Sleep unless cancelled first. Returns `false` on cancellation.
    async fn sleep(&self, delay: Duration) -> bool {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => false,
            () = tokio::time::sleep(delay) => true,
        }
    }
}

fn delay_millis(delay: Duration) -> u64 {
    u64::try_from(delay.as_millis()).unwrap_or(u64::MAX)
}

// =============================================================================
// Tests
// =============================================================================
