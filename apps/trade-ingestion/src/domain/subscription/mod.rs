//! Subscription State
//!
//! Per-symbol connection lifecycle tracked by the ingestion hub.
//!
//! # State Machine
//!
//! ```text
//!   Idle ──► Connecting ──► Streaming ──► Reconnecting
//!              ▲   │  ▲                       │
//!              │   │  └───────────────────────┘
//!              └───┘ (connect failure + backoff)
//!
//!   any non-terminal state ──► Stopped (cancellation)
//! ```
//!
//! A `Subscription` is written only by the supervisor task that owns the
//! connection. The hub and the health endpoint read snapshots.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use crate::domain::market_data::Symbol;

// =============================================================================
// Connection State
// =============================================================================

/// Connection lifecycle state of one symbol's upstream stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Created, not started.
    Idle,
    /// Dialing the upstream endpoint.
    Connecting,
    /// Connected and reading messages.
    Streaming,
    /// Connection lost, waiting before the next dial.
    Reconnecting,
    /// Terminal: cancelled, no further connection attempts.
    Stopped,
}

impl ConnectionState {
    /// Whether `next` is a legal transition from this state.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Idle | Self::Reconnecting, Self::Connecting)
                | (Self::Connecting, Self::Connecting | Self::Streaming)
                | (Self::Streaming, Self::Reconnecting)
                | (
                    Self::Idle | Self::Connecting | Self::Streaming | Self::Reconnecting,
                    Self::Stopped
                )
        )
    }

    /// Whether this is the terminal state.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped)
    }

    /// State name for logs and metrics labels.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Streaming => "streaming",
            Self::Reconnecting => "reconnecting",
            Self::Stopped => "stopped",
        }
    }
}

// =============================================================================
// Subscription
// =============================================================================

/// Live state for one subscribed symbol.
#[derive(Debug)]
pub struct Subscription {
    symbol: Symbol,
    state: RwLock<ConnectionState>,
    state_changed_at: RwLock<DateTime<Utc>>,
    last_connected_at: RwLock<Option<DateTime<Utc>>>,
    last_error: RwLock<Option<String>>,
    connect_attempts: AtomicU64,
    consecutive_connect_failures: AtomicU32,
    reconnects: AtomicU64,
    trades_forwarded: AtomicU64,
    decode_errors: AtomicU64,
}

impl Subscription {
    /// Create a subscription in the `Idle` state.
    #[must_use]
    pub fn new(symbol: Symbol) -> Self {
        Self {
            symbol,
            state: RwLock::new(ConnectionState::Idle),
            state_changed_at: RwLock::new(Utc::now()),
            last_connected_at: RwLock::new(None),
            last_error: RwLock::new(None),
            connect_attempts: AtomicU64::new(0),
            consecutive_connect_failures: AtomicU32::new(0),
            reconnects: AtomicU64::new(0),
            trades_forwarded: AtomicU64::new(0),
            decode_errors: AtomicU64::new(0),
        }
    }

    /// The subscribed symbol.
    #[must_use]
    pub const fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Move to `next`.
    ///
    /// Returns `false` and leaves the state unchanged if the transition is
    /// not part of the lifecycle.
    pub fn transition(&self, next: ConnectionState) -> bool {
        let mut state = self.state.write();
        if !state.can_transition_to(next) {
            tracing::warn!(
                symbol = %self.symbol,
                from = state.as_str(),
                to = next.as_str(),
                "Rejected illegal subscription state transition"
            );
            return false;
        }

        *state = next;
        drop(state);

        let now = Utc::now();
        *self.state_changed_at.write() = now;
        if next == ConnectionState::Streaming {
            *self.last_connected_at.write() = Some(now);
            self.consecutive_connect_failures.store(0, Ordering::Relaxed);
            *self.last_error.write() = None;
        }
        true
    }

    /// Count a dial attempt.
    pub fn record_connect_attempt(&self) {
        self.connect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a failed dial and return the consecutive failure count.
    pub fn record_connect_failure(&self, error: String) -> u32 {
        *self.last_error.write() = Some(error);
        self.consecutive_connect_failures
            .fetch_add(1, Ordering::Relaxed)
            .saturating_add(1)
    }

    /// Count a lost connection.
    pub fn record_connection_lost(&self, error: String) {
        *self.last_error.write() = Some(error);
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a trade handed to the merged queue.
    pub fn record_trade_forwarded(&self) {
        self.trades_forwarded.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a dropped, undecodable message.
    pub fn record_decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of this subscription.
    #[must_use]
    pub fn snapshot(&self) -> SubscriptionSnapshot {
        SubscriptionSnapshot {
            symbol: self.symbol.to_string(),
            state: self.state(),
            state_changed_at: *self.state_changed_at.read(),
            last_connected_at: *self.last_connected_at.read(),
            last_error: self.last_error.read().clone(),
            connect_attempts: self.connect_attempts.load(Ordering::Relaxed),
            consecutive_connect_failures: self
                .consecutive_connect_failures
                .load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            trades_forwarded: self.trades_forwarded.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
        }
    }
}

/// Serializable copy of a subscription's state and counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionSnapshot {
    /// Subscribed symbol.
    pub symbol: String,
    /// Connection state.
    pub state: ConnectionState,
    /// When the state last changed.
    pub state_changed_at: DateTime<Utc>,
    /// When the stream last reached `Streaming`.
    pub last_connected_at: Option<DateTime<Utc>>,
    /// Most recent connection-layer error.
    pub last_error: Option<String>,
    /// Total dial attempts.
    pub connect_attempts: u64,
    /// Dial failures since the last successful connect.
    pub consecutive_connect_failures: u32,
    /// Connections lost while streaming.
    pub reconnects: u64,
    /// Trades handed to the merged queue.
    pub trades_forwarded: u64,
    /// Messages dropped as undecodable.
    pub decode_errors: u64,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn subscription() -> Subscription {
        Subscription::new(Symbol::parse("BTCUSDT").unwrap())
    }

    #[test]
    fn lifecycle_edges() {
        use ConnectionState::{Connecting, Idle, Reconnecting, Stopped, Streaming};

        assert!(Idle.can_transition_to(Connecting));
        assert!(Connecting.can_transition_to(Streaming));
        assert!(Connecting.can_transition_to(Connecting));
        assert!(Streaming.can_transition_to(Reconnecting));
        assert!(Reconnecting.can_transition_to(Connecting));

        for state in [Idle, Connecting, Streaming, Reconnecting] {
            assert!(state.can_transition_to(Stopped));
        }
    }

    #[test]
    fn illegal_edges() {
        use ConnectionState::{Connecting, Idle, Reconnecting, Stopped, Streaming};

        assert!(!Idle.can_transition_to(Streaming));
        assert!(!Streaming.can_transition_to(Connecting));
        assert!(!Reconnecting.can_transition_to(Streaming));
        assert!(!Connecting.can_transition_to(Reconnecting));
        for state in [Idle, Connecting, Streaming, Reconnecting, Stopped] {
            assert!(!Stopped.can_transition_to(state));
        }
    }

    #[test]
    fn stopped_is_terminal() {
        assert!(ConnectionState::Stopped.is_terminal());
        assert!(!ConnectionState::Reconnecting.is_terminal());
    }

    #[test]
    fn new_subscription_is_idle() {
        let sub = subscription();
        assert_eq!(sub.state(), ConnectionState::Idle);
        assert_eq!(sub.snapshot().connect_attempts, 0);
    }

    #[test]
    fn transition_rejects_illegal_move() {
        let sub = subscription();
        assert!(!sub.transition(ConnectionState::Streaming));
        assert_eq!(sub.state(), ConnectionState::Idle);
    }

    #[test]
    fn streaming_resets_failures_and_error() {
        let sub = subscription();
        assert!(sub.transition(ConnectionState::Connecting));
        assert_eq!(sub.record_connect_failure("refused".to_string()), 1);
        assert_eq!(sub.record_connect_failure("refused".to_string()), 2);
        assert_eq!(sub.snapshot().last_error.as_deref(), Some("refused"));

        assert!(sub.transition(ConnectionState::Streaming));
        let snapshot = sub.snapshot();
        assert_eq!(snapshot.consecutive_connect_failures, 0);
        assert!(snapshot.last_error.is_none());
        assert!(snapshot.last_connected_at.is_some());
    }

    #[test]
    fn counters_accumulate() {
        let sub = subscription();
        sub.record_connect_attempt();
        sub.record_connect_attempt();
        sub.record_trade_forwarded();
        sub.record_decode_error();
        sub.record_connection_lost("reset".to_string());

        let snapshot = sub.snapshot();
        assert_eq!(snapshot.connect_attempts, 2);
        assert_eq!(snapshot.trades_forwarded, 1);
        assert_eq!(snapshot.decode_errors, 1);
        assert_eq!(snapshot.reconnects, 1);
    }

    #[test]
    fn snapshot_serializes_state_lowercase() {
        let sub = subscription();
        let value = serde_json::to_value(sub.snapshot()).unwrap();
        assert_eq!(value["state"], "idle");
        assert_eq!(value["symbol"], "BTCUSDT");
    }
}
