#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Trade Ingestion - Market Trade Feed Normalizer
//!
//! Maintains one upstream WebSocket trade stream per symbol, converts every
//! raw trade message into a canonical `NormalizedTrade` with exact decimal
//! price and size, and republishes it on the bus under
//! `market.trade.<symbol>`.
//!
//! # Layers (inside -> outside)
//!
//! - **Domain**: Canonical records and lifecycle state
//!   - `market_data`: Symbols, normalized trades, topic naming
//!   - `subscription`: Per-symbol connection state machine and counters
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Upstream connector, wire decoder, message bus, backoff
//!   - `services`: Stream supervisors, ingestion hub, publisher, relay
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `binance`: WebSocket connector and trade codec
//!   - `queue`: Bounded fan-in queue
//!   - `redis` / `broadcast`: Bus transports
//!   - `config`: Environment configuration
//!   - `health`: Health check HTTP endpoint
//!
//! # Data Flow
//!
//! ```text
//! btcusdt@trade WS -> Supervisor --+
//!                                  |    +-------------+    +-------+
//! ethusdt@trade WS -> Supervisor --+--->| Trade Queue |--->| Relay |--> market.trade.<symbol>
//!                                  |    +-------------+    +-------+
//! solusdt@trade WS -> Supervisor --+
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core market data types with no I/O.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::market_data::{
    NormalizedTrade, Symbol, SymbolError, TradeValidationError, trade_topic,
};
pub use domain::subscription::{ConnectionState, Subscription, SubscriptionSnapshot};

// Ports (and in-memory doubles for integration tests)
pub use application::ports::{
    BackoffPolicy, BusError, ConnectionError, DecodeError, FailureKind, InMemoryMessageBus,
    MessageBus, ScriptedConnector, ScriptedDial, ScriptedMessage, UpstreamConnector,
    UpstreamStream, WireDecoder,
};

// Services
pub use application::services::{
    BusPublisher, ExponentialBackoff, FixedBackoff, HubConfig, HubError, IngestionHub,
    PublishError, RelayStats, StreamSupervisor, SubscriptionError, SupervisorContext, TradeRelay,
};

// Infrastructure config
pub use infrastructure::config::{
    BackoffKind, BackoffSettings, BusBackend, BusSettings, ConfigError, IngestionConfig,
    ServerSettings,
};

// Adapters
pub use infrastructure::binance::{TradeDecoder, WebSocketConnector};
pub use infrastructure::broadcast::{BroadcastBus, BusMessage, TopicFilter, TopicSubscriber};
pub use infrastructure::queue::{QueueError, TradeSink, TradeStream, trade_queue};
pub use infrastructure::redis::RedisBus;

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
