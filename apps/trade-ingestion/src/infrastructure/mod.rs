//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer.

/// Binance trade stream adapters (WebSocket connector, wire codec).
pub mod binance;

/// In-process broadcast bus.
pub mod broadcast;

/// Configuration loading.
pub mod config;

/// Health check HTTP endpoint.
pub mod health;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Bounded fan-in queue between supervisors and the relay.
pub mod queue;

/// Redis bus adapter.
pub mod redis;

/// OpenTelemetry tracing integration.
pub mod telemetry;
