//! Domain Layer - Core market data types and subscription lifecycle.
//!
//! This layer contains the canonical record types and the per-symbol
//! connection state machine. Nothing here performs I/O.

/// Canonical market data records (trades, quotes, symbols).
pub mod market_data;

/// Per-symbol subscription lifecycle and counters.
pub mod subscription;
