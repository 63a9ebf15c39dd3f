//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `StreamSupervisor`: Per-symbol connection lifecycle and retry
//! - `IngestionHub`: Supervisor registry and merged trade queue
//! - `BusPublisher`: Symbol-scoped republishing to the bus
//! - `TradeRelay`: Single consumer draining the merged queue
//! - `FixedBackoff` / `ExponentialBackoff`: Retry delay policies

pub mod backoff;
pub mod hub;
pub mod publisher;
pub mod relay;
pub mod supervisor;

pub use backoff::{DEFAULT_CONNECT_RETRY, DEFAULT_RECONNECT_DELAY, ExponentialBackoff, FixedBackoff};
pub use hub::{HubConfig, HubError, IngestionHub, SubscriptionError};
pub use publisher::{BusPublisher, PublishError};
pub use relay::{RelayStats, TradeRelay};
pub use supervisor::{StreamSupervisor, SupervisorContext};
