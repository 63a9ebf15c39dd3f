//! Ingestion Configuration Settings
//!
//! Configuration types for the ingestion service, loaded from environment
//! variables. Malformed numbers fall back to their defaults; values that
//! would leave the service unable to run are rejected.

use std::sync::Arc;
use std::time::Duration;

use crate::application::ports::BackoffPolicy;
use crate::application::services::{
    DEFAULT_CONNECT_RETRY, DEFAULT_RECONNECT_DELAY, ExponentialBackoff, FixedBackoff, HubConfig,
};
use crate::infrastructure::binance::{BINANCE_EXCHANGE, DEFAULT_STREAM_BASE_URL};
use crate::infrastructure::queue::DEFAULT_QUEUE_CAPACITY;
use crate::infrastructure::redis::DEFAULT_REDIS_URL;

/// Symbols ingested when `INGEST_SYMBOLS` is unset.
pub const DEFAULT_SYMBOLS: [&str; 3] = ["btcusdt", "ethusdt", "solusdt"];

/// Backoff strategy between upstream connection attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackoffKind {
    /// Constant delay per failure kind.
    #[default]
    Fixed,
    /// Exponential growth with jitter.
    Exponential,
}

impl BackoffKind {
    /// Parse a strategy name.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::UnknownBackoff` for anything other than
    /// `fixed` or `exponential`.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        match s.trim().to_lowercase().as_str() {
            "fixed" => Ok(Self::Fixed),
            "exponential" => Ok(Self::Exponential),
            other => Err(ConfigError::UnknownBackoff(other.to_string())),
        }
    }

    /// Strategy name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Fixed => "fixed",
            Self::Exponential => "exponential",
        }
    }
}

/// Bus transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BusBackend {
    /// Redis `PUBLISH`.
    #[default]
    Redis,
    /// In-process broadcast channel.
    Memory,
}

impl BusBackend {
    /// Parse a backend name.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::UnknownBusBackend` for anything other than
    /// `redis` or `memory`.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        match s.trim().to_lowercase().as_str() {
            "redis" => Ok(Self::Redis),
            "memory" => Ok(Self::Memory),
            other => Err(ConfigError::UnknownBusBackend(other.to_string())),
        }
    }

    /// Backend name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Redis => "redis",
            Self::Memory => "memory",
        }
    }
}

/// Upstream reconnect settings.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffSettings {
    /// Strategy.
    pub kind: BackoffKind,
    /// Wait after a failed dial (first wait for exponential).
    pub connect_retry: Duration,
    /// Wait after a dropped connection (first wait for exponential).
    pub reconnect_delay: Duration,
    /// Upper bound for exponential waits.
    pub max_delay: Duration,
}

impl Default for BackoffSettings {
    fn default() -> Self {
        Self {
            kind: BackoffKind::Fixed,
            connect_retry: DEFAULT_CONNECT_RETRY,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            max_delay: Duration::from_secs(60),
        }
    }
}

impl BackoffSettings {
    /// Build the configured policy.
    #[must_use]
    pub fn policy(&self) -> Arc<dyn BackoffPolicy> {
        match self.kind {
            BackoffKind::Fixed => {
                Arc::new(FixedBackoff::new(self.connect_retry, self.reconnect_delay))
            }
            BackoffKind::Exponential => Arc::new(ExponentialBackoff {
                initial_delay: self.connect_retry,
                reconnect_delay: self.reconnect_delay,
                max_delay: self.max_delay,
                ..ExponentialBackoff::default()
            }),
        }
    }
}

/// Bus settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusSettings {
    /// Transport.
    pub backend: BusBackend,
    /// Redis URL (used by the Redis backend).
    pub redis_url: String,
}

impl Default for BusSettings {
    fn default() -> Self {
        Self {
            backend: BusBackend::Redis,
            redis_url: DEFAULT_REDIS_URL.to_string(),
        }
    }
}

/// Server port settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    /// Health check and metrics HTTP port.
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { health_port: 8083 }
    }
}

/// Complete ingestion configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestionConfig {
    /// Bootstrap symbols, in subscription order.
    pub symbols: Vec<String>,
    /// Exchange tag stamped on every trade.
    pub exchange: String,
    /// Upstream stream base URL.
    pub stream_base_url: String,
    /// Bound of the merged trade queue.
    pub queue_capacity: usize,
    /// Reconnect policy settings.
    pub backoff: BackoffSettings,
    /// Bus settings.
    pub bus: BusSettings,
    /// Server port settings.
    pub server: ServerSettings,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            symbols: DEFAULT_SYMBOLS.iter().map(ToString::to_string).collect(),
            exchange: BINANCE_EXCHANGE.to_string(),
            stream_base_url: DEFAULT_STREAM_BASE_URL.to_string(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            backoff: BackoffSettings::default(),
            bus: BusSettings::default(),
            server: ServerSettings::default(),
        }
    }
}

impl IngestionConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the symbol list is empty, the queue capacity is
    /// zero, or the backoff or bus backend name is unknown.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable source.
    ///
    /// Empty values are treated as unset.
    ///
    /// # Errors
    ///
    /// Same as [`IngestionConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let symbols = match var("INGEST_SYMBOLS") {
            Some(raw) => parse_symbol_list(&raw)?,
            None => defaults.symbols,
        };

        let queue_capacity = parse_or(var("INGEST_QUEUE_CAPACITY"), defaults.queue_capacity);
        if queue_capacity == 0 {
            return Err(ConfigError::ZeroQueueCapacity);
        }

        let backoff = BackoffSettings {
            kind: var("INGEST_BACKOFF")
                .map(|s| BackoffKind::parse(&s))
                .transpose()?
                .unwrap_or_default(),
            connect_retry: parse_secs_or(
                var("INGEST_CONNECT_RETRY_SECS"),
                defaults.backoff.connect_retry,
            ),
            reconnect_delay: parse_secs_or(
                var("INGEST_RECONNECT_DELAY_SECS"),
                defaults.backoff.reconnect_delay,
            ),
            max_delay: parse_secs_or(var("INGEST_BACKOFF_MAX_SECS"), defaults.backoff.max_delay),
        };

        let bus = BusSettings {
            backend: var("BUS_BACKEND")
                .map(|s| BusBackend::parse(&s))
                .transpose()?
                .unwrap_or_default(),
            redis_url: var("REDIS_ADDR")
                .or_else(|| var("REDIS_URL"))
                .map_or(defaults.bus.redis_url, |addr| normalize_redis_url(&addr)),
        };

        let server = ServerSettings {
            health_port: parse_or(var("INGEST_HEALTH_PORT"), defaults.server.health_port),
        };

        Ok(Self {
            symbols,
            exchange: var("INGEST_EXCHANGE").unwrap_or(defaults.exchange),
            stream_base_url: var("BINANCE_STREAM_URL").unwrap_or(defaults.stream_base_url),
            queue_capacity,
            backoff,
            bus,
            server,
        })
    }

    /// Hub settings derived from this configuration.
    #[must_use]
    pub fn hub_config(&self) -> HubConfig {
        HubConfig {
            stream_base_url: self.stream_base_url.clone(),
            queue_capacity: self.queue_capacity,
        }
    }
}

/// Configuration error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// No symbols to ingest.
    #[error("INGEST_SYMBOLS must name at least one symbol")]
    EmptySymbols,
    /// Merged queue would hold nothing.
    #[error("INGEST_QUEUE_CAPACITY must be at least 1")]
    ZeroQueueCapacity,
    /// Unknown `INGEST_BACKOFF` value.
    #[error("unknown backoff strategy '{0}' (expected fixed or exponential)")]
    UnknownBackoff(String),
    /// Unknown `BUS_BACKEND` value.
    #[error("unknown bus backend '{0}' (expected redis or memory)")]
    UnknownBusBackend(String),
}

fn parse_symbol_list(raw: &str) -> Result<Vec<String>, ConfigError> {
    let symbols: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect();

    if symbols.is_empty() {
        return Err(ConfigError::EmptySymbols);
    }
    Ok(symbols)
}

fn normalize_redis_url(addr: &str) -> String {
    let addr = addr.trim();
    if addr.contains("://") {
        addr.to_string()
    } else {
        format!("redis://{addr}")
    }
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, default: T) -> T {
    value
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Zero is treated as malformed.
fn parse_secs_or(value: Option<String>, default: Duration) -> Duration {
    value
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|&secs| secs > 0)
        .map_or(default, Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::application::ports::FailureKind;

    fn config_from(vars: &[(&str, &str)]) -> Result<IngestionConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        IngestionConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        let config = config_from(&[]).unwrap();

        assert_eq!(config.symbols, vec!["btcusdt", "ethusdt", "solusdt"]);
        assert_eq!(config.exchange, "Binance");
        assert_eq!(config.stream_base_url, "wss://stream.binance.com:9443/ws");
        assert_eq!(config.queue_capacity, 100);
        assert_eq!(config.backoff, BackoffSettings::default());
        assert_eq!(config.bus.backend, BusBackend::Redis);
        assert_eq!(config.bus.redis_url, "redis://localhost:6379");
        assert_eq!(config.server.health_port, 8083);
        assert_eq!(config, IngestionConfig::default());
    }

    #[test]
    fn symbol_list_keeps_order_and_case() {
        let config = config_from(&[("INGEST_SYMBOLS", " SOLUSDT, btcusdt ,,EthUsdt")]).unwrap();
        assert_eq!(config.symbols, vec!["SOLUSDT", "btcusdt", "EthUsdt"]);
    }

    #[test]
    fn symbol_list_of_separators_is_rejected() {
        assert_eq!(
            config_from(&[("INGEST_SYMBOLS", " , ,")]).unwrap_err(),
            ConfigError::EmptySymbols
        );
    }

    #[test]
    fn zero_queue_capacity_is_rejected() {
        assert_eq!(
            config_from(&[("INGEST_QUEUE_CAPACITY", "0")]).unwrap_err(),
            ConfigError::ZeroQueueCapacity
        );
    }

    #[test]
    fn malformed_numbers_fall_back_to_defaults() {
        let config = config_from(&[
            ("INGEST_QUEUE_CAPACITY", "lots"),
            ("INGEST_CONNECT_RETRY_SECS", "-3"),
            ("INGEST_HEALTH_PORT", "99999"),
        ])
        .unwrap();

        assert_eq!(config.queue_capacity, 100);
        assert_eq!(config.backoff.connect_retry, Duration::from_secs(5));
        assert_eq!(config.server.health_port, 8083);
    }

    #[test]
    fn redis_addr_takes_precedence_and_gets_scheme() {
        let config = config_from(&[
            ("REDIS_ADDR", "cache:6380"),
            ("REDIS_URL", "redis://other:6379"),
        ])
        .unwrap();
        assert_eq!(config.bus.redis_url, "redis://cache:6380");

        let config = config_from(&[("REDIS_URL", "rediss://secure:6379")]).unwrap();
        assert_eq!(config.bus.redis_url, "rediss://secure:6379");
    }

    #[test]
    fn backend_and_backoff_parsing() {
        let config = config_from(&[("BUS_BACKEND", "Memory"), ("INGEST_BACKOFF", "EXPONENTIAL")])
            .unwrap();
        assert_eq!(config.bus.backend, BusBackend::Memory);
        assert_eq!(config.backoff.kind, BackoffKind::Exponential);

        assert_eq!(
            config_from(&[("BUS_BACKEND", "kafka")]).unwrap_err(),
            ConfigError::UnknownBusBackend("kafka".to_string())
        );
        assert_eq!(
            config_from(&[("INGEST_BACKOFF", "linear")]).unwrap_err(),
            ConfigError::UnknownBackoff("linear".to_string())
        );
    }

    #[test]
    fn fixed_policy_uses_configured_intervals() {
        let config = config_from(&[
            ("INGEST_CONNECT_RETRY_SECS", "2"),
            ("INGEST_RECONNECT_DELAY_SECS", "3"),
        ])
        .unwrap();
        let policy = config.backoff.policy();

        assert_eq!(
            policy.delay(FailureKind::ConnectFailure, 3),
            Duration::from_secs(2)
        );
        assert_eq!(
            policy.delay(FailureKind::ConnectionLost, 1),
            Duration::from_secs(3)
        );
    }

    #[test]
    fn zero_waits_fall_back_to_defaults() {
        let config = config_from(&[
            ("INGEST_CONNECT_RETRY_SECS", "0"),
            ("INGEST_RECONNECT_DELAY_SECS", "0"),
            ("INGEST_BACKOFF_MAX_SECS", "0"),
        ])
        .unwrap();

        assert_eq!(config.backoff, BackoffSettings::default());

        let policy = config.backoff.policy();
        assert_eq!(
            policy.delay(FailureKind::ConnectFailure, 1),
            Duration::from_secs(5)
        );
        assert_eq!(
            policy.delay(FailureKind::ConnectionLost, 1),
            Duration::from_secs(1)
        );
    }

    #[test]
    fn hub_config_follows_settings() {
        let config = config_from(&[
            ("BINANCE_STREAM_URL", "ws://localhost:9000/ws"),
            ("INGEST_QUEUE_CAPACITY", "7"),
        ])
        .unwrap();
        let hub = config.hub_config();

        assert_eq!(hub.stream_base_url, "ws://localhost:9000/ws");
        assert_eq!(hub.queue_capacity, 7);
    }

    #[test]
    fn names_round_trip() {
        for kind in [BackoffKind::Fixed, BackoffKind::Exponential] {
            assert_eq!(BackoffKind::parse(kind.as_str()).unwrap(), kind);
        }
        for backend in [BusBackend::Redis, BusBackend::Memory] {
            assert_eq!(BusBackend::parse(backend.as_str()).unwrap(), backend);
        }
    }
}
