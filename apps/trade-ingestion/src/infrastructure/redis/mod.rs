//! Redis Bus Adapter
//!
//! `MessageBus` over Redis `PUBLISH`. Consumers subscribe with `SUBSCRIBE
//! market.trade.BTCUSDT` or `PSUBSCRIBE market.trade.*`.
//!
//! The connection is established on first use and then shared through a
//! `ConnectionManager`, which reconnects on its own. A publish that fails is
//! reported once and not retried.

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::Client;
use redis::aio::ConnectionManager;
use tokio::sync::Mutex;

use crate::application::ports::{BusError, MessageBus};

/// Default Redis address when none is configured.
pub const DEFAULT_REDIS_URL: &str = "redis://localhost:6379";

/// Redis-backed message bus.
pub struct RedisBus {
    client: Client,
    connection: Mutex<Option<ConnectionManager>>,
}

impl std::fmt::Debug for RedisBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisBus")
            .field("addr", &self.client.get_connection_info().addr)
            .finish_non_exhaustive()
    }
}

impl RedisBus {
    /// Create a bus for `url` (e.g. `redis://localhost:6379`). Does not
    /// connect.
    ///
    /// # Errors
    ///
    /// Returns `BusError::Connection` if the URL is invalid.
    pub fn new(url: &str) -> Result<Self, BusError> {
        let client = Client::open(url).map_err(|e| BusError::Connection(e.to_string()))?;
        Ok(Self {
            client,
            connection: Mutex::new(None),
        })
    }

    /// Check that Redis answers `PING`.
    ///
    /// # Errors
    ///
    /// Returns `BusError::Connection` if Redis is unreachable.
    pub async fn ping(&self) -> Result<(), BusError> {
        let mut conn = self.connection().await?;
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| BusError::Connection(e.to_string()))?;
        Ok(())
    }

    async fn connection(&self) -> Result<ConnectionManager, BusError> {
        let mut guard = self.connection.lock().await;
        if let Some(conn) = guard.as_ref() {
            return Ok(conn.clone());
        }

        let conn = ConnectionManager::new(self.client.clone())
            .await
            .map_err(|e| BusError::Connection(e.to_string()))?;
        tracing::info!(addr = ?self.client.get_connection_info().addr, "Connected to Redis");

        *guard = Some(conn.clone());
        drop(guard);
        Ok(conn)
    }
}

#[async_trait]
impl MessageBus for RedisBus {
    async fn publish(&self, topic: &str, payload: String) -> Result<(), BusError> {
        let mut conn = self.connection().await?;
        conn.publish::<_, _, ()>(topic, payload)
            .await
            .map_err(|e| {
                if e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() {
                    BusError::Connection(e.to_string())
                } else {
                    BusError::Rejected(e.to_string())
                }
            })
    }
}
