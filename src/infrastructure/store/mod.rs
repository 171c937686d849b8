//! Store Module
//!
//! Shared key/value store connection management, the generic store trait and
//! its Redis implementation, and the key expiration bridge.

mod expiry_bridge;
mod kv_store;

pub use expiry_bridge::{expired_channel, ExpiryBridge};
pub use kv_store::{KeyTtl, KeyValueStore, MessageHandler, RedisStore};

use std::time::Duration;

use redis::aio::ConnectionManager;
use redis::Client;
use tracing::{error, info, instrument};

use crate::config::RedisSettings;
use crate::shared::error::AppError;

/// Reconnect delay for a given attempt: grows by 50ms per attempt, capped
/// at two seconds. Attempts are unbounded.
pub(crate) fn retry_delay(attempt: u64) -> Duration {
    Duration::from_millis((attempt * 50).min(2000))
}

/// Connects to Redis and returns a ready `RedisStore`.
///
/// Connection establishment retries forever with capped backoff; connection
/// errors are logged, not fatal. Once connected, the underlying
/// `ConnectionManager` reconnects on its own, and individual commands issued
/// while disconnected fail fast rather than hang.
#[instrument(skip(settings), fields(host = %settings.host, port = settings.port, db = settings.db))]
pub async fn connect(settings: &RedisSettings) -> Result<RedisStore, AppError> {
    let client = Client::open(settings.url())?;

    let mut attempt: u64 = 0;
    let conn: ConnectionManager = loop {
        match ConnectionManager::new(client.clone()).await {
            Ok(conn) => break conn,
            Err(e) => {
                attempt += 1;
                let delay = retry_delay(attempt);
                error!(error = %e, attempt, ?delay, "Redis connection error, retrying");
                tokio::time::sleep(delay).await;
            }
        }
    };
    info!("Redis connection established");

    let timeout = Duration::from_millis(settings.command_timeout_ms);
    let store = if settings.key_prefix.is_empty() {
        RedisStore::new(client, conn, timeout)
    } else {
        RedisStore::with_prefix(client, conn, timeout, settings.key_prefix.as_str())
    };

    Ok(store)
}
