//! Key/Value Store
//!
//! Generic store trait and Redis implementation.
//!
//! This module provides:
//! - A `KeyValueStore` trait covering the string, hash, counter, set, list,
//!   transaction, scripting and pub/sub capabilities the gateway relies on
//! - A `RedisStore` implementation over a shared `ConnectionManager`
//!
//! Values are opaque strings at this boundary; callers own any schema.
//!
//! # Example
//!
//! ```rust,ignore
//! use presence_gateway::infrastructure::store::{KeyValueStore, RedisStore};
//!
//! let store = RedisStore::new(client, conn, Duration::from_secs(5));
//!
//! store.hset("socket:users", "u1", "conn-1").await?;
//! let handle = store.hget("socket:users", "u1").await?;
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use tokio::time::timeout;
use tracing::{debug, error, instrument};

use crate::shared::error::AppError;

/// Remaining lifetime of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
    /// Key exists and expires in this many seconds
    Seconds(i64),
    /// Key exists but carries no expiration
    NoExpiry,
    /// Key does not exist
    Missing,
}

impl KeyTtl {
    /// Map the raw TTL reply (-2 = absent, -1 = no expiry) to the enum.
    pub fn from_code(code: i64) -> Self {
        match code {
            -2 => KeyTtl::Missing,
            -1 => KeyTtl::NoExpiry,
            seconds => KeyTtl::Seconds(seconds),
        }
    }
}

/// Callback invoked with `(channel, message)` for every message published to
/// a subscribed channel.
pub type MessageHandler = Box<dyn Fn(String, String) + Send + Sync>;

/// Store trait abstracting the shared key/value and pub/sub backend.
///
/// All operations are async and return `Result<T, AppError>`. Operations
/// issued while the backend is unreachable fail fast with
/// `AppError::StoreUnavailable`; nothing is queued or replayed.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Stores a string value, optionally with a TTL in seconds.
    async fn set(&self, key: &str, value: &str, ttl: Option<u64>) -> Result<(), AppError>;

    /// Retrieves a value by key.
    async fn get(&self, key: &str) -> Result<Option<String>, AppError>;

    /// Deletes one or more keys, returning how many existed.
    async fn del(&self, keys: &[&str]) -> Result<u64, AppError>;

    /// Counts how many of the given keys exist.
    async fn exists(&self, keys: &[&str]) -> Result<u64, AppError>;

    /// Sets an expiration on a key. Returns false if the key does not exist.
    async fn expire(&self, key: &str, seconds: i64) -> Result<bool, AppError>;

    /// Retrieves the remaining lifetime of a key.
    async fn ttl(&self, key: &str) -> Result<KeyTtl, AppError>;

    /// Sets a hash field. Overwrites any previous value for the field.
    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), AppError>;

    /// Gets a hash field.
    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, AppError>;

    /// Gets all fields and values of a hash.
    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, AppError>;

    /// Removes a field from a hash. Returns false if the field was absent.
    async fn hdel(&self, key: &str, field: &str) -> Result<bool, AppError>;

    /// Increments an integer value, returning the new value.
    async fn incr(&self, key: &str, by: i64) -> Result<i64, AppError>;

    /// Adds members to a set, returning how many were newly added.
    async fn sadd(&self, key: &str, members: &[&str]) -> Result<u64, AppError>;

    /// Gets all members of a set.
    async fn smembers(&self, key: &str) -> Result<Vec<String>, AppError>;

    /// Pushes a value to the end of a list, returning the new length.
    async fn rpush(&self, key: &str, value: &str) -> Result<u64, AppError>;

    /// Gets a range of list values.
    async fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>, AppError>;

    /// Removes and returns the first element of a list.
    async fn lpop(&self, key: &str) -> Result<Option<String>, AppError>;

    /// Executes the given commands as one atomic batch.
    ///
    /// An aborted batch yields an empty result list. If any command inside
    /// the batch fails, the whole call fails with that command's error and
    /// callers must not assume partial application. Command arguments are
    /// passed through verbatim, without the configured key prefix.
    async fn transaction(&self, ops: &[Vec<String>]) -> Result<Vec<redis::Value>, AppError>;

    /// Executes a Lua script atomically on the server. Keys and arguments
    /// are passed through verbatim, without the configured key prefix.
    async fn eval(
        &self,
        script: &str,
        keys: &[&str],
        args: &[&str],
    ) -> Result<redis::Value, AppError>;

    /// Publishes a message, returning the number of subscribers reached.
    async fn publish(&self, channel: &str, message: &str) -> Result<u64, AppError>;

    /// Subscribes to a channel on a dedicated connection and invokes the
    /// callback for every message published to it, for the lifetime of the
    /// subscription.
    async fn subscribe(&self, channel: &str, on_message: MessageHandler) -> Result<(), AppError>;
}

/// Formats a key with the optional prefix.
fn format_key(prefix: &Option<Arc<str>>, key: &str) -> String {
    match prefix {
        Some(prefix) => format!("{}{}", prefix, key),
        None => key.to_string(),
    }
}

/// Redis-backed store implementation.
///
/// Regular commands go through a shared `ConnectionManager` that reconnects
/// on its own; pub/sub subscriptions open a dedicated connection because a
/// subscribing connection cannot issue regular commands.
#[derive(Clone)]
pub struct RedisStore {
    /// Client handle, kept for opening dedicated pub/sub connections
    client: Client,
    /// Shared connection with automatic reconnection
    conn: ConnectionManager,
    /// Optional key prefix for namespacing
    prefix: Option<Arc<str>>,
    /// Bound on every command round-trip
    command_timeout: Duration,
}

impl RedisStore {
    pub fn new(client: Client, conn: ConnectionManager, command_timeout: Duration) -> Self {
        Self {
            client,
            conn,
            prefix: None,
            command_timeout,
        }
    }

    /// Creates a store that prepends `prefix` to every key.
    pub fn with_prefix(
        client: Client,
        conn: ConnectionManager,
        command_timeout: Duration,
        prefix: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            client,
            conn,
            prefix: Some(prefix.into()),
            command_timeout,
        }
    }

    fn format_key(&self, key: &str) -> String {
        format_key(&self.prefix, key)
    }

    /// Runs a command future under the configured timeout. An elapsed
    /// timeout means the store is unreachable; the call is not retried.
    async fn run<T>(
        &self,
        fut: impl Future<Output = redis::RedisResult<T>> + Send,
    ) -> Result<T, AppError> {
        match timeout(self.command_timeout, fut).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(AppError::StoreUnavailable(format!(
                "command timed out after {:?}",
                self.command_timeout
            ))),
        }
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    #[instrument(skip(self, value), level = "debug")]
    async fn set(&self, key: &str, value: &str, ttl: Option<u64>) -> Result<(), AppError> {
        let full_key = self.format_key(key);
        let mut conn = self.conn.clone();

        match ttl {
            Some(seconds) => {
                let _: () = self.run(conn.set_ex(&full_key, value, seconds)).await?;
            }
            None => {
                let _: () = self.run(conn.set(&full_key, value)).await?;
            }
        }
        debug!(key = %full_key, ttl = ?ttl, "Store set");

        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        let full_key = self.format_key(key);
        let mut conn = self.conn.clone();

        self.run(conn.get(&full_key)).await
    }

    #[instrument(skip(self), level = "debug")]
    async fn del(&self, keys: &[&str]) -> Result<u64, AppError> {
        if keys.is_empty() {
            return Ok(0);
        }

        let full_keys: Vec<String> = keys.iter().map(|k| self.format_key(k)).collect();
        let mut conn = self.conn.clone();

        let deleted: u64 = self.run(conn.del(full_keys.as_slice())).await?;
        debug!(count = deleted, "Store delete");

        Ok(deleted)
    }

    #[instrument(skip(self), level = "debug")]
    async fn exists(&self, keys: &[&str]) -> Result<u64, AppError> {
        if keys.is_empty() {
            return Ok(0);
        }

        let full_keys: Vec<String> = keys.iter().map(|k| self.format_key(k)).collect();
        let mut conn = self.conn.clone();

        self.run(conn.exists(full_keys.as_slice())).await
    }

    #[instrument(skip(self), level = "debug")]
    async fn expire(&self, key: &str, seconds: i64) -> Result<bool, AppError> {
        let full_key = self.format_key(key);
        let mut conn = self.conn.clone();

        // EXPIRE returns 1 if the timeout was set, 0 if the key is absent
        let result: i64 = self.run(conn.expire(&full_key, seconds)).await?;

        Ok(result == 1)
    }

    #[instrument(skip(self), level = "debug")]
    async fn ttl(&self, key: &str) -> Result<KeyTtl, AppError> {
        let full_key = self.format_key(key);
        let mut conn = self.conn.clone();

        let code: i64 = self.run(conn.ttl(&full_key)).await?;

        Ok(KeyTtl::from_code(code))
    }

    #[instrument(skip(self, value), level = "debug")]
    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), AppError> {
        let full_key = self.format_key(key);
        let mut conn = self.conn.clone();

        let _: i64 = self.run(conn.hset(&full_key, field, value)).await?;
        debug!(key = %full_key, field = %field, "Store hash set");

        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, AppError> {
        let full_key = self.format_key(key);
        let mut conn = self.conn.clone();

        self.run(conn.hget(&full_key, field)).await
    }

    #[instrument(skip(self), level = "debug")]
    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, AppError> {
        let full_key = self.format_key(key);
        let mut conn = self.conn.clone();

        self.run(conn.hgetall(&full_key)).await
    }

    #[instrument(skip(self), level = "debug")]
    async fn hdel(&self, key: &str, field: &str) -> Result<bool, AppError> {
        let full_key = self.format_key(key);
        let mut conn = self.conn.clone();

        let removed: i64 = self.run(conn.hdel(&full_key, field)).await?;
        debug!(key = %full_key, field = %field, removed = removed > 0, "Store hash delete");

        Ok(removed > 0)
    }

    #[instrument(skip(self), level = "debug")]
    async fn incr(&self, key: &str, by: i64) -> Result<i64, AppError> {
        let full_key = self.format_key(key);
        let mut conn = self.conn.clone();

        self.run(conn.incr(&full_key, by)).await
    }

    #[instrument(skip(self), level = "debug")]
    async fn sadd(&self, key: &str, members: &[&str]) -> Result<u64, AppError> {
        if members.is_empty() {
            return Ok(0);
        }

        let full_key = self.format_key(key);
        let mut conn = self.conn.clone();

        self.run(conn.sadd(&full_key, members)).await
    }

    #[instrument(skip(self), level = "debug")]
    async fn smembers(&self, key: &str) -> Result<Vec<String>, AppError> {
        let full_key = self.format_key(key);
        let mut conn = self.conn.clone();

        self.run(conn.smembers(&full_key)).await
    }

    #[instrument(skip(self, value), level = "debug")]
    async fn rpush(&self, key: &str, value: &str) -> Result<u64, AppError> {
        let full_key = self.format_key(key);
        let mut conn = self.conn.clone();

        self.run(conn.rpush(&full_key, value)).await
    }

    #[instrument(skip(self), level = "debug")]
    async fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>, AppError> {
        let full_key = self.format_key(key);
        let mut conn = self.conn.clone();

        self.run(conn.lrange(&full_key, start as isize, stop as isize))
            .await
    }

    #[instrument(skip(self), level = "debug")]
    async fn lpop(&self, key: &str) -> Result<Option<String>, AppError> {
        let full_key = self.format_key(key);
        let mut conn = self.conn.clone();

        self.run(conn.lpop(&full_key, None)).await
    }

    #[instrument(skip(self, ops), level = "debug")]
    async fn transaction(&self, ops: &[Vec<String>]) -> Result<Vec<redis::Value>, AppError> {
        let mut pipe = redis::pipe();
        pipe.atomic();

        for op in ops {
            let (name, args) = op
                .split_first()
                .ok_or_else(|| AppError::Internal("empty command in transaction".into()))?;
            pipe.cmd(name);
            for arg in args {
                pipe.arg(arg);
            }
        }

        let mut conn = self.conn.clone();

        // EXEC replies nil when the batch is aborted; that maps to an empty
        // result list, indistinguishable from a batch producing nothing.
        let results: Option<Vec<redis::Value>> = self.run(pipe.query_async(&mut conn)).await?;
        debug!(commands = ops.len(), aborted = results.is_none(), "Store transaction");

        Ok(results.unwrap_or_default())
    }

    #[instrument(skip(self, script, keys, args), level = "debug")]
    async fn eval(
        &self,
        script: &str,
        keys: &[&str],
        args: &[&str],
    ) -> Result<redis::Value, AppError> {
        let mut cmd = redis::cmd("EVAL");
        cmd.arg(script).arg(keys.len());
        for key in keys {
            cmd.arg(*key);
        }
        for arg in args {
            cmd.arg(*arg);
        }

        let mut conn = self.conn.clone();

        self.run(cmd.query_async(&mut conn)).await
    }

    #[instrument(skip(self, message), level = "debug")]
    async fn publish(&self, channel: &str, message: &str) -> Result<u64, AppError> {
        let mut conn = self.conn.clone();

        let receivers: u64 = self.run(conn.publish(channel, message)).await?;
        debug!(channel = %channel, receivers = receivers, "Store publish");

        Ok(receivers)
    }

    async fn subscribe(&self, channel: &str, on_message: MessageHandler) -> Result<(), AppError> {
        // Pub/sub consumes its connection exclusively, so each subscription
        // gets a dedicated one instead of sharing the command connection.
        let mut pubsub = self.run(self.client.get_async_pubsub()).await?;
        self.run(pubsub.subscribe(channel)).await?;

        let channel = channel.to_string();
        tokio::spawn(async move {
            use futures::StreamExt;

            let mut stream = pubsub.on_message();
            while let Some(msg) = stream.next().await {
                let payload: String = match msg.get_payload() {
                    Ok(payload) => payload,
                    Err(e) => {
                        error!(channel = %channel, error = %e, "Dropping undecodable pub/sub payload");
                        continue;
                    }
                };
                on_message(msg.get_channel_name().to_string(), payload);
            }
            debug!(channel = %channel, "Subscription stream ended");
        });

        Ok(())
    }
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("prefix", &self.prefix)
            .field("command_timeout", &self.command_timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(-2, KeyTtl::Missing ; "absent key")]
    #[test_case(-1, KeyTtl::NoExpiry ; "key without expiry")]
    #[test_case(0, KeyTtl::Seconds(0) ; "expiring now")]
    #[test_case(42, KeyTtl::Seconds(42) ; "expiring later")]
    fn ttl_codes(code: i64, expected: KeyTtl) {
        assert_eq!(KeyTtl::from_code(code), expected);
    }

    #[test]
    fn format_key_without_prefix() {
        let prefix: Option<Arc<str>> = None;
        assert_eq!(format_key(&prefix, "socket:users"), "socket:users");
    }

    #[test]
    fn format_key_with_prefix() {
        let prefix: Option<Arc<str>> = Some("gw:v1:".into());
        assert_eq!(format_key(&prefix, "socket:users"), "gw:v1:socket:users");
    }
}
