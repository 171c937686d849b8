//! Common Test Utilities
//!
//! An in-memory `KeyValueStore` double with failure injection, plus helpers
//! for attaching fake connections to a registry.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;

use presence_gateway::infrastructure::store::{KeyTtl, KeyValueStore, MessageHandler};
use presence_gateway::presentation::websocket::{ConnectionRegistry, OutboundFrame};
use presence_gateway::shared::error::AppError;

/// In-memory store double.
///
/// Implements the data-structure operations the registry exercises; the
/// batch, scripting and pub/sub operations are inert stubs. `set_unavailable`
/// makes every subsequent call fail the way a disconnected store would.
#[derive(Default)]
pub struct InMemoryStore {
    strings: Mutex<HashMap<String, String>>,
    hashes: Mutex<HashMap<String, HashMap<String, String>>>,
    sets: Mutex<HashMap<String, HashSet<String>>>,
    lists: Mutex<HashMap<String, Vec<String>>>,
    ttls: Mutex<HashMap<String, i64>>,
    unavailable: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with `StoreUnavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Snapshot of a hash, for assertions on registry contents.
    pub fn hash(&self, key: &str) -> HashMap<String, String> {
        self.hashes
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    fn check_available(&self) -> Result<(), AppError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(AppError::StoreUnavailable("injected failure".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    async fn set(&self, key: &str, value: &str, ttl: Option<u64>) -> Result<(), AppError> {
        self.check_available()?;
        self.strings
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        if let Some(seconds) = ttl {
            self.ttls
                .lock()
                .unwrap()
                .insert(key.to_string(), seconds as i64);
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        self.check_available()?;
        Ok(self.strings.lock().unwrap().get(key).cloned())
    }

    async fn del(&self, keys: &[&str]) -> Result<u64, AppError> {
        self.check_available()?;
        let mut deleted = 0;
        for key in keys {
            if self.strings.lock().unwrap().remove(*key).is_some()
                || self.hashes.lock().unwrap().remove(*key).is_some()
                || self.sets.lock().unwrap().remove(*key).is_some()
                || self.lists.lock().unwrap().remove(*key).is_some()
            {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    async fn exists(&self, keys: &[&str]) -> Result<u64, AppError> {
        self.check_available()?;
        let mut found = 0;
        for key in keys {
            if self.strings.lock().unwrap().contains_key(*key)
                || self.hashes.lock().unwrap().contains_key(*key)
                || self.sets.lock().unwrap().contains_key(*key)
                || self.lists.lock().unwrap().contains_key(*key)
            {
                found += 1;
            }
        }
        Ok(found)
    }

    async fn expire(&self, key: &str, seconds: i64) -> Result<bool, AppError> {
        self.check_available()?;
        let known = self.exists(&[key]).await? > 0;
        if known {
            self.ttls.lock().unwrap().insert(key.to_string(), seconds);
        }
        Ok(known)
    }

    async fn ttl(&self, key: &str) -> Result<KeyTtl, AppError> {
        self.check_available()?;
        if self.exists(&[key]).await? == 0 {
            return Ok(KeyTtl::Missing);
        }
        Ok(match self.ttls.lock().unwrap().get(key) {
            Some(seconds) => KeyTtl::Seconds(*seconds),
            None => KeyTtl::NoExpiry,
        })
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), AppError> {
        self.check_available()?;
        self.hashes
            .lock()
            .unwrap()
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, AppError> {
        self.check_available()?;
        Ok(self
            .hashes
            .lock()
            .unwrap()
            .get(key)
            .and_then(|hash| hash.get(field).cloned()))
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, AppError> {
        self.check_available()?;
        Ok(self.hash(key))
    }

    async fn hdel(&self, key: &str, field: &str) -> Result<bool, AppError> {
        self.check_available()?;
        Ok(self
            .hashes
            .lock()
            .unwrap()
            .get_mut(key)
            .map(|hash| hash.remove(field).is_some())
            .unwrap_or(false))
    }

    async fn incr(&self, key: &str, by: i64) -> Result<i64, AppError> {
        self.check_available()?;
        let mut strings = self.strings.lock().unwrap();
        let current: i64 = strings
            .get(key)
            .map(|v| v.parse().unwrap_or(0))
            .unwrap_or(0);
        let next = current + by;
        strings.insert(key.to_string(), next.to_string());
        Ok(next)
    }

    async fn sadd(&self, key: &str, members: &[&str]) -> Result<u64, AppError> {
        self.check_available()?;
        let mut sets = self.sets.lock().unwrap();
        let set = sets.entry(key.to_string()).or_default();
        let mut added = 0;
        for member in members {
            if set.insert(member.to_string()) {
                added += 1;
            }
        }
        Ok(added)
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>, AppError> {
        self.check_available()?;
        Ok(self
            .sets
            .lock()
            .unwrap()
            .get(key)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn rpush(&self, key: &str, value: &str) -> Result<u64, AppError> {
        self.check_available()?;
        let mut lists = self.lists.lock().unwrap();
        let list = lists.entry(key.to_string()).or_default();
        list.push(value.to_string());
        Ok(list.len() as u64)
    }

    async fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>, AppError> {
        self.check_available()?;
        let lists = self.lists.lock().unwrap();
        let Some(list) = lists.get(key) else {
            return Ok(Vec::new());
        };
        if list.is_empty() {
            return Ok(Vec::new());
        }
        let len = list.len() as i64;
        let clamp = |index: i64| -> usize {
            let absolute = if index < 0 { len + index } else { index };
            absolute.clamp(0, len) as usize
        };
        let (start, stop) = (clamp(start), clamp(stop).min(list.len().saturating_sub(1)));
        if start > stop {
            return Ok(Vec::new());
        }
        Ok(list[start..=stop].to_vec())
    }

    async fn lpop(&self, key: &str) -> Result<Option<String>, AppError> {
        self.check_available()?;
        let mut lists = self.lists.lock().unwrap();
        Ok(lists.get_mut(key).and_then(|list| {
            if list.is_empty() {
                None
            } else {
                Some(list.remove(0))
            }
        }))
    }

    async fn transaction(&self, _ops: &[Vec<String>]) -> Result<Vec<redis::Value>, AppError> {
        self.check_available()?;
        // The double does not execute batches.
        Ok(Vec::new())
    }

    async fn eval(
        &self,
        _script: &str,
        _keys: &[&str],
        _args: &[&str],
    ) -> Result<redis::Value, AppError> {
        self.check_available()?;
        Ok(redis::Value::Nil)
    }

    async fn publish(&self, _channel: &str, _message: &str) -> Result<u64, AppError> {
        self.check_available()?;
        Ok(0)
    }

    async fn subscribe(&self, _channel: &str, _on_message: MessageHandler) -> Result<(), AppError> {
        self.check_available()?;
        Ok(())
    }
}

/// Registers a fake connection and returns its handle and the receiver that
/// observes everything pushed to it.
pub async fn register_client(
    registry: &ConnectionRegistry,
    identity: &str,
) -> (String, mpsc::UnboundedReceiver<OutboundFrame>) {
    let connection_id = uuid::Uuid::new_v4().to_string();
    let (tx, rx) = mpsc::unbounded_channel();
    registry
        .register(identity, &connection_id, tx)
        .await
        .expect("registration should succeed");
    (connection_id, rx)
}
