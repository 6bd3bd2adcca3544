//! The `CoordinationStore` port (`spec.md` §4.7/§6): the five atomic
//! primitives fan-in and pills are built from. Grounded on the ports
//! crate's `ExecutionRepo` lease methods (TTL-bearing, `Send + Sync`,
//! object-safe async traits).

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::AdapterError;

/// Atomic primitives a distributed Flowcraft deployment needs from its
/// shared coordination backend (Redis, etcd, ...). Every method is
/// fallible only on a backend/connection failure; "key absent" is
/// represented in the return value, not an error.
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Atomically increment `key` by one, creating it at `1` with `ttl`
    /// if absent, and return the new value.
    async fn increment(&self, key: &str, ttl: Duration) -> Result<i64, AdapterError>;

    /// Atomically set `key` to `value` with `ttl` only if it is absent.
    /// Returns `true` if this call created the key (i.e. won the race).
    async fn set_if_not_exists(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, AdapterError>;

    /// Reset `key`'s TTL without changing its value. A no-op if the key
    /// is absent.
    async fn extend_ttl(&self, key: &str, ttl: Duration) -> Result<(), AdapterError>;

    /// Remove `key`. A no-op if it is already absent.
    async fn delete(&self, key: &str) -> Result<(), AdapterError>;

    /// Read `key`'s current value, or `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>, AdapterError>;
}

fn _assert_coordination_store_is_object_safe(_: &dyn CoordinationStore) {}
fn _takes_boxed_coordination_store(_: Box<dyn CoordinationStore>) {}

struct Entry {
    value: String,
    expires_at: Instant,
}

/// A process-local `CoordinationStore` for tests and single-process
/// deployments. Expired entries are swept lazily on access.
#[derive(Default)]
pub struct InMemoryCoordinationStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl InMemoryCoordinationStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self { entries: Mutex::new(HashMap::new()) }
    }
}

#[async_trait]
impl CoordinationStore for InMemoryCoordinationStore {
    async fn increment(&self, key: &str, ttl: Duration) -> Result<i64, AdapterError> {
        let mut entries = self.entries.lock();
        let now = Instant::now();
        let next = match entries.get(key) {
            Some(entry) if entry.expires_at > now => entry.value.parse::<i64>().unwrap_or(0) + 1,
            _ => 1,
        };
        entries.insert(key.to_owned(), Entry { value: next.to_string(), expires_at: now + ttl });
        Ok(next)
    }

    async fn set_if_not_exists(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, AdapterError> {
        let mut entries = self.entries.lock();
        let now = Instant::now();
        if let Some(entry) = entries.get(key) {
            if entry.expires_at > now {
                return Ok(false);
            }
        }
        entries.insert(key.to_owned(), Entry { value: value.to_owned(), expires_at: now + ttl });
        Ok(true)
    }

    async fn extend_ttl(&self, key: &str, ttl: Duration) -> Result<(), AdapterError> {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get_mut(key) {
            entry.expires_at = Instant::now() + ttl;
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), AdapterError> {
        self.entries.lock().remove(key);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, AdapterError> {
        let mut entries = self.entries.lock();
        let now = Instant::now();
        match entries.get(key) {
            Some(entry) if entry.expires_at > now => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn increment_starts_at_one_and_accumulates() {
        let store = InMemoryCoordinationStore::new();
        assert_eq!(store.increment("k", Duration::from_secs(60)).await.unwrap(), 1);
        assert_eq!(store.increment("k", Duration::from_secs(60)).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn set_if_not_exists_only_wins_once() {
        let store = InMemoryCoordinationStore::new();
        assert!(store.set_if_not_exists("lock", "a", Duration::from_secs(60)).await.unwrap());
        assert!(!store.set_if_not_exists("lock", "b", Duration::from_secs(60)).await.unwrap());
        assert_eq!(store.get("lock").await.unwrap().as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn delete_then_get_returns_none() {
        let store = InMemoryCoordinationStore::new();
        store.set_if_not_exists("x", "1", Duration::from_secs(60)).await.unwrap();
        store.delete("x").await.unwrap();
        assert_eq!(store.get("x").await.unwrap(), None);
    }

    #[tokio::test]
    async fn expired_entries_read_back_as_absent() {
        let store = InMemoryCoordinationStore::new();
        store.set_if_not_exists("x", "1", Duration::from_millis(1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(store.get("x").await.unwrap(), None);
        // expiry also frees the key for a fresh set_if_not_exists race.
        assert!(store.set_if_not_exists("x", "2", Duration::from_secs(60)).await.unwrap());
    }
}
