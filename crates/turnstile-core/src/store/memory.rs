//! In-memory key-value store.
//!
//! Development/test stand-in for a networked store. Expiry is lazy: a key
//! past its deadline is treated as absent and dropped on the next touch,
//! which is exactly the observable contract TTLs give you anyway.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{KvStore, StoreError};

#[derive(Debug, Clone)]
struct StoredValue {
    value: String,
    expires_at: Option<Instant>,
}

impl StoredValue {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

/// In-memory `KvStore` implementation.
#[derive(Default)]
pub struct InMemoryStore {
    entries: Mutex<HashMap<String, StoredValue>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

/// Drop `key` if it exists but has expired.
fn evict_if_expired(entries: &mut HashMap<String, StoredValue>, key: &str) {
    let expired = entries.get(key).is_some_and(StoredValue::is_expired);
    if expired {
        entries.remove(key);
    }
}

/// Expiry instant for a TTL. A TTL too large for the clock to represent
/// behaves as "never expires" instead of overflowing.
fn deadline(ttl: Duration) -> Option<Instant> {
    Instant::now().checked_add(ttl)
}

#[async_trait]
impl KvStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut entries = self.entries.lock().await;
        evict_if_expired(&mut entries, key);
        Ok(entries.get(key).map(|stored| stored.value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().await;
        entries.insert(
            key.to_string(),
            StoredValue {
                value: value.to_string(),
                expires_at: ttl.and_then(deadline),
            },
        );
        Ok(())
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let mut entries = self.entries.lock().await;
        evict_if_expired(&mut entries, key);
        if entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            StoredValue {
                value: value.to_string(),
                expires_at: deadline(ttl),
            },
        );
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().await;
        entries.remove(key);
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
