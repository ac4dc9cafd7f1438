//! Key-value store port + implementations.
//!
//! The engine keeps all shared state (job records, reservations, cancel
//! flags) behind this trait so the in-memory store used in development and
//! tests can be swapped for a networked one without touching the engine.

mod jobs;
mod memory;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use jobs::JobStore;
pub use memory::InMemoryStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Minimal key-value contract the engine needs.
///
/// Semantics follow the usual KV model:
/// - values are opaque strings
/// - `ttl: None` means the key never expires
/// - `set_if_absent` is atomic check-and-set (the dedup linchpin)
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError>;

    /// Write `key` only if it does not currently hold a live value.
    /// Returns `true` when this call created the key.
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError>;

    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Cheap liveness check for health reporting.
    async fn ping(&self) -> Result<(), StoreError>;
}
