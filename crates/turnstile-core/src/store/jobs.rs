//! Typed persistence layer for job state.
//!
//! Everything the engine keeps in the store goes through here, so the key
//! layout lives in exactly one place:
//! - `job:{id}`          -> JSON-encoded [`JobRecord`]
//! - `cancel:{id}`       -> "1" while cancellation is requested (TTL-bound)
//! - `task:{name}:{hex}` -> job id string (the idempotency reservation)

use std::sync::Arc;
use std::time::Duration;

use super::{KvStore, StoreError};
use crate::domain::{JobId, JobRecord};
use crate::error::TurnstileError;
use crate::fingerprint::Fingerprint;

fn job_key(id: JobId) -> String {
    format!("job:{id}")
}

fn cancel_key(id: JobId) -> String {
    format!("cancel:{id}")
}

/// Store facade shared by the dispatcher, the executor and job contexts.
#[derive(Clone)]
pub struct JobStore {
    kv: Arc<dyn KvStore>,
}

impl JobStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    pub async fn ping(&self) -> Result<(), StoreError> {
        self.kv.ping().await
    }

    pub async fn load(&self, id: JobId) -> Result<Option<JobRecord>, TurnstileError> {
        match self.kv.get(&job_key(id)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Persist a record. `ttl: None` for live jobs; terminal records get a
    /// retention TTL so the store does not grow without bound.
    pub async fn save(
        &self,
        record: &JobRecord,
        ttl: Option<Duration>,
    ) -> Result<(), TurnstileError> {
        let raw = serde_json::to_string(record)?;
        self.kv.set(&job_key(record.id), &raw, ttl).await?;
        Ok(())
    }

    pub async fn remove(&self, id: JobId) -> Result<(), StoreError> {
        self.kv.delete(&job_key(id)).await
    }

    /// Atomically claim the fingerprint for `id`. `false` means somebody
    /// else holds it.
    pub async fn reserve(
        &self,
        fingerprint: &Fingerprint,
        id: JobId,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        self.kv
            .set_if_absent(fingerprint.as_str(), &id.to_string(), ttl)
            .await
    }

    /// Overwrite the reservation unconditionally. Only used on the degraded
    /// path where a competing reservation expired mid-dispatch.
    pub async fn claim(
        &self,
        fingerprint: &Fingerprint,
        id: JobId,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        self.kv
            .set(fingerprint.as_str(), &id.to_string(), Some(ttl))
            .await
    }

    /// Which job currently holds this fingerprint, if any.
    pub async fn reservation_holder(
        &self,
        fingerprint: &Fingerprint,
    ) -> Result<Option<JobId>, TurnstileError> {
        match self.kv.get(fingerprint.as_str()).await? {
            Some(raw) => raw
                .parse::<JobId>()
                .map(Some)
                .map_err(|_| TurnstileError::InvalidJobId(raw)),
            None => Ok(None),
        }
    }

    pub async fn release(&self, fingerprint: &Fingerprint) -> Result<(), StoreError> {
        self.kv.delete(fingerprint.as_str()).await
    }

    pub async fn set_cancel_flag(&self, id: JobId, ttl: Duration) -> Result<(), StoreError> {
        self.kv.set(&cancel_key(id), "1", Some(ttl)).await
    }

    pub async fn cancel_flag(&self, id: JobId) -> Result<bool, StoreError> {
        Ok(self.kv.get(&cancel_key(id)).await?.is_some())
    }
}
