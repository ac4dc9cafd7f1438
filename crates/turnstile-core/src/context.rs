//! Per-job context handed to task bodies.
//!
//! This is the task's window into its own record: report progress, stash
//! metadata, and poll for cooperative cancellation. The executor builds one
//! per attempt.

use serde_json::{Value, json};

use crate::domain::JobId;
use crate::error::TurnstileError;
use crate::store::JobStore;

pub struct JobContext {
    jobs: JobStore,
    job_id: JobId,
    task: String,
}

impl JobContext {
    pub(crate) fn new(jobs: JobStore, job_id: JobId, task: String) -> Self {
        Self { jobs, job_id, task }
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn task(&self) -> &str {
        &self.task
    }

    /// Record progress under `meta.progress` as
    /// `{"current": N, "total": M, "name": task}` so pollers can render it.
    pub async fn set_progress(&self, current: u64, total: u64) -> Result<(), TurnstileError> {
        self.insert_meta(
            "progress",
            json!({
                "current": current,
                "total": total,
                "name": self.task,
            }),
        )
        .await
    }

    /// Write one `meta` entry on the job record. Overwrites the key if it
    /// already exists; other keys are left alone.
    pub async fn insert_meta(&self, key: &str, value: Value) -> Result<(), TurnstileError> {
        let Some(mut record) = self.jobs.load(self.job_id).await? else {
            // Record evicted out from under a running task; nothing to
            // attach the meta to.
            return Ok(());
        };
        record.meta.insert(key.to_string(), value);
        self.jobs.save(&record, None).await
    }

    /// Has someone asked this job to stop? Task bodies should poll this
    /// between work chunks and wind down when it turns true.
    pub async fn cancel_requested(&self) -> Result<bool, TurnstileError> {
        Ok(self.jobs.cancel_flag(self.job_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::domain::{JobRecord, Lane};
    use crate::fingerprint::fingerprint;
    use crate::store::InMemoryStore;

    fn setup() -> (JobStore, JobRecord) {
        let jobs = JobStore::new(Arc::new(InMemoryStore::new()));
        let fp = fingerprint("demo", &json!({}), 5);
        let record = JobRecord::new("demo", json!({}), Lane::Default, fp, 3);
        (jobs, record)
    }

    #[tokio::test]
    async fn context_exposes_job_identity() {
        let (jobs, record) = setup();
        let ctx = JobContext::new(jobs, record.id, "demo".to_string());
        assert_eq!(ctx.job_id(), record.id);
        assert_eq!(ctx.task(), "demo");
    }

    #[tokio::test]
    async fn set_progress_writes_meta() {
        let (jobs, record) = setup();
        jobs.save(&record, None).await.unwrap();

        let ctx = JobContext::new(jobs.clone(), record.id, "demo".to_string());
        ctx.set_progress(3, 10).await.unwrap();

        let loaded = jobs.load(record.id).await.unwrap().unwrap();
        assert_eq!(
            loaded.meta.get("progress"),
            Some(&json!({"current": 3, "total": 10, "name": "demo"}))
        );
    }

    #[tokio::test]
    async fn insert_meta_overwrites_key_keeps_others() {
        let (jobs, record) = setup();
        jobs.save(&record, None).await.unwrap();

        let ctx = JobContext::new(jobs.clone(), record.id, "demo".to_string());
        ctx.insert_meta("status", json!("running")).await.unwrap();
        ctx.set_progress(1, 2).await.unwrap();
        ctx.insert_meta("status", json!("winding_down")).await.unwrap();

        let loaded = jobs.load(record.id).await.unwrap().unwrap();
        assert_eq!(loaded.meta.get("status"), Some(&json!("winding_down")));
        assert!(loaded.meta.contains_key("progress"));
    }

    #[tokio::test]
    async fn meta_write_for_missing_record_is_a_noop() {
        let (jobs, record) = setup();
        let ctx = JobContext::new(jobs, record.id, "demo".to_string());
        ctx.insert_meta("status", json!("running")).await.unwrap();
    }

    #[tokio::test]
    async fn cancel_flag_is_visible_through_context() {
        let (jobs, record) = setup();
        jobs.save(&record, None).await.unwrap();

        let ctx = JobContext::new(jobs.clone(), record.id, "demo".to_string());
        assert!(!ctx.cancel_requested().await.unwrap());

        jobs.set_cancel_flag(record.id, Duration::from_secs(60))
            .await
            .unwrap();
        assert!(ctx.cancel_requested().await.unwrap());
    }
}
