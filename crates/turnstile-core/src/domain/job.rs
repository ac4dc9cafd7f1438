//! Job record: the single source of truth for one job's lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{JobId, Lane};
use crate::fingerprint::Fingerprint;

/// Job status (minimal set).
///
/// State transitions:
/// - Queued -> Started -> Finished
/// - Queued -> Started -> Failed -> Queued (retry loop until attempts run out)
/// - Queued -> Started -> Failed (terminal once attempts are exhausted)
/// - Queued | Started -> Cancelled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Started,
    Finished,
    Failed,
    Cancelled,
}

/// Metadata + payload for one job.
///
/// Design:
/// - Queue lanes hold lightweight entries only; every state transition
///   happens here and is persisted through the store.
/// - `attempts` counts executions and is bumped when an attempt starts, so
///   a record that says `Failed` with `attempts == max_attempts` is final.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: JobId,
    pub task: String,
    pub args: Value,
    pub lane: Lane,
    pub fingerprint: Fingerprint,

    pub status: JobStatus,
    pub attempts: u32,
    pub max_attempts: u32,

    /// Advisory flag: someone asked for this job to stop. The task body
    /// decides when to act on it.
    pub cancel_requested: bool,

    pub result: Option<Value>,
    pub error: Option<String>,

    /// Scratch area handlers write through `JobContext` (progress etc.).
    pub meta: Map<String, Value>,

    pub enqueued_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl JobRecord {
    pub fn new(
        task: impl Into<String>,
        args: Value,
        lane: Lane,
        fingerprint: Fingerprint,
        max_attempts: u32,
    ) -> Self {
        Self {
            id: JobId::new(),
            task: task.into(),
            args,
            lane,
            fingerprint,
            status: JobStatus::Queued,
            attempts: 0,
            max_attempts,
            cancel_requested: false,
            result: None,
            error: None,
            meta: Map::new(),
            enqueued_at: Utc::now(),
            started_at: None,
            ended_at: None,
        }
    }

    /// Mark as running (increments attempts).
    ///
    /// `started_at` keeps the first start; retries do not rewrite it.
    pub fn mark_started(&mut self) {
        self.status = JobStatus::Started;
        self.attempts += 1;
        self.started_at.get_or_insert_with(Utc::now);
    }

    /// Mark as finished with the handler's result.
    pub fn mark_finished(&mut self, result: Value) {
        self.status = JobStatus::Finished;
        self.result = Some(result);
        self.error = None;
        self.ended_at = Some(Utc::now());
    }

    /// Record a failed attempt.
    ///
    /// `ended_at` is only written when this failure is final; a failure that
    /// will be retried leaves the job open.
    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = JobStatus::Failed;
        self.error = Some(error.into());
        if self.attempts >= self.max_attempts {
            self.ended_at = Some(Utc::now());
        }
    }

    /// Move a failed job back to Queued for the next attempt.
    pub fn requeue(&mut self) {
        self.status = JobStatus::Queued;
    }

    /// Mark as cancelled (terminal, works from Queued or Started).
    pub fn mark_cancelled(&mut self) {
        self.status = JobStatus::Cancelled;
        self.cancel_requested = true;
        self.ended_at = Some(Utc::now());
    }

    /// Is this job done for good (no further transitions)?
    ///
    /// `Failed` is only terminal once the attempt budget is spent; a failed
    /// job waiting for its retry is still live.
    pub fn is_terminal(&self) -> bool {
        match self.status {
            JobStatus::Finished | JobStatus::Cancelled => true,
            JobStatus::Failed => self.attempts >= self.max_attempts,
            JobStatus::Queued | JobStatus::Started => false,
        }
    }
}
