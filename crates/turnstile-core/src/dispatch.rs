//! Dispatcher: idempotent admission + the job-facing control surface.
//!
//! Admission order matters and is load-bearing:
//! 1. validate the task name against the registry
//! 2. compute the fingerprint
//! 3. duplicate check (with stale-reservation override)
//! 4. write a fresh Queued record, then try to reserve the fingerprint
//!    atomically; losing the race means someone else admitted first
//! 5. enqueue only after the reservation is ours
//!
//! The record is written before the reservation so a `Duplicate` answer can
//! always point at a loadable job. Dedup here is best-effort, not
//! exactly-once: a reservation expiring mid-flight can let a second copy
//! through, and that window is accepted rather than papered over.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::domain::{JobId, JobRecord, Lane};
use crate::error::TurnstileError;
use crate::fingerprint::fingerprint;
use crate::queue::{QueueEntry, QueuePair};
use crate::registry::HandlerRegistry;
use crate::retry::RetryPolicy;
use crate::store::JobStore;

/// Answer to one dispatch call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DispatchOutcome {
    /// New work: a job was created and enqueued.
    Admitted { job_id: JobId, queue: Lane },

    /// Same work is already live; `job_id` is the existing job.
    Duplicate { job_id: JobId },
}

/// Answer to a cancel request. Always `Accepted` when the job exists: the
/// request records intent, it does not guarantee the job stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelOutcome {
    Accepted,
}

/// One row of `list_queues` output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueInfo {
    pub name: String,
    pub pending: usize,
}

/// Front door of the engine.
#[derive(Clone)]
pub struct Dispatcher {
    jobs: JobStore,
    queues: Arc<QueuePair>,
    registry: Arc<HandlerRegistry>,
    retry: RetryPolicy,
    settings: Arc<Settings>,
}

impl Dispatcher {
    pub fn new(
        jobs: JobStore,
        queues: Arc<QueuePair>,
        registry: Arc<HandlerRegistry>,
        retry: RetryPolicy,
        settings: Arc<Settings>,
    ) -> Self {
        Self {
            jobs,
            queues,
            registry,
            retry,
            settings,
        }
    }

    /// Admit one unit of work, or point at the live job already doing it.
    ///
    /// `args` is what the handler receives; `idem_payload` is what identity
    /// is computed from. They are deliberately separate: two requests with
    /// identical identity but different incidental args still dedupe.
    pub async fn dispatch(
        &self,
        task: &str,
        args: Value,
        idem_payload: Value,
        duration_hint: Duration,
        lane: Lane,
    ) -> Result<DispatchOutcome, TurnstileError> {
        if !self.registry.contains(task) {
            return Err(TurnstileError::UnknownTask(task.to_string()));
        }

        let fp = fingerprint(task, &idem_payload, duration_hint.as_secs());

        if let Some(holder) = self.jobs.reservation_holder(&fp).await? {
            match self.jobs.load(holder).await? {
                Some(existing) if !existing.is_terminal() => {
                    debug!(job_id = %holder, fingerprint = %fp, "duplicate dispatch");
                    return Ok(DispatchOutcome::Duplicate { job_id: holder });
                }
                _ => {
                    // The reservation outlived its job: the holder is
                    // terminal or gone, so the key was never released.
                    // Clear it and admit fresh work.
                    warn!(job_id = %holder, fingerprint = %fp, "clearing stale reservation");
                    self.jobs.release(&fp).await?;
                }
            }
        }

        let record = JobRecord::new(task, args, lane, fp.clone(), self.retry.max_attempts);
        self.jobs.save(&record, None).await?;

        let ttl = duration_hint.saturating_add(self.settings.idem_margin);
        let reserved = match self.jobs.reserve(&fp, record.id, ttl).await {
            Ok(reserved) => reserved,
            Err(error) => {
                self.discard_admission(record.id).await;
                return Err(error.into());
            }
        };
        if !reserved {
            // Lost the set-if-absent race to a concurrent dispatch.
            match self.jobs.reservation_holder(&fp).await {
                Ok(Some(winner)) => {
                    self.jobs.remove(record.id).await?;
                    debug!(job_id = %winner, fingerprint = %fp, "lost admission race");
                    return Ok(DispatchOutcome::Duplicate { job_id: winner });
                }
                Ok(None) => {
                    // The winner's reservation expired between our two
                    // calls. Claim the key outright; under this timing a
                    // duplicate admission is the documented best-effort
                    // outcome.
                    if let Err(error) = self.jobs.claim(&fp, record.id, ttl).await {
                        self.discard_admission(record.id).await;
                        return Err(error.into());
                    }
                }
                Err(error) => {
                    self.discard_admission(record.id).await;
                    return Err(error);
                }
            }
        }

        self.queues.push(QueueEntry::from_record(&record)).await;
        info!(job_id = %record.id, task, lane = %lane, "job admitted");

        Ok(DispatchOutcome::Admitted {
            job_id: record.id,
            queue: lane,
        })
    }

    /// Best-effort cleanup when admission aborts after the record write.
    /// The caller never learned this id, so the record must not outlive
    /// the failed call; no TTL would ever reclaim it otherwise.
    async fn discard_admission(&self, job_id: JobId) {
        if let Err(error) = self.jobs.remove(job_id).await {
            warn!(job_id = %job_id, %error, "failed to discard aborted admission");
        }
    }

    /// Full record for one job.
    pub async fn get_job(&self, job_id: JobId) -> Result<JobRecord, TurnstileError> {
        self.jobs
            .load(job_id)
            .await?
            .ok_or(TurnstileError::JobNotFound(job_id))
    }

    /// Ask a job to stop.
    ///
    /// Sets the durable `cancel_requested` marker on the record and the
    /// TTL-bound advisory flag the task body polls. Safe to repeat; on a
    /// terminal job it accepts and changes nothing.
    pub async fn request_cancel(&self, job_id: JobId) -> Result<CancelOutcome, TurnstileError> {
        let Some(mut record) = self.jobs.load(job_id).await? else {
            return Err(TurnstileError::JobNotFound(job_id));
        };

        if !record.is_terminal() {
            if !record.cancel_requested {
                record.cancel_requested = true;
                self.jobs.save(&record, None).await?;
            }
            self.jobs
                .set_cancel_flag(job_id, self.settings.cancel_ttl)
                .await?;
            info!(job_id = %job_id, "cancel requested");
        }

        Ok(CancelOutcome::Accepted)
    }

    /// Both lanes with their pending counts, in fixed order.
    pub async fn list_queues(&self) -> Vec<QueueInfo> {
        self.queues
            .pending()
            .await
            .into_iter()
            .map(|(lane, pending)| QueueInfo {
                name: lane.as_str().to_string(),
                pending,
            })
            .collect()
    }

    /// Drop every pending entry in the named lane.
    ///
    /// Dropped jobs are marked cancelled and their reservations released,
    /// so identical work can be admitted again right away. Running jobs are
    /// not touched.
    pub async fn purge_queue(&self, queue_name: &str) -> Result<usize, TurnstileError> {
        let lane: Lane = queue_name.parse()?;
        let dropped = self.queues.purge(lane).await;
        let purged = dropped.len();

        for entry in dropped {
            if let Some(mut record) = self.jobs.load(entry.job_id).await?
                && !record.is_terminal()
            {
                record.mark_cancelled();
                self.jobs
                    .save(&record, Some(self.settings.result_ttl))
                    .await?;
            }
            self.jobs.release(&entry.fingerprint).await?;
        }

        if purged > 0 {
            warn!(queue = queue_name, purged, "queue purged");
        }
        Ok(purged)
    }

    /// Liveness of the backing store.
    pub async fn ping(&self) -> Result<(), TurnstileError> {
        Ok(self.jobs.ping().await?)
    }
}
