//! Workers: pull entries, run handlers, settle outcomes.
//!
//! Design:
//! - A worker never dies with its job. Every exit path of an attempt ends
//!   in a state transition on the record; handler errors and timeouts feed
//!   the retry machinery instead of tearing the loop down.
//! - The idempotency reservation is released exactly once, when the job
//!   reaches its final terminal state, and only after the terminal record
//!   is saved. A successor dispatch must never observe a released key with
//!   a live-looking record behind it.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::Settings;
use crate::context::JobContext;
use crate::domain::{JobId, JobRecord, JobStatus};
use crate::fingerprint::Fingerprint;
use crate::queue::{QueueEntry, QueuePair};
use crate::registry::{HandlerRegistry, TaskError, TaskOutput};
use crate::retry::RetryPolicy;
use crate::store::JobStore;

/// Runs one queue entry at a time. Shared by all workers in a group.
pub struct Executor {
    jobs: JobStore,
    queues: Arc<QueuePair>,
    registry: Arc<HandlerRegistry>,
    retry: RetryPolicy,
    settings: Arc<Settings>,
}

impl Executor {
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

    /// Execute one entry to its conclusion for this attempt.
    pub async fn run_entry(&self, entry: QueueEntry) {
        let mut record = match self.jobs.load(entry.job_id).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                // Record evicted while the entry sat in the queue. Free the
                // fingerprint so identical work is not blocked until the
                // reservation times out.
                warn!(job_id = %entry.job_id, task = %entry.task, "record missing for queued entry");
                self.release_reservation(&entry.fingerprint, entry.job_id)
                    .await;
                return;
            }
            Err(error) => {
                error!(job_id = %entry.job_id, %error, "failed to load record");
                return;
            }
        };

        // Cancelled while still queued: settle without ever starting.
        if record.cancel_requested {
            record.mark_cancelled();
            info!(job_id = %record.id, task = %record.task, "job cancelled before start");
            self.settle(&record).await;
            return;
        }

        record.mark_started();
        if let Err(error) = self.jobs.save(&record, None).await {
            error!(job_id = %record.id, %error, "failed to persist start");
            return;
        }
        info!(
            job_id = %record.id,
            task = %record.task,
            attempt = record.attempts,
            "job started"
        );

        let ctx = JobContext::new(self.jobs.clone(), record.id, record.task.clone());
        let outcome = match self.registry.get(&entry.task) {
            Some(handler) => {
                let attempt = handler.run(&entry.args, &ctx);
                match tokio::time::timeout(self.settings.task_timeout, attempt).await {
                    Ok(result) => result,
                    Err(_) => Err(TaskError::new(format!(
                        "timeout after {:?}",
                        self.settings.task_timeout
                    ))),
                }
            }
            // Dispatch validates names, so this only fires when dispatcher
            // and executor were wired with different registries.
            None => Err(TaskError::new(format!(
                "no handler registered for '{}'",
                entry.task
            ))),
        };

        // Reload before settling: the handler may have written meta through
        // its context, and the terminal save must carry those writes.
        let mut record = match self.jobs.load(record.id).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                warn!(job_id = %entry.job_id, "record vanished mid-run");
                self.release_reservation(&entry.fingerprint, entry.job_id)
                    .await;
                return;
            }
            Err(error) => {
                error!(job_id = %entry.job_id, %error, "failed to reload record");
                return;
            }
        };

        match outcome {
            Ok(TaskOutput::Finished(result)) => {
                record.mark_finished(result);
                info!(job_id = %record.id, task = %record.task, "job finished");
                self.settle(&record).await;
            }
            Ok(TaskOutput::Cancelled) => {
                record.mark_cancelled();
                info!(job_id = %record.id, task = %record.task, "job cancelled");
                self.settle(&record).await;
            }
            Err(task_error) => {
                record.mark_failed(task_error.to_string());
                if record.is_terminal() {
                    warn!(
                        job_id = %record.id,
                        task = %record.task,
                        attempts = record.attempts,
                        error = %task_error,
                        "job failed permanently"
                    );
                    self.settle(&record).await;
                } else {
                    let delay = self.retry.delay_for(record.attempts);
                    warn!(
                        job_id = %record.id,
                        task = %record.task,
                        attempt = record.attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %task_error,
                        "attempt failed, retry scheduled"
                    );
                    if let Err(error) = self.jobs.save(&record, None).await {
                        error!(job_id = %record.id, %error, "failed to persist failed attempt");
                        return;
                    }
                    self.schedule_retry(entry, delay);
                }
            }
        }
    }

    /// Persist a terminal record, then release its reservation.
    ///
    /// Order matters: once the key is gone a concurrent dispatch may admit
    /// a successor, and it must find this record already terminal. The
    /// release still runs if the save failed; wedging dedup on a broken
    /// store would be worse than a rare duplicate.
    async fn settle(&self, record: &JobRecord) {
        let ttl = match record.status {
            JobStatus::Failed => self.settings.failure_ttl,
            _ => self.settings.result_ttl,
        };
        if let Err(error) = self.jobs.save(record, Some(ttl)).await {
            error!(job_id = %record.id, %error, "failed to persist terminal record");
        }
        self.release_reservation(&record.fingerprint, record.id).await;
    }

    async fn release_reservation(&self, fingerprint: &Fingerprint, job_id: JobId) {
        if let Err(error) = self.jobs.release(fingerprint).await {
            error!(job_id = %job_id, %error, "failed to release reservation");
        }
    }

    /// Re-admission timer for one failed attempt.
    ///
    /// Runs detached: after the backoff the record moves back to Queued and
    /// the entry is pushed again. If the process dies first, the
    /// re-admission is lost and the reservation TTL eventually frees the
    /// fingerprint.
    fn schedule_retry(&self, entry: QueueEntry, delay: Duration) {
        let jobs = self.jobs.clone();
        let queues = Arc::clone(&self.queues);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            match jobs.load(entry.job_id).await {
                Ok(Some(mut record)) if record.status == JobStatus::Failed => {
                    record.requeue();
                    match jobs.save(&record, None).await {
                        Ok(()) => queues.push(entry).await,
                        Err(error) => {
                            error!(job_id = %record.id, %error, "failed to requeue after backoff");
                        }
                    }
                }
                // Settled or evicted meanwhile: drop the re-admission.
                Ok(_) => {}
                Err(error) => {
                    error!(job_id = %entry.job_id, %error, "failed to load record after backoff");
                }
            }
        });
    }
}

/// Worker group handle.
/// - `request_shutdown` でワーカーは新しいエントリを取らなくなる
/// - `shutdown_and_join()` で全ワーカーの終了を待てる
pub struct WorkerGroup {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl WorkerGroup {
    /// Spawn `n` workers sharing one executor.
    pub fn spawn(n: usize, executor: Arc<Executor>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut joins = Vec::with_capacity(n);
        for worker_id in 0..n {
            let executor = Arc::clone(&executor);
            let mut rx = shutdown_rx.clone();

            let join = tokio::spawn(async move {
                worker_loop(worker_id, executor, &mut rx).await;
            });
            joins.push(join);
        }

        Self { shutdown_tx, joins }
    }

    /// Request shutdown for all workers.
    /// This does not cancel in-flight attempts; workers just stop pulling
    /// new entries.
    pub fn request_shutdown(&self) {
        // ignore send error: receivers may already be dropped
        let _ = self.shutdown_tx.send(true);
    }

    /// Shutdown and wait for all workers.
    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        for j in self.joins {
            let _ = j.await;
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    executor: Arc<Executor>,
    shutdown_rx: &mut watch::Receiver<bool>,
) {
    debug!(worker_id, "worker started");
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        // pull は待つ可能性があるので select で shutdown と競合させる
        let entry = tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    // sender dropped: treat as shutdown
                    break;
                }
                continue;
            }
            entry = executor.queues.pull() => entry,
        };

        executor.run_entry(entry).await;
    }
    debug!(worker_id, "worker stopped");
}
