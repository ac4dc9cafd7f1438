use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::time::{Duration, sleep};
use tracing_subscriber::EnvFilter;

use turnstile_core::config::Settings;
use turnstile_core::context::JobContext;
use turnstile_core::dispatch::{DispatchOutcome, Dispatcher};
use turnstile_core::domain::{JobId, Lane};
use turnstile_core::queue::QueuePair;
use turnstile_core::registry::{HandlerRegistry, TaskError, TaskHandler, TaskOutput};
use turnstile_core::retry::RetryPolicy;
use turnstile_core::store::{InMemoryStore, JobStore};
use turnstile_core::worker::{Executor, WorkerGroup};

#[derive(Debug, Deserialize)]
struct LongTaskArgs {
    duration: u64,
}

#[derive(Debug, Deserialize)]
struct UserPayload {
    user_id: i64,
}

/// Variable-length demo task: ticks once a second, reports progress and
/// honours cooperative cancellation between ticks.
struct LongTask;

#[async_trait]
impl TaskHandler for LongTask {
    fn name(&self) -> &'static str {
        "long_task"
    }

    async fn run(&self, args: &Value, ctx: &JobContext) -> Result<TaskOutput, TaskError> {
        let p: LongTaskArgs = serde_json::from_value(args.clone())?;

        for i in 0..p.duration {
            sleep(Duration::from_secs(1)).await;
            ctx.set_progress(i + 1, p.duration).await?;

            if ctx.cancel_requested().await? {
                tracing::info!(job_id = %ctx.job_id(), "long_task winding down");
                ctx.insert_meta("status", json!("cancelled")).await?;
                return Ok(TaskOutput::Cancelled);
            }
        }

        Ok(TaskOutput::Finished(json!(format!("done:{}", ctx.task()))))
    }
}

/// task_a / task_b: simulate a couple of seconds of per-user processing.
struct ProcessUser {
    name: &'static str,
    duration: Duration,
}

impl ProcessUser {
    fn task_a() -> Self {
        Self {
            name: "task_a",
            duration: Duration::from_secs(2),
        }
    }

    fn task_b() -> Self {
        Self {
            name: "task_b",
            duration: Duration::from_secs(2),
        }
    }
}

#[async_trait]
impl TaskHandler for ProcessUser {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn run(&self, args: &Value, ctx: &JobContext) -> Result<TaskOutput, TaskError> {
        let p: UserPayload = serde_json::from_value(args.clone())?;
        ctx.insert_meta("status", json!("running")).await?;

        sleep(self.duration).await;

        ctx.insert_meta("status", json!("done")).await?;
        Ok(TaskOutput::Finished(json!({
            "type": self.name,
            "user_id": p.user_id,
            "completed": true,
        })))
    }
}

fn job_id_of(outcome: &DispatchOutcome) -> JobId {
    match outcome {
        DispatchOutcome::Admitted { job_id, .. } | DispatchOutcome::Duplicate { job_id } => *job_id,
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // (A) ストア・キュー・ハンドラを用意
    let settings = Arc::new(Settings::from_env()?);
    let jobs = JobStore::new(Arc::new(InMemoryStore::new()));
    let queues = Arc::new(QueuePair::new());

    let mut registry = HandlerRegistry::new();
    registry.register(Arc::new(LongTask))?;
    registry.register(Arc::new(ProcessUser::task_a()))?;
    registry.register(Arc::new(ProcessUser::task_b()))?;
    let registry = Arc::new(registry);

    let retry = RetryPolicy::default();
    let dispatcher = Dispatcher::new(
        jobs.clone(),
        Arc::clone(&queues),
        Arc::clone(&registry),
        retry.clone(),
        Arc::clone(&settings),
    );
    let executor = Arc::new(Executor::new(jobs, queues, registry, retry, Arc::clone(&settings)));

    // (B) ワーカーを起動
    let workers = WorkerGroup::spawn(settings.workers, executor);
    tracing::info!(workers = settings.workers, "engine started");

    // (C) long_task を投入し、同じ内容をもう一度投げて重複排除を確認
    let payload = json!({"demo": "idempotency"});
    let first = dispatcher
        .dispatch(
            "long_task",
            json!({"duration": 6}),
            payload.clone(),
            Duration::from_secs(6),
            Lane::Default,
        )
        .await?;
    println!("first dispatch: {first:?}");

    let second = dispatcher
        .dispatch(
            "long_task",
            json!({"duration": 6}),
            payload.clone(),
            Duration::from_secs(6),
            Lane::Default,
        )
        .await?;
    println!("second dispatch (same work): {second:?}");
    let long_id = job_id_of(&first);

    // (D) 通常レーンに task_a、高優先レーンに task_b
    let a = dispatcher
        .dispatch(
            "task_a",
            json!({"user_id": 123}),
            json!({"user_id": 123}),
            Duration::from_secs(10),
            Lane::Default,
        )
        .await?;
    let b = dispatcher
        .dispatch(
            "task_b",
            json!({"user_id": 456}),
            json!({"user_id": 456}),
            Duration::from_secs(10),
            Lane::High,
        )
        .await?;
    println!("task_a: {a:?}");
    println!("task_b (high): {b:?}");

    for q in dispatcher.list_queues().await {
        println!("queue {}: {} pending", q.name, q.pending);
    }

    // (E) 進捗を覗いてから long_task のキャンセルを要求する
    sleep(Duration::from_secs(2)).await;
    let running = dispatcher.get_job(long_id).await?;
    if let Some(progress) = running.meta.get("progress") {
        println!("long_task progress: {progress}");
    }
    dispatcher.request_cancel(long_id).await?;
    println!("cancel requested: {long_id}");

    // (F) 全ジョブの最終状態をポーリングで待つ
    for job_id in [long_id, job_id_of(&a), job_id_of(&b)] {
        loop {
            let record = dispatcher.get_job(job_id).await?;
            if record.is_terminal() {
                println!(
                    "final: id={} task={} status={:?} attempts={} result={:?} error={:?}",
                    record.id, record.task, record.status, record.attempts, record.result, record.error
                );
                break;
            }
            sleep(Duration::from_millis(200)).await;
        }
    }

    dispatcher.ping().await?;
    println!("health: ok");

    // (G) ワーカーを止める（実行中のジョブは抱えたまま終わらせる）
    workers.shutdown_and_join().await;
    Ok(())
}
