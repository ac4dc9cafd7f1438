//! turnstile-core
//!
//! Idempotent job dispatch and lifecycle engine.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（JobId, Lane, JobRecord/JobStatus）
//! - **fingerprint**: 決定的なジョブ指紋（重複排除の鍵）
//! - **store**: KvStore ポート + InMemoryStore + JobStore（型付き永続層）
//! - **queue**: default/high の 2 レーンキュー
//! - **registry**: TaskHandler trait + HandlerRegistry
//! - **context**: タスク本体に渡す JobContext（進捗・キャンセル確認）
//! - **dispatch**: Dispatcher（冪等な受付 + 操作 API）
//! - **retry**: RetryPolicy（試行回数上限 + バックオフ）
//! - **worker**: Executor + WorkerGroup（実行とライフサイクル遷移）
//! - **config**: Settings（環境変数ベース）
//! - **error**: エラー型

pub mod config;
pub mod context;
pub mod dispatch;
pub mod domain;
pub mod error;
pub mod fingerprint;
pub mod queue;
pub mod registry;
pub mod retry;
pub mod store;
pub mod worker;
