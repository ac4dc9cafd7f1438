//! Task handlers and their registry.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::context::JobContext;
use crate::error::TurnstileError;

/// What a task body hands back to the executor.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutput {
    /// Normal completion; the value becomes the job's `result`.
    Finished(Value),

    /// The body noticed a cancel request and stopped on its own.
    Cancelled,
}

/// Failure reported by a task body (or manufactured by the executor, e.g.
/// on timeout). Feeds the retry machinery.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct TaskError(String);

impl TaskError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<String> for TaskError {
    fn from(message: String) -> Self {
        Self(message)
    }
}

impl From<&str> for TaskError {
    fn from(message: &str) -> Self {
        Self(message.to_string())
    }
}

impl From<TurnstileError> for TaskError {
    fn from(err: TurnstileError) -> Self {
        Self(err.to_string())
    }
}

impl From<serde_json::Error> for TaskError {
    fn from(err: serde_json::Error) -> Self {
        Self(format!("json decode: {err}"))
    }
}

/// A handler for one task name.
///
/// The handler decodes `args` however it likes and uses the context for
/// progress reporting and cooperative cancellation checks. Long-running
/// bodies should poll `ctx.cancel_requested()` between work chunks.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(&self, args: &Value, ctx: &JobContext) -> Result<TaskOutput, TaskError>;
}

/// Registry of handlers (task name -> handler).
///
/// Design:
/// - Built during initialization (mutable).
/// - Used during runtime (immutable).
/// This avoids locks and keeps it simple.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn TaskHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler under its own name. Registering the same name
    /// twice is a wiring bug, so it errors instead of overwriting.
    pub fn register(&mut self, handler: Arc<dyn TaskHandler>) -> Result<(), TurnstileError> {
        let name = handler.name();
        if self.handlers.contains_key(name) {
            return Err(TurnstileError::DuplicateHandler(name.to_string()));
        }
        self.handlers.insert(name.to_string(), handler);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn TaskHandler>> {
        self.handlers.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
