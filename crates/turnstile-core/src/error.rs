use thiserror::Error;

use crate::domain::JobId;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum TurnstileError {
    #[error("unknown task name={0}")]
    UnknownTask(String),

    #[error("duplicate handler for task name={0}")]
    DuplicateHandler(String),

    #[error("job not found id={0}")]
    JobNotFound(JobId),

    #[error("unknown queue name={0}")]
    UnknownQueue(String),

    #[error("invalid job id '{0}'")]
    InvalidJobId(String),

    #[error("config: {0}")]
    Config(String),

    #[error("store: {0}")]
    Store(#[from] StoreError),

    #[error("codec: {0}")]
    Codec(#[from] serde_json::Error),
}
