//! Engine settings.
//!
//! Everything is expressed in whole seconds on the environment side and
//! carried as `Duration` internally. Unset variables fall back to defaults;
//! unparseable ones are a hard error, not a silent fallback.

use std::time::Duration;

use crate::error::TurnstileError;

/// Tunables for dispatch, execution and retention.
#[derive(Debug, Clone)]
pub struct Settings {
    /// How long finished/cancelled records stay readable.
    pub result_ttl: Duration,

    /// How long permanently failed records stay readable.
    pub failure_ttl: Duration,

    /// Hard wall-clock cap on one attempt.
    pub task_timeout: Duration,

    /// Extra slack added to `duration_hint` for the reservation TTL.
    pub idem_margin: Duration,

    /// Lifetime of the advisory cancel flag.
    pub cancel_ttl: Duration,

    /// Worker tasks to spawn.
    pub workers: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            result_ttl: Duration::from_secs(3600),
            failure_ttl: Duration::from_secs(86400),
            task_timeout: Duration::from_secs(600),
            idem_margin: Duration::from_secs(300),
            cancel_ttl: Duration::from_secs(3600),
            workers: 2,
        }
    }
}

impl Settings {
    /// Read settings from the environment, keeping defaults for anything
    /// unset: `RESULT_TTL`, `FAILURE_TTL`, `TASK_TIMEOUT`, `IDEMP_MARGIN`,
    /// `CANCEL_TTL` (seconds) and `WORKERS`.
    pub fn from_env() -> Result<Self, TurnstileError> {
        let mut settings = Self::default();

        if let Some(secs) = env_secs("RESULT_TTL")? {
            settings.result_ttl = secs;
        }
        if let Some(secs) = env_secs("FAILURE_TTL")? {
            settings.failure_ttl = secs;
        }
        if let Some(secs) = env_secs("TASK_TIMEOUT")? {
            settings.task_timeout = secs;
        }
        if let Some(secs) = env_secs("IDEMP_MARGIN")? {
            settings.idem_margin = secs;
        }
        if let Some(secs) = env_secs("CANCEL_TTL")? {
            settings.cancel_ttl = secs;
        }
        if let Some(raw) = env_raw("WORKERS") {
            settings.workers = parse_count("WORKERS", &raw)?;
        }

        Ok(settings)
    }
}

fn env_raw(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

fn env_secs(name: &str) -> Result<Option<Duration>, TurnstileError> {
    match env_raw(name) {
        Some(raw) => parse_secs(name, &raw).map(Some),
        None => Ok(None),
    }
}

fn parse_secs(name: &str, raw: &str) -> Result<Duration, TurnstileError> {
    raw.trim()
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|_| {
            TurnstileError::Config(format!("{name}: expected whole seconds, got '{raw}'"))
        })
}

fn parse_count(name: &str, raw: &str) -> Result<usize, TurnstileError> {
    let count = raw
        .trim()
        .parse::<usize>()
        .map_err(|_| TurnstileError::Config(format!("{name}: expected an integer, got '{raw}'")))?;
    if count == 0 {
        return Err(TurnstileError::Config(format!("{name}: must be at least 1")));
    }
    Ok(count)
}
