//! Bounded retry with exponential backoff for transient store failures.

use std::thread;
use std::time::{Duration, Instant};

use crate::constants::{RETRY_INITIAL_BACKOFF, RETRY_MAX_ATTEMPTS, RETRY_TOTAL_CEILING};
use crate::error::{EngineError, Result};

/// Retry schedule: at most `max_attempts` tries, doubling the backoff after
/// each failure, never sleeping past `total_ceiling` in aggregate.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub total_ceiling: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: RETRY_MAX_ATTEMPTS,
            initial_backoff: RETRY_INITIAL_BACKOFF,
            total_ceiling: RETRY_TOTAL_CEILING,
        }
    }
}

/// Run `op`, re-issuing it on failures `is_retriable` accepts, within the
/// policy's attempt and time bounds. The final error surfaces unchanged.
pub fn with_retry<T>(
    policy: &RetryPolicy,
    is_retriable: impl Fn(&EngineError) -> bool,
    mut op: impl FnMut() -> Result<T>,
) -> Result<T> {
    let started = Instant::now();
    let mut backoff = policy.initial_backoff;

    for attempt in 1..=policy.max_attempts {
        match op() {
            Ok(value) => return Ok(value),
            Err(err) => {
                let out_of_budget = attempt >= policy.max_attempts
                    || started.elapsed() + backoff > policy.total_ceiling;
                if !is_retriable(&err) || out_of_budget {
                    return Err(err);
                }
                tracing::debug!(
                    retry.attempt = attempt,
                    retry.backoff_ms = backoff.as_millis() as u64,
                    error = %err,
                    "transient failure, backing off"
                );
                thread::sleep(backoff);
                backoff = backoff.saturating_mul(2);
            }
        }
    }

    // max_attempts >= 1 means the loop always returns from inside.
    Err(EngineError::TransientBackend {
        reason: "retry loop exhausted".into(),
    })
}
