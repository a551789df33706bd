// SPDX-License-Identifier: MIT
//! Bounded retry for store transaction conflicts.
//!
//! A conflict means another check pass committed the same record first; the
//! only sound reaction is to re-read the record and re-derive the update, so
//! the retried closure must fetch fresh state on every attempt. Non-conflict
//! errors propagate immediately — retrying them would hide hard failures.

use std::time::Duration;
use tracing::{debug, warn};

use crate::config::ConflictRetryConfig;
use crate::error::{EngineError, StoreError};

/// Retry `f` while it fails with [`StoreError::Conflict`].
///
/// Returns the first success, the first non-conflict error, or
/// [`EngineError::ConflictRetriesExhausted`] once `config.max_attempts`
/// conflicts have been observed. The delay starts at
/// `config.initial_delay()` and is multiplied by `config.multiplier` after
/// each attempt, capped at `config.max_delay()`.
pub async fn retry_on_conflict<F, Fut, T>(
    config: &ConflictRetryConfig,
    user_id: &str,
    achievement_id: &str,
    mut f: F,
) -> Result<T, EngineError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, EngineError>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut delay = config.initial_delay();

    for attempt in 1..=max_attempts {
        match f().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(user_id, achievement_id, attempt, "conflict retry succeeded");
                }
                return Ok(value);
            }
            Err(EngineError::Store(StoreError::Conflict { .. })) if attempt < max_attempts => {
                warn!(
                    user_id,
                    achievement_id,
                    attempt,
                    max = max_attempts,
                    delay_ms = delay.as_millis(),
                    "update conflict — retrying with fresh state"
                );
                tokio::time::sleep(delay).await;
                let next_ms = (delay.as_millis() as f64 * config.multiplier) as u128;
                delay = Duration::from_millis(next_ms.min(config.max_delay().as_millis()) as u64);
            }
            Err(EngineError::Store(StoreError::Conflict { .. })) => {
                warn!(
                    user_id,
                    achievement_id,
                    attempts = max_attempts,
                    "conflict retries exhausted"
                );
                return Err(EngineError::ConflictRetriesExhausted {
                    user_id: user_id.to_string(),
                    achievement_id: achievement_id.to_string(),
                    attempts: max_attempts,
                });
            }
            Err(other) => return Err(other),
        }
    }

    unreachable!("loop returns on every branch of the final attempt")
}
