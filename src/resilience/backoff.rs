//! Exponential backoff with jitter.
//!
//! Spaces re-registration attempts of errored microservices: attempt `n`
//! waits `base * 2^(n-1)`, capped at `max`, plus up to 10% jitter.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;

/// Delay before attempt number `attempt` (0 means no delay).
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let factor = 2u64.saturating_pow(attempt - 1);
    let capped = base_ms.saturating_mul(factor).min(max_ms);

    let jitter_range = capped / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped + jitter)
}

/// Whether a retry after `attempt` failures, the last at `last`, is due at `now`.
pub fn retry_due(
    last: Option<DateTime<Utc>>,
    attempt: u32,
    base_ms: u64,
    max_ms: u64,
    now: DateTime<Utc>,
) -> bool {
    let Some(last) = last else {
        return true;
    };
    let wait = calculate_backoff(attempt, base_ms, max_ms);
    match chrono::Duration::from_std(wait) {
        Ok(wait) => now >= last + wait,
        Err(_) => false,
    }
}
