// SPDX-FileCopyrightText: 2026 Echothread Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Exponential backoff with full jitter for transient post failures.

use std::time::Duration;

use rand::Rng;

/// Retries beyond this count surface the last error to the caller.
pub const MAX_POST_ATTEMPTS: u32 = 5;

/// Base delay for the first retry.
const BASE: Duration = Duration::from_millis(250);

/// Ceiling on any single delay.
const CAP: Duration = Duration::from_secs(8);

/// Delay to sleep before retry number `attempt` (1-based): a uniformly
/// random duration in `[0, min(cap, base * 2^(attempt-1))]`.
pub fn full_jitter_delay(attempt: u32) -> Duration {
    let exp = BASE.saturating_mul(1u32 << (attempt - 1).min(10));
    let ceiling = exp.min(CAP);
    let millis = rand::thread_rng().gen_range(0..=ceiling.as_millis() as u64);
    Duration::from_millis(millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_stay_under_cap() {
        for attempt in 1..=MAX_POST_ATTEMPTS {
            for _ in 0..50 {
                assert!(full_jitter_delay(attempt) <= CAP);
            }
        }
    }

    #[test]
    fn first_attempt_ceiling_is_base() {
        for _ in 0..50 {
            assert!(full_jitter_delay(1) <= BASE);
        }
    }

    #[test]
    fn large_attempt_does_not_overflow() {
        let _ = full_jitter_delay(40);
    }
}
