// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Exponential backoff for same-model retries of transient provider errors
//! (§4.3: base 200ms, factor 2, jitter ±25%, cap 4 attempts).

use rand::Rng;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub factor: f64,
    pub jitter_ratio: f64,
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(200),
            factor: 2.0,
            jitter_ratio: 0.25,
            max_attempts: 4,
        }
    }
}

impl BackoffPolicy {
    /// The delay before attempt number `attempt` (1-indexed; attempt 1 is the
    /// first retry after the initial try), with jitter applied.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = self.factor.powi(attempt.saturating_sub(1) as i32);
        let nominal_ms = self.base.as_millis() as f64 * exp;

        let mut rng = rand::thread_rng();
        let jitter = rng.gen_range(-self.jitter_ratio..=self.jitter_ratio);
        let jittered_ms = (nominal_ms * (1.0 + jitter)).max(0.0);
        Duration::from_millis(jittered_ms.round() as u64)
    }

    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_exponentially_within_jitter_bounds() {
        let policy = BackoffPolicy::default();
        for attempt in 1..=4 {
            let nominal = 200.0 * 2f64.powi((attempt - 1) as i32);
            let delay = policy.delay_for_attempt(attempt).as_millis() as f64;
            assert!(delay >= nominal * 0.75 - 1.0);
            assert!(delay <= nominal * 1.25 + 1.0);
        }
    }

    #[test]
    fn should_retry_caps_at_max_attempts() {
        let policy = BackoffPolicy::default();
        assert!(policy.should_retry(3));
        assert!(!policy.should_retry(4));
    }
}
