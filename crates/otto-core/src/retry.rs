// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::time::Duration;

/// Backoff policy for transient and rate-limited provider failures.
///
/// Exponential growth with multiplicative jitter; a `Retry-After` hint from
/// the provider wins when it is larger than the computed delay.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub initial: Duration,
    pub factor: f64,
    pub cap: Duration,
    /// Total attempts, including the first one.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(500),
            factor: 2.0,
            cap: Duration::from_secs(30),
            max_attempts: 5,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based: the first retry gets
    /// the initial delay).
    pub fn delay(&self, attempt: u32, hint: Option<Duration>) -> Duration {
        let exp = self.initial.as_secs_f64() * self.factor.powi(attempt.saturating_sub(1) as i32);
        let capped = exp.min(self.cap.as_secs_f64());
        // Jitter in [0.75, 1.25) de-synchronizes concurrent turns hitting
        // the same throttled endpoint.
        let jittered = capped * (0.75 + rand::random::<f64>() * 0.5);
        let delay = Duration::from_secs_f64(jittered.min(self.cap.as_secs_f64()));
        match hint {
            Some(h) if h > delay => h,
            _ => delay,
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
