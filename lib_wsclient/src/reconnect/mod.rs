//! # Reconnection Strategies
//!
//! Computes the delay before the next reconnection attempt. Three strategies
//! share one signature (`delay(attempt) -> Duration`, attempt numbers are
//! 1-based):
//!
//! - **linear**: a constant `base_delay` every attempt.
//! - **exponential**: `min(max_delay, base_delay * 2^(attempt-1))`, then
//!   uniformly sampled down to 80% of the raw value so a fleet of clients
//!   reconnecting after the same outage does not stampede the server.
//! - **jittered**: `base_delay * attempt` plus a uniform random slice of
//!   `base_delay * jitter_factor`.
//!
//! When `max_attempts` is exhausted the caller must treat the connection as
//! terminally failed; the policy only computes delays.

#![doc(html_logo_url = "https://example.com/logo.png")] // Placeholder
#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// The delay-computation strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffType {
    /// Constant delay.
    Linear,
    /// Doubling delay with a cap and bounded downward jitter.
    #[default]
    Exponential,
    /// Linearly growing delay with additive random jitter.
    Jittered,
}

/// # Reconnect Policy
///
/// The full reconnection configuration carried by a connection's canonical
/// state. `max_attempts = None` means retry forever.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconnectPolicy {
    /// Which delay curve to use.
    pub strategy: BackoffType,
    /// Base delay in milliseconds.
    pub base_delay_ms: u64,
    /// Upper bound for the exponential strategy, in milliseconds.
    pub max_delay_ms: u64,
    /// Attempt budget; `None` retries without bound.
    pub max_attempts: Option<u32>,
    /// Jitter slice for the jittered strategy, in `[0, 1)`.
    pub jitter_factor: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            strategy: BackoffType::Exponential,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            max_attempts: Some(5),
            jitter_factor: 0.1,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before the given attempt. `attempt` is 1-based; values below 1
    /// are clamped to 1.
    pub fn delay(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        let base = self.base_delay_ms;
        let millis = match self.strategy {
            BackoffType::Linear => base,
            BackoffType::Exponential => {
                let raw = base
                    .saturating_mul(1u64.checked_shl(attempt - 1).unwrap_or(u64::MAX))
                    .min(self.max_delay_ms);
                let factor: f64 = rand::rng().random_range(0.8..=1.0);
                (raw as f64 * factor) as u64
            }
            BackoffType::Jittered => {
                let raw = base.saturating_mul(attempt as u64);
                let jitter_span = base as f64 * self.jitter_factor;
                let jitter = if jitter_span > 0.0 {
                    rand::rng().random_range(0.0..jitter_span)
                } else {
                    0.0
                };
                raw.saturating_add(jitter as u64)
            }
        };
        Duration::from_millis(millis)
    }

    /// The attempt budget, when one is configured.
    pub fn max_retries(&self) -> Option<u32> {
        self.max_attempts
    }

    /// True once `attempts` has consumed the whole budget.
    pub fn attempts_exhausted(&self, attempts: u32) -> bool {
        match self.max_attempts {
            Some(max) => attempts >= max,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_is_constant() {
        let policy = ReconnectPolicy {
            strategy: BackoffType::Linear,
            base_delay_ms: 500,
            max_delay_ms: 30_000,
            max_attempts: Some(3),
            jitter_factor: 0.0,
        };
        for attempt in 1..=3 {
            assert_eq!(policy.delay(attempt), Duration::from_millis(500));
        }
        assert!(!policy.attempts_exhausted(2));
        assert!(policy.attempts_exhausted(3));
    }

    #[test]
    fn exponential_stays_in_band_and_caps() {
        let policy = ReconnectPolicy {
            strategy: BackoffType::Exponential,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            max_attempts: None,
            jitter_factor: 0.0,
        };
        let bands: &[(u32, u64, u64)] = &[
            (1, 800, 1_000),
            (2, 1_600, 2_000),
            (5, 12_800, 16_000),
            (10, 24_000, 30_000),
        ];
        for _ in 0..50 {
            for (attempt, low, high) in bands {
                let delay = policy.delay(*attempt).as_millis() as u64;
                assert!(
                    delay >= *low && delay <= *high,
                    "attempt {}: {}ms outside [{}, {}]",
                    attempt,
                    delay,
                    low,
                    high
                );
            }
        }
    }

    #[test]
    fn exponential_never_exceeds_max_delay() {
        let policy = ReconnectPolicy {
            strategy: BackoffType::Exponential,
            base_delay_ms: 1_000,
            max_delay_ms: 5_000,
            max_attempts: None,
            jitter_factor: 0.0,
        };
        for attempt in 1..80 {
            assert!(policy.delay(attempt) <= Duration::from_millis(5_000));
        }
    }

    #[test]
    fn jittered_grows_with_attempt() {
        let policy = ReconnectPolicy {
            strategy: BackoffType::Jittered,
            base_delay_ms: 100,
            max_delay_ms: 30_000,
            max_attempts: None,
            jitter_factor: 0.5,
        };
        for _ in 0..50 {
            let d3 = policy.delay(3).as_millis() as u64;
            assert!((300..350).contains(&d3), "delay(3) = {}ms", d3);
        }
    }

    #[test]
    fn unlimited_budget_never_exhausts() {
        let policy = ReconnectPolicy {
            max_attempts: None,
            ..ReconnectPolicy::default()
        };
        assert!(!policy.attempts_exhausted(u32::MAX));
    }
}
