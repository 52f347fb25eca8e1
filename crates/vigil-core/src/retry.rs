//! Retry Policy Engine
//!
//! Exponential backoff with symmetric jitter for pre-start failures:
//! - Base delay doubles per attempt up to a hard cap
//! - Jitter keeps clients reloading the same origin from synchronising
//! - Pure policy, no I/O or timers

use crate::config::RetryConfig;
use rand::Rng;
use tracing::debug;

/// Bounded retry counter with backoff computation
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts consumed in the current burst
    attempts: u32,
    /// Policy constants
    config: RetryConfig,
}

impl RetryPolicy {
    /// Create a new retry policy
    pub fn new(config: RetryConfig) -> Self {
        Self { attempts: 0, config }
    }

    /// True while the budget has attempts left
    pub fn can_retry(&self) -> bool {
        self.attempts < self.config.max_attempts
    }

    /// Attempts consumed so far
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Retry budget
    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }

    /// Consume an attempt and return the jittered delay, or `None` once exhausted
    pub fn next_delay_ms(&mut self) -> Option<u64> {
        self.next_delay_ms_with(&mut rand::thread_rng())
    }

    /// Same as [`next_delay_ms`](Self::next_delay_ms) with an explicit RNG
    pub fn next_delay_ms_with<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<u64> {
        if !self.can_retry() {
            return None;
        }
        self.attempts += 1;

        let base = self.base_delay_ms(self.attempts) as f64;
        let spread = base * self.config.jitter_ratio;
        let jitter = if spread > 0.0 {
            rng.gen_range(-spread..=spread)
        } else {
            0.0
        };
        let delay = (base + jitter).round().max(0.0) as u64;

        debug!(
            attempt = self.attempts,
            max = self.config.max_attempts,
            base_ms = base as u64,
            delay_ms = delay,
            "Retry scheduled"
        );

        Some(delay)
    }

    /// Un-jittered delay for a 1-based attempt number
    pub fn base_delay_ms(&self, attempt: u32) -> u64 {
        // attempt 1 => base, attempt 2 => 2*base, ...; shifts past 63 saturate
        let shift = attempt.saturating_sub(1);
        let multiplier = 1u64.checked_shl(shift).unwrap_or(u64::MAX);
        self.config
            .base_delay_ms
            .saturating_mul(multiplier)
            .min(self.config.max_delay_ms)
    }

    /// Start a fresh burst
    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}
