//! Supervisor configuration
//!
//! Every policy constant of the supervisor lives here so hosts can tune
//! thresholds from a JSON document without code changes. Missing fields
//! fall back to the defaults below.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level supervisor configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    pub retry: RetryConfig,
    pub health: HealthConfig,
    pub fragments: FragmentConfig,
    pub timers: TimerConfig,
    pub resume: ResumeConfig,
}

impl SupervisorConfig {
    /// Parse a (possibly partial) JSON document and validate it
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to pretty JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reject values the supervisor cannot operate with
    pub fn validate(&self) -> Result<()> {
        if self.retry.base_delay_ms == 0 || self.retry.max_delay_ms < self.retry.base_delay_ms {
            return Err(Error::InvalidConfig(format!(
                "retry delays must satisfy 0 < base ({}) <= max ({})",
                self.retry.base_delay_ms, self.retry.max_delay_ms
            )));
        }
        if !(0.0..1.0).contains(&self.retry.jitter_ratio) {
            return Err(Error::InvalidConfig(format!(
                "jitter ratio {} outside [0, 1)",
                self.retry.jitter_ratio
            )));
        }

        let h = &self.health;
        if h.sample_interval_ms == 0 {
            return Err(Error::InvalidConfig("health sample interval must be > 0".into()));
        }
        if h.window_ms > h.retention_ms {
            return Err(Error::InvalidConfig(format!(
                "health window ({} ms) exceeds retention ({} ms)",
                h.window_ms, h.retention_ms
            )));
        }
        if !(h.recover_threshold <= h.reload_threshold && h.reload_threshold <= h.severe_threshold) {
            return Err(Error::InvalidConfig(format!(
                "ladder thresholds must be ordered: {} <= {} <= {}",
                h.recover_threshold, h.reload_threshold, h.severe_threshold
            )));
        }

        if self.fragments.capacity == 0 || self.fragments.trim_to > self.fragments.capacity {
            return Err(Error::InvalidConfig(format!(
                "fragment log trim ({}) must not exceed capacity ({})",
                self.fragments.trim_to, self.fragments.capacity
            )));
        }

        if self.timers.network_check_interval_ms == 0 || self.resume.save_interval_ms == 0 {
            return Err(Error::InvalidConfig("periodic intervals must be > 0".into()));
        }
        if !(0.0..=1.0).contains(&self.resume.complete_ratio) {
            return Err(Error::InvalidConfig(format!(
                "resume completion ratio {} outside [0, 1]",
                self.resume.complete_ratio
            )));
        }

        Ok(())
    }
}

/// Retry Policy Engine constants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retry budget per burst
    pub max_attempts: u32,
    /// Delay for the first retry (ms)
    pub base_delay_ms: u64,
    /// Hard cap on the un-jittered delay (ms)
    pub max_delay_ms: u64,
    /// Jitter half-width as a fraction of the base delay
    pub jitter_ratio: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 1000,
            max_delay_ms: 16_000,
            jitter_ratio: 0.125,
        }
    }
}

/// Buffering Health Monitor constants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Playhead sampling period (ms)
    pub sample_interval_ms: u64,
    /// Classifier look-back window (ms)
    pub window_ms: u64,
    /// Events older than this are pruned on insert (ms)
    pub retention_ms: u64,
    /// Events needed for in-band recovery
    pub recover_threshold: usize,
    /// Events needed for a background reload
    pub reload_threshold: usize,
    /// Events needed for the severe buffering dialog
    pub severe_threshold: usize,
    /// Recovery budget per session
    pub max_recovery_attempts: u32,
    /// Delay before recovery phase two (ms)
    pub reload_phase_delay_ms: u64,
    /// Delay between recovery phases two and three (ms)
    pub seek_phase_delay_ms: u64,
    /// Rewind applied when restarting the load (s)
    pub reload_rewind_secs: f64,
    /// Rewind applied when seeking the surface (s)
    pub seek_rewind_secs: f64,
}

impl HealthConfig {
    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }

    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_millis(self.retention_ms)
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            sample_interval_ms: 5_000,
            window_ms: 60_000,
            retention_ms: 120_000,
            recover_threshold: 3,
            reload_threshold: 5,
            severe_threshold: 8,
            max_recovery_attempts: 3,
            reload_phase_delay_ms: 1_000,
            seek_phase_delay_ms: 2_000,
            reload_rewind_secs: 5.0,
            seek_rewind_secs: 2.0,
        }
    }
}

/// Fragment Error Tracker constants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FragmentConfig {
    /// Look-back window (ms)
    pub window_ms: u64,
    /// Entries that trigger the escalation policy
    pub capacity: usize,
    /// Entries kept after an in-band recovery
    pub trim_to: usize,
}

impl FragmentConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

impl Default for FragmentConfig {
    fn default() -> Self {
        Self {
            window_ms: 30_000,
            capacity: 8,
            trim_to: 3,
        }
    }
}

/// Session timers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimerConfig {
    /// Time allowed between session open and first progress (ms)
    pub loading_timeout_ms: u64,
    /// Offline polling period while loading (ms)
    pub network_check_interval_ms: u64,
    /// Delay before re-checking a blocked autoplay (ms)
    pub autoplay_check_ms: u64,
    /// Rewind applied when a background reload restores the playhead (s)
    pub background_reload_rewind_secs: f64,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            loading_timeout_ms: 30_000,
            network_check_interval_ms: 5_000,
            autoplay_check_ms: 10_000,
            background_reload_rewind_secs: 5.0,
        }
    }
}

/// Resume-position persistence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResumeConfig {
    /// Periodic save while playing (ms)
    pub save_interval_ms: u64,
    /// Fraction watched at which the record is dropped on natural end
    pub complete_ratio: f64,
}

impl Default for ResumeConfig {
    fn default() -> Self {
        Self {
            save_interval_ms: 10_000,
            complete_ratio: 0.95,
        }
    }
}
