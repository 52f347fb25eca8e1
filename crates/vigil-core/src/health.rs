//! Buffering Health Monitor
//!
//! Handles:
//! - Time-bounded buffering event log
//! - Playhead progress sampling
//! - Escalation ladder classification
//!
//! The monitor only classifies. The session controller owns the media
//! engine and surface, so it runs the timer and executes whatever action the
//! ladder asks for.

use crate::config::HealthConfig;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tokio::time::Instant;
use tracing::debug;

/// Buffering event tags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BufferingEventKind {
    /// Surface `stalled` event
    Stalled,
    /// Surface `waiting` event
    Waiting,
    /// Playhead did not move between two samples
    NoProgress,
    /// Engine reported a stalled buffer or fragment errors piled up
    BufferStalled,
}

impl std::fmt::Display for BufferingEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BufferingEventKind::Stalled => write!(f, "stalled"),
            BufferingEventKind::Waiting => write!(f, "waiting"),
            BufferingEventKind::NoProgress => write!(f, "no_progress"),
            BufferingEventKind::BufferStalled => write!(f, "buffer_stalled"),
        }
    }
}

/// One logged buffering event
#[derive(Debug, Clone, Copy)]
pub struct BufferingEvent {
    pub kind: BufferingEventKind,
    pub at: Instant,
}

/// Time-bounded buffering event log
#[derive(Debug, Clone)]
pub struct BufferingLog {
    events: VecDeque<BufferingEvent>,
    config: HealthConfig,
}

impl BufferingLog {
    pub fn new(config: HealthConfig) -> Self {
        Self {
            events: VecDeque::new(),
            config,
        }
    }

    /// Append an event, pruning everything older than the retention period
    pub fn record(&mut self, kind: BufferingEventKind, now: Instant) {
        self.prune(now);
        self.events.push_back(BufferingEvent { kind, at: now });
        debug!(kind = %kind, total = self.events.len(), "Buffering event recorded");
    }

    /// Number of events inside the classifier window
    pub fn recent(&self, now: Instant) -> usize {
        let window = self.config.window();
        self.events
            .iter()
            .filter(|e| now.saturating_duration_since(e.at) <= window)
            .count()
    }

    /// Events currently retained
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Oldest retained event
    pub fn oldest(&self) -> Option<&BufferingEvent> {
        self.events.front()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    fn prune(&mut self, now: Instant) {
        let retention = self.config.retention();
        while let Some(front) = self.events.front() {
            if now.saturating_duration_since(front.at) > retention {
                self.events.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Escalation ladder outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthAction {
    /// Nothing to do
    Healthy,
    /// Run the in-band recovery sequence
    Recover,
    /// Re-create the engine behind the current picture
    BackgroundReload,
    /// Ask the user
    Severe,
}

/// Classify buffering health; thresholds are checked in ladder order so
/// ties go to the earlier action
pub fn classify(recent_events: usize, recovery_attempts: u32, config: &HealthConfig) -> HealthAction {
    if recent_events >= config.recover_threshold && recovery_attempts == 0 {
        HealthAction::Recover
    } else if recent_events >= config.reload_threshold && recovery_attempts == 1 {
        HealthAction::BackgroundReload
    } else if recent_events >= config.severe_threshold {
        HealthAction::Severe
    } else {
        HealthAction::Healthy
    }
}

/// Detects lack of playhead progress between periodic samples
#[derive(Debug, Clone, Default)]
pub struct PlayheadSampler {
    last: Option<f64>,
}

impl PlayheadSampler {
    /// Start sampling from a known playhead
    pub fn starting_at(position: f64) -> Self {
        Self { last: Some(position) }
    }

    /// Record a sample; true when it matches the previous one
    pub fn sample(&mut self, position: f64) -> bool {
        let stuck = self.last == Some(position);
        self.last = Some(position);
        stuck
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}
