//! Fragment Error Tracker
//!
//! Bounded, time-windowed log of segment load failures. The controller
//! consults it when the log fills up to tell signal loss apart from a flaky
//! origin.

use crate::config::FragmentConfig;
use crate::stream_end::SIGNAL_LOST_SENTINEL;
use std::collections::VecDeque;
use tokio::time::Instant;

/// Failure flavour reported by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentErrorKind {
    LoadError,
    Timeout,
}

/// One logged failure
#[derive(Debug, Clone)]
pub struct FragmentError {
    pub at: Instant,
    pub url: String,
    pub kind: FragmentErrorKind,
}

/// Bounded fragment error log
#[derive(Debug, Clone)]
pub struct FragmentErrorLog {
    entries: VecDeque<FragmentError>,
    config: FragmentConfig,
}

impl FragmentErrorLog {
    pub fn new(config: FragmentConfig) -> Self {
        Self {
            entries: VecDeque::with_capacity(config.capacity),
            config,
        }
    }

    /// Log a failure; returns the number of entries inside the window
    pub fn record(&mut self, url: impl Into<String>, kind: FragmentErrorKind, now: Instant) -> usize {
        let window = self.config.window();
        self.entries
            .retain(|e| now.saturating_duration_since(e.at) <= window);
        self.entries.push_back(FragmentError {
            at: now,
            url: url.into(),
            kind,
        });
        while self.entries.len() > self.config.capacity {
            self.entries.pop_front();
        }
        self.entries.len()
    }

    /// True once the log holds `capacity` entries
    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.config.capacity
    }

    /// Every entry is the same URL and that URL is the signal-loss sentinel
    pub fn all_same_sentinel(&self) -> bool {
        let mut urls = self.entries.iter().map(|e| e.url.as_str());
        match urls.next() {
            Some(first) => first.contains(SIGNAL_LOST_SENTINEL) && urls.all(|u| u == first),
            None => false,
        }
    }

    /// Keep only the most recent entries after an in-band recovery
    pub fn trim_to_recent(&mut self) {
        while self.entries.len() > self.config.trim_to {
            self.entries.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FragmentError> {
        self.entries.iter()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
