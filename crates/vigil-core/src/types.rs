//! Core types for Vigil

use serde::{Deserialize, Serialize};

/// Identifier for one playback session
///
/// Generations increase monotonically for the lifetime of a controller, so a
/// delayed callback can tell whether the session it was scheduled for is
/// still the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionId(pub u64);

impl SessionId {
    pub fn generation(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Supervisor state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlaybackState {
    /// No session
    Idle,
    /// Session opened, engine attached, awaiting first fragment
    Loading,
    /// First progress observed
    Playing,
    /// Transient fault being addressed in-band
    Recovering,
    /// Signal loss detected; only `close()` leaves this state
    Ended,
    /// Retry budget exhausted (or start aborted) before first progress
    FailedToStart,
}

impl PlaybackState {
    /// Check if transition to target state is valid
    pub fn can_transition_to(&self, target: PlaybackState) -> bool {
        use PlaybackState::*;
        matches!(
            (self, target),
            // From Idle
            (Idle, Loading) |
            // From Loading
            (Loading, Loading) | (Loading, Playing) | (Loading, FailedToStart) | (Loading, Ended) |
            // From Playing
            (Playing, Recovering) | (Playing, Loading) | (Playing, Ended) |
            // From Recovering
            (Recovering, Playing) | (Recovering, Recovering) | (Recovering, Loading) | (Recovering, Ended) |
            // From FailedToStart
            (FailedToStart, Loading) |
            // Close is always allowed
            (_, Idle)
        )
    }

    /// True once first progress has been observed in this session
    pub fn is_post_start(&self) -> bool {
        matches!(self, PlaybackState::Playing | PlaybackState::Recovering)
    }

    /// True when automatic activity has stopped for good
    pub fn is_terminal(&self) -> bool {
        matches!(self, PlaybackState::Ended | PlaybackState::FailedToStart)
    }
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackState::Idle => write!(f, "idle"),
            PlaybackState::Loading => write!(f, "loading"),
            PlaybackState::Playing => write!(f, "playing"),
            PlaybackState::Recovering => write!(f, "recovering"),
            PlaybackState::Ended => write!(f, "ended"),
            PlaybackState::FailedToStart => write!(f, "failed-to-start"),
        }
    }
}

/// What to open
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackRequest {
    /// Stream or VOD URL
    pub url: String,
    /// Display name shown by the presenter
    pub name: String,
    /// Resume-store key for VOD content
    pub movie_id: Option<String>,
    /// Poster shown in "continue watching" lists
    pub poster: Option<String>,
    /// Playhead to restore once playback starts (s)
    pub start_position: Option<f64>,
}

impl PlaybackRequest {
    /// Create a request for a live stream or anonymous VOD
    pub fn new(url: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            name: name.into(),
            movie_id: None,
            poster: None,
            start_position: None,
        }
    }

    /// Track resume position under this movie id
    pub fn with_movie_id(mut self, movie_id: impl Into<String>) -> Self {
        self.movie_id = Some(movie_id.into());
        self
    }

    /// Set the poster URL
    pub fn with_poster(mut self, poster: impl Into<String>) -> Self {
        self.poster = Some(poster.into());
        self
    }

    /// Start from a saved position
    pub fn with_start_position(mut self, position: f64) -> Self {
        self.start_position = Some(position);
        self
    }
}

/// Point-in-time view of the current session, for hosts and tests
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub id: SessionId,
    pub url: String,
    pub name: String,
    pub state: PlaybackState,
    pub playback_started: bool,
    pub stream_ended: bool,
    pub autoplay_blocked_shown: bool,
    pub native_playback: bool,
    pub retry_attempts: u32,
    pub recovery_attempts: u32,
    pub buffering_events: usize,
    pub fragment_errors: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_transitions() {
        use PlaybackState::*;
        assert!(Idle.can_transition_to(Loading));
        assert!(Loading.can_transition_to(Loading));
        assert!(Loading.can_transition_to(Playing));
        assert!(Loading.can_transition_to(FailedToStart));
        assert!(Playing.can_transition_to(Recovering));
        assert!(Recovering.can_transition_to(Playing));
        assert!(FailedToStart.can_transition_to(Loading));

        assert!(!Idle.can_transition_to(Playing));
        assert!(!Ended.can_transition_to(Loading));
        assert!(!Ended.can_transition_to(Playing));
        assert!(!FailedToStart.can_transition_to(Playing));
    }

    #[test]
    fn test_any_state_can_close() {
        use PlaybackState::*;
        for state in [Idle, Loading, Playing, Recovering, Ended, FailedToStart] {
            assert!(state.can_transition_to(Idle), "{state} -> idle");
        }
    }

    #[test]
    fn test_terminal_and_post_start_states() {
        use PlaybackState::*;
        assert!(Ended.is_terminal());
        assert!(FailedToStart.is_terminal());
        for state in [Idle, Loading, Playing, Recovering] {
            assert!(!state.is_terminal(), "{state}");
        }
        assert!(Playing.is_post_start() && Recovering.is_post_start());
        assert!(!Loading.is_post_start());
    }

    #[test]
    fn test_request_builder() {
        let request = PlaybackRequest::new("https://x/movie.mkv", "Movie")
            .with_movie_id("m-42")
            .with_start_position(120.0);
        assert_eq!(request.movie_id.as_deref(), Some("m-42"));
        assert_eq!(request.start_position, Some(120.0));
        assert!(request.poster.is_none());
    }
}
