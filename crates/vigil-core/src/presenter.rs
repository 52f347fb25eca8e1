//! User-facing escalation surfaces
//!
//! The controller never renders anything. It names an error kind from a
//! closed set and hands the presenter a [`Notice`]; buttons on the notice
//! carry an [`ActionTrigger`] bound to the session that created them.

use crate::session::ActionTrigger;
use serde::{Deserialize, Serialize};

/// Closed set of user-visible error kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlaybackErrorKind {
    StreamFailedToStart,
    StreamInterrupted,
    NoSignal,
    MediaError,
    MediaRecoveryFailed,
    AutoplayFailed,
    Unsupported,
    BufferingIssues,
    NoInternet,
    LoadingTimeout,
    HlsFatal,
    VideoError,
    PlaybackFailed,
}

impl PlaybackErrorKind {
    /// Stable code shared with the UI layer
    pub fn code(&self) -> &'static str {
        match self {
            PlaybackErrorKind::StreamFailedToStart => "STREAM_FAILED_TO_START",
            PlaybackErrorKind::StreamInterrupted => "STREAM_INTERRUPTED",
            PlaybackErrorKind::NoSignal => "NO_SIGNAL",
            PlaybackErrorKind::MediaError => "MEDIA_ERROR",
            PlaybackErrorKind::MediaRecoveryFailed => "MEDIA_RECOVERY_FAILED",
            PlaybackErrorKind::AutoplayFailed => "AUTOPLAY_FAILED",
            PlaybackErrorKind::Unsupported => "UNSUPPORTED",
            PlaybackErrorKind::BufferingIssues => "BUFFERING_ISSUES",
            PlaybackErrorKind::NoInternet => "NO_INTERNET",
            PlaybackErrorKind::LoadingTimeout => "LOADING_TIMEOUT",
            PlaybackErrorKind::HlsFatal => "HLS_FATAL",
            PlaybackErrorKind::VideoError => "VIDEO_ERROR",
            PlaybackErrorKind::PlaybackFailed => "PLAYBACK_FAILED",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            PlaybackErrorKind::StreamFailedToStart => "Stream unavailable",
            PlaybackErrorKind::StreamInterrupted => "Connection interrupted",
            PlaybackErrorKind::NoSignal => "No signal",
            PlaybackErrorKind::MediaError => "Playback error",
            PlaybackErrorKind::MediaRecoveryFailed => "Playback error",
            PlaybackErrorKind::AutoplayFailed => "Tap to play",
            PlaybackErrorKind::Unsupported => "Format not supported",
            PlaybackErrorKind::BufferingIssues => "Buffering",
            PlaybackErrorKind::NoInternet => "No internet connection",
            PlaybackErrorKind::LoadingTimeout => "Loading timed out",
            PlaybackErrorKind::HlsFatal => "Stream error",
            PlaybackErrorKind::VideoError => "Video error",
            PlaybackErrorKind::PlaybackFailed => "Playback failed",
        }
    }

    pub fn default_message(&self) -> &'static str {
        match self {
            PlaybackErrorKind::StreamFailedToStart => {
                "The stream could not be started. It may be offline or temporarily unavailable."
            }
            PlaybackErrorKind::StreamInterrupted => {
                "The connection to the stream was lost."
            }
            PlaybackErrorKind::NoSignal => "This channel is currently not broadcasting.",
            PlaybackErrorKind::MediaError => "The stream could not be decoded.",
            PlaybackErrorKind::MediaRecoveryFailed => {
                "Playback could not be recovered after repeated media errors."
            }
            PlaybackErrorKind::AutoplayFailed => "Your browser blocked autoplay. Tap to start playback.",
            PlaybackErrorKind::Unsupported => "This stream format is not supported on this device.",
            PlaybackErrorKind::BufferingIssues => {
                "Playback keeps buffering. Reload the stream or keep watching."
            }
            PlaybackErrorKind::NoInternet => "Check your internet connection and try again.",
            PlaybackErrorKind::LoadingTimeout => "The stream took too long to load.",
            PlaybackErrorKind::HlsFatal => "The stream reported an unrecoverable error.",
            PlaybackErrorKind::VideoError => "The video element reported an error.",
            PlaybackErrorKind::PlaybackFailed => "Playback could not be started.",
        }
    }
}

impl std::fmt::Display for PlaybackErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// What a button does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Full retry with a fresh engine and the loading UI
    Retry,
    /// Re-create the engine behind the current picture
    Reload,
    /// Dismiss and let the engine keep loading
    KeepTrying,
    /// Dismiss and carry on
    Continue,
    /// Request playback after a blocked autoplay
    TapToPlay,
    /// Tear the session down
    Close,
}

impl ActionKind {
    pub fn label(&self) -> &'static str {
        match self {
            ActionKind::Retry => "Retry",
            ActionKind::Reload => "Reload",
            ActionKind::KeepTrying => "Keep trying",
            ActionKind::Continue => "Continue",
            ActionKind::TapToPlay => "Play",
            ActionKind::Close => "Close",
        }
    }
}

/// A button on a notice
#[derive(Debug, Clone)]
pub struct Action {
    pub kind: ActionKind,
    pub label: String,
    /// Invoke when the button is pressed
    pub trigger: ActionTrigger,
}

/// Content handed to the presenter
#[derive(Debug, Clone)]
pub struct Notice {
    pub kind: PlaybackErrorKind,
    pub title: String,
    pub message: String,
    pub actions: Vec<Action>,
}

impl Notice {
    /// Notice with the kind's default wording and no actions
    pub fn new(kind: PlaybackErrorKind) -> Self {
        Self {
            kind,
            title: kind.title().to_string(),
            message: kind.default_message().to_string(),
            actions: Vec::new(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    pub fn action_kinds(&self) -> Vec<ActionKind> {
        self.actions.iter().map(|a| a.kind).collect()
    }
}

/// UI collaborator
pub trait Presenter: Send + Sync {
    /// Loading spinner with the stream name
    fn show_loading(&self, name: &str);

    fn hide_loading(&self);

    /// Inline error panel replacing the media surface
    fn show_error(&self, notice: Notice);

    /// Floating overlay over the media surface
    fn show_overlay(&self, notice: Notice);

    /// Transient notification (auto-dismisses after a few seconds)
    fn notify(&self, kind: PlaybackErrorKind, message: &str);

    /// Remove the panel, overlay or dialog showing `kind`
    fn dismiss(&self, kind: PlaybackErrorKind);

    /// Remove everything the current session put on screen
    fn clear(&self);
}

/// Platform network status
pub trait Connectivity: Send + Sync {
    fn is_online(&self) -> bool;
}

/// Connectivity probe for hosts without one
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysOnline;

impl Connectivity for AlwaysOnline {
    fn is_online(&self) -> bool {
        true
    }
}
