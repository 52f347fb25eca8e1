//! Media engine and media surface contracts
//!
//! The supervisor never decodes media. It drives a segmented-media engine
//! (an hls.js-style player) attached to a media surface (a `<video>`-style
//! element) through these traits, and reacts to the events the host forwards
//! from them.

use crate::stream_end::PlaylistSnapshot;
use crate::types::SessionId;
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Segmented-media engine bound to one session
pub trait MediaEngine: Send + Sync {
    /// Bind to the media surface
    fn attach_media(&mut self, surface: Arc<dyn MediaSurface>) -> Result<()>;

    /// Unbind from the media surface
    fn detach_media(&mut self) -> Result<()>;

    /// Load a playlist URL
    fn load_source(&mut self, url: &str) -> Result<()>;

    /// (Re)start segment loading, optionally from a playhead offset (s)
    fn start_load(&mut self, start_position: Option<f64>) -> Result<()>;

    /// Stop segment loading
    fn stop_load(&mut self) -> Result<()>;

    /// Flush decode buffers after a media error
    fn recover_media_error(&mut self) -> Result<()>;

    /// Release every engine resource
    fn destroy(&mut self) -> Result<()>;
}

/// Creates engines; one instance per session (and per retry)
pub trait EngineFactory: Send + Sync {
    /// Whether the platform can run the engine at all
    fn is_supported(&self) -> bool;

    /// Create an engine whose events will be tagged with `session`
    fn create(&self, session: SessionId) -> Result<Box<dyn MediaEngine>>;
}

/// `readyState` of the media surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ReadyState {
    HaveNothing = 0,
    HaveMetadata = 1,
    HaveCurrentData = 2,
    HaveFutureData = 3,
    HaveEnoughData = 4,
}

/// Why the surface refused `play()`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlayRejection {
    /// Autoplay blocked until the user interacts (`NotAllowedError`)
    NotAllowed,
    /// Superseded by a newer load or pause (`AbortError`)
    Abort,
    /// Format refused (`NotSupportedError`)
    NotSupported,
    /// Anything else
    Other(String),
}

impl std::fmt::Display for PlayRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlayRejection::NotAllowed => write!(f, "NotAllowedError"),
            PlayRejection::Abort => write!(f, "AbortError"),
            PlayRejection::NotSupported => write!(f, "NotSupportedError"),
            PlayRejection::Other(msg) => write!(f, "{}", msg),
        }
    }
}

/// Media surface (video element)
#[async_trait]
pub trait MediaSurface: Send + Sync {
    /// Playhead (s)
    fn current_time(&self) -> f64;

    /// Seek (s)
    fn set_current_time(&self, position: f64);

    /// Media duration (s); NaN or infinite for live streams
    fn duration(&self) -> f64;

    fn paused(&self) -> bool;

    fn ended(&self) -> bool;

    fn ready_state(&self) -> ReadyState;

    /// Request playback
    async fn play(&self) -> std::result::Result<(), PlayRejection>;

    fn pause(&self);

    /// Reset the element after a source change
    fn load(&self);

    /// Point the element at a URL, or clear it with `None`
    fn set_source(&self, url: Option<&str>);

    /// Whether the element can play HLS without an engine
    fn supports_native_hls(&self) -> bool;

    /// True when the playhead is not advancing smoothly
    fn is_stuck(&self) -> bool {
        self.paused() || self.ready_state() < ReadyState::HaveFutureData
    }
}

/// Engine error category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    Network,
    Media,
    Other,
}

/// Engine error detail
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorDetails {
    ManifestLoad,
    ManifestTimeout,
    ManifestParse,
    LevelLoad,
    FragmentLoad,
    FragmentTimeout,
    BufferStalled,
    BufferAppend,
    Other(String),
}

impl ErrorDetails {
    pub fn is_fragment(&self) -> bool {
        matches!(self, ErrorDetails::FragmentLoad | ErrorDetails::FragmentTimeout)
    }

    pub fn is_manifest(&self) -> bool {
        matches!(
            self,
            ErrorDetails::ManifestLoad | ErrorDetails::ManifestTimeout | ErrorDetails::ManifestParse
        )
    }
}

/// Payload of the engine's single error event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineErrorEvent {
    pub error_type: ErrorType,
    pub details: ErrorDetails,
    pub fatal: bool,
    /// URL of the fragment involved, if any
    pub fragment_url: Option<String>,
}

impl EngineErrorEvent {
    pub fn network(details: ErrorDetails, fatal: bool) -> Self {
        Self {
            error_type: ErrorType::Network,
            details,
            fatal,
            fragment_url: None,
        }
    }

    pub fn media(details: ErrorDetails, fatal: bool) -> Self {
        Self {
            error_type: ErrorType::Media,
            details,
            fatal,
            fragment_url: None,
        }
    }

    /// Fragment load failure for `url`
    pub fn fragment(url: impl Into<String>, fatal: bool) -> Self {
        Self {
            error_type: ErrorType::Network,
            details: ErrorDetails::FragmentLoad,
            fatal,
            fragment_url: Some(url.into()),
        }
    }
}

/// Events forwarded from the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EngineEvent {
    ManifestParsed,
    ManifestLoaded { playlist: PlaylistSnapshot },
    LevelLoaded { playlist: PlaylistSnapshot },
    FragmentLoaded { url: String },
    Error(EngineErrorEvent),
}

/// Events forwarded from the media surface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SurfaceEvent {
    LoadedMetadata,
    CanPlay,
    Playing,
    Pause,
    Ended,
    Stalled,
    Waiting,
    Error { message: String },
}
