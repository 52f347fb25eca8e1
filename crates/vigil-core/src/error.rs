//! Error types for Vigil Core

use thiserror::Error;

/// Result type alias for supervisor operations
pub type Result<T> = std::result::Result<T, Error>;

/// Supervisor error types
#[derive(Error, Debug)]
pub enum Error {
    // Session errors
    #[error("No active playback session")]
    NoSession,

    #[error("Session {session} is no longer current")]
    StaleSession { session: u64 },

    #[error("Stream has ended; open a new session to continue")]
    StreamEnded,

    #[error("Invalid playback state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Operation '{operation}' not allowed in state {state}")]
    InvalidOperation { operation: &'static str, state: String },

    // Collaborator errors
    #[error("Media engine error: {0}")]
    Engine(String),

    #[error("Media engine unavailable on this platform")]
    EngineUnavailable,

    // Playlist errors
    #[error("Failed to parse playlist: {0}")]
    PlaylistParse(String),

    // MKV header errors
    #[error("Failed to fetch MKV header: {url}")]
    MkvFetch { url: String, source: reqwest::Error },

    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    // Persistence errors
    #[error("Resume store error: {0}")]
    ResumeStore(String),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create an engine error
    pub fn engine(msg: impl Into<String>) -> Self {
        Error::Engine(msg.into())
    }

    /// Returns true if a fresh engine instance may get past this error
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::Engine(_) | Error::MkvFetch { .. } | Error::Io(_)
        )
    }

    /// Returns the error code for logging
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::NoSession => "NO_SESSION",
            Error::StaleSession { .. } => "STALE_SESSION",
            Error::StreamEnded => "STREAM_ENDED",
            Error::InvalidStateTransition { .. } => "INVALID_STATE",
            Error::InvalidOperation { .. } => "INVALID_OPERATION",
            Error::Engine(_) => "ENGINE",
            Error::EngineUnavailable => "ENGINE_UNAVAILABLE",
            Error::PlaylistParse(_) => "PLAYLIST_PARSE",
            Error::MkvFetch { .. } => "MKV_FETCH",
            Error::InvalidUrl { .. } => "INVALID_URL",
            Error::ResumeStore(_) => "RESUME_STORE",
            Error::InvalidConfig(_) => "INVALID_CONFIG",
            Error::Json(_) => "JSON",
            Error::Io(_) => "IO",
        }
    }
}
