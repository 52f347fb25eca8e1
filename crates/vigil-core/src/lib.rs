//! Vigil Core - Streaming Playback Supervisor
//!
//! This crate supervises an external segmented-media engine attached to a
//! media surface:
//! - Playback session lifecycle and state machine
//! - Pre-start retries with exponential backoff and jitter
//! - Post-start buffering health and escalating in-band recovery
//! - Signal-loss ("no signal") detection from playlists and fragments
//! - Fragment error tracking
//! - Matroska track-header extraction for VOD files
//! - Resume positions for VOD content
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         Vigil Core                              │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐           │
//! │  │    Retry     │  │   Buffering  │  │  Stream-End  │           │
//! │  │    Policy    │  │    Health    │  │   Detector   │           │
//! │  └──────┬───────┘  └──────┬───────┘  └──────┬───────┘           │
//! │         │                 │                 │                   │
//! │         └─────────────────┼─────────────────┘                   │
//! │                           │                                     │
//! │                    ┌──────┴──────┐                              │
//! │                    │  Playback   │                              │
//! │                    │ Controller  │                              │
//! │                    └──────┬──────┘                              │
//! │                           │                                     │
//! │  ┌──────────────┐  ┌──────┴──────┐  ┌──────────────┐            │
//! │  │   Fragment   │  │  Engine /   │  │  Presenter   │            │
//! │  │    Errors    │  │  Surface    │  │   Notices    │            │
//! │  └──────────────┘  └─────────────┘  └──────────────┘            │
//! │                                                                 │
//! │  ┌──────────────┐  ┌──────────────┐                             │
//! │  │  MKV Track   │  │    Resume    │                             │
//! │  │  Extractor   │  │    Store     │                             │
//! │  └──────────────┘  └──────────────┘                             │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod fragments;
pub mod health;
pub mod mkv;
pub mod presenter;
pub mod resume;
pub mod retry;
pub mod session;
pub mod stream_end;
pub mod types;

#[cfg(test)]
mod mock;

pub use config::SupervisorConfig;
pub use engine::{EngineEvent, EngineFactory, MediaEngine, MediaSurface, SurfaceEvent};
pub use error::{Error, Result};
pub use fragments::FragmentErrorLog;
pub use health::{BufferingLog, HealthAction};
pub use mkv::{extract_tracks, HeaderFetcher, MkvTrack, MkvTracks};
pub use presenter::{ActionKind, Notice, PlaybackErrorKind, Presenter};
pub use resume::{JsonFileResumeStore, MemoryResumeStore, ResumeRecord, ResumeStore};
pub use retry::RetryPolicy;
pub use session::{ActionTrigger, PlaybackController, PlaybackControllerBuilder};
pub use stream_end::{is_signal_lost, PlaylistSnapshot, StreamEndDetector};
pub use types::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Log the library version once at host start-up
pub fn init() {
    tracing::info!(version = VERSION, "Vigil Core initialized");
}
