//! Stream-End Detector
//!
//! The origin signals "no signal" out of band: it serves a playlist whose
//! segments all point at a placeholder file named [`SIGNAL_LOST_SENTINEL`],
//! usually with an end-of-list marker. The detector recognises that pattern
//! and latches once per session.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

/// Placeholder segment name served by the origin when a channel goes dark.
/// Matched case-sensitively as a substring of segment and manifest URLs.
pub const SIGNAL_LOST_SENTINEL: &str = "black.ts";

/// End-of-list tag of an HLS media playlist
pub const END_LIST_MARKER: &str = "#EXT-X-ENDLIST";

/// Maximum segment count for the majority rule
const SHORT_PLAYLIST_MAX_SEGMENTS: usize = 5;

/// Playlist data as delivered by engine events
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaylistSnapshot {
    /// Manifest URL, when known
    pub url: Option<String>,
    /// Playlist carries the end-of-list marker (non-live)
    pub end_list: bool,
    /// Segment URLs in playlist order
    pub segment_urls: Vec<String>,
    /// Raw playlist text, when the engine exposes it
    pub raw: Option<String>,
}

impl PlaylistSnapshot {
    /// Build a snapshot from raw media playlist text
    pub fn parse(url: Option<&str>, text: &str) -> Result<Self> {
        let parsed = m3u8_rs::parse_media_playlist_res(text.as_bytes())
            .map_err(|e| Error::PlaylistParse(format!("Failed to parse media playlist: {:?}", e)))?;

        let base = url.and_then(|u| Url::parse(u).ok());
        let segment_urls = parsed
            .segments
            .iter()
            .map(|seg| resolve_uri(base.as_ref(), &seg.uri))
            .collect();

        Ok(Self {
            url: url.map(str::to_owned),
            end_list: parsed.end_list,
            segment_urls,
            raw: Some(text.to_owned()),
        })
    }

    /// Number of segments pointing at the sentinel
    pub fn sentinel_segments(&self) -> usize {
        self.segment_urls
            .iter()
            .filter(|u| u.contains(SIGNAL_LOST_SENTINEL))
            .count()
    }
}

fn resolve_uri(base: Option<&Url>, relative: &str) -> String {
    base.and_then(|b| b.join(relative).ok())
        .map(|u| u.to_string())
        .unwrap_or_else(|| relative.to_owned())
}

/// Evaluate the signal-loss rules; first match wins
pub fn is_signal_lost(playlist: &PlaylistSnapshot) -> bool {
    let total = playlist.segment_urls.len();
    let sentinel = playlist.sentinel_segments();

    if playlist.end_list && total > 0 {
        // Every segment is the placeholder
        if sentinel == total {
            return true;
        }
        // Short closing playlist dominated by the placeholder
        if total <= SHORT_PLAYLIST_MAX_SEGMENTS && sentinel * 2 >= total {
            return true;
        }
    }

    if playlist
        .url
        .as_deref()
        .is_some_and(|u| u.contains(SIGNAL_LOST_SENTINEL))
    {
        return true;
    }

    playlist
        .raw
        .as_deref()
        .is_some_and(|raw| raw.contains(END_LIST_MARKER) && raw.contains(SIGNAL_LOST_SENTINEL))
}

/// Per-session latch over [`is_signal_lost`]
#[derive(Debug, Clone, Default)]
pub struct StreamEndDetector {
    latched: bool,
}

impl StreamEndDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// True exactly once: the first time a playlist means the stream ended
    pub fn observe(&mut self, playlist: &PlaylistSnapshot) -> bool {
        if self.latched {
            return false;
        }
        if is_signal_lost(playlist) {
            info!(
                segments = playlist.segment_urls.len(),
                sentinel = playlist.sentinel_segments(),
                end_list = playlist.end_list,
                "Signal-loss playlist detected"
            );
            return self.latch();
        }
        false
    }

    /// True exactly once: a fragment load failed on the placeholder
    pub fn observe_fragment_error(&mut self, url: &str) -> bool {
        if url.contains(SIGNAL_LOST_SENTINEL) {
            debug!(url, "Fragment error on signal-loss placeholder");
            return self.latch();
        }
        false
    }

    /// Set the latch; true only on the first call
    pub fn latch(&mut self) -> bool {
        !std::mem::replace(&mut self.latched, true)
    }

    pub fn is_latched(&self) -> bool {
        self.latched
    }
}
