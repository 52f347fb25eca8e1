//! MKV track-header extraction
//!
//! Reads the audio and subtitle track list from the first
//! [`HEADER_PROBE_BYTES`] of a Matroska file so the UI can offer track
//! selection before the media engine has opened the file.
//!
//! The parser is best-effort: it never panics or returns an error. Any
//! structural anomaly yields whatever was collected so far (usually nothing)
//! plus a log entry.

pub mod ebml;
mod fetch;

pub use fetch::HeaderFetcher;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Bytes of the file inspected by the extractor
pub const HEADER_PROBE_BYTES: usize = 128 * 1024;

/// Segment element ID, searched for as a literal byte pattern
pub const SEGMENT_ID: [u8; 4] = [0x18, 0x53, 0x80, 0x67];
/// Tracks element ID
pub const TRACKS_ID: [u8; 4] = [0x16, 0x54, 0xAE, 0x6B];

const TRACK_ENTRY_ID: u32 = 0xAE;
const TRACK_NUMBER_ID: u32 = 0xD7;
const TRACK_TYPE_ID: u32 = 0x83;
const CODEC_ID: u32 = 0x86;
const LANGUAGE_ID: u32 = 0x22B59C;
const NAME_ID: u32 = 0x536E;

const TRACK_TYPE_AUDIO: u64 = 2;
const TRACK_TYPE_SUBTITLE: u64 = 17;

/// Scan step used when a TrackEntry does not declare a usable length
const TRACK_ENTRY_STRIDE: usize = 100;

/// Language reported when a track carries none
pub const UNDETERMINED_LANGUAGE: &str = "und";

/// Track kinds surfaced to the UI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Subtitle,
}

impl std::fmt::Display for TrackKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackKind::Audio => write!(f, "Audio"),
            TrackKind::Subtitle => write!(f, "Subtitle"),
        }
    }
}

/// One selectable track
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MkvTrack {
    pub kind: TrackKind,
    /// ISO-639 code or `und`
    pub language: String,
    /// Matroska codec ID, e.g. `A_AAC` or `S_TEXT/UTF8`
    pub codec_id: String,
    /// Name element, or a label derived from kind and language
    pub name: String,
    /// Position among tracks of the same kind
    pub index: usize,
    /// TrackNumber element (0 when absent)
    pub track_number: u64,
}

/// Extraction result
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MkvTracks {
    pub audio: Vec<MkvTrack>,
    pub subtitles: Vec<MkvTrack>,
}

impl MkvTracks {
    pub fn is_empty(&self) -> bool {
        self.audio.is_empty() && self.subtitles.is_empty()
    }

    fn push(&mut self, entry: RawTrackEntry) {
        let kind = match entry.track_type {
            TRACK_TYPE_AUDIO => TrackKind::Audio,
            TRACK_TYPE_SUBTITLE => TrackKind::Subtitle,
            other => {
                debug!(track_type = other, number = entry.number, "Skipping track");
                return;
            }
        };
        let list = match kind {
            TrackKind::Audio => &mut self.audio,
            TrackKind::Subtitle => &mut self.subtitles,
        };

        let index = list.len();
        let language = entry
            .language
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| UNDETERMINED_LANGUAGE.to_string());
        let name = match entry.name.filter(|n| !n.is_empty()) {
            Some(name) => name,
            None if language != UNDETERMINED_LANGUAGE => format!("{} {} ({})", kind, index + 1, language),
            None => format!("{} {}", kind, index + 1),
        };

        list.push(MkvTrack {
            kind,
            language,
            codec_id: entry.codec_id.unwrap_or_default(),
            name,
            index,
            track_number: entry.number,
        });
    }
}

#[derive(Debug, Default)]
struct RawTrackEntry {
    number: u64,
    track_type: u64,
    codec_id: Option<String>,
    language: Option<String>,
    name: Option<String>,
}

/// Extract audio and subtitle tracks from a Matroska header prefix
pub fn extract_tracks(data: &[u8]) -> MkvTracks {
    let buf = &data[..data.len().min(HEADER_PROBE_BYTES)];
    let mut tracks = MkvTracks::default();

    let Some(segment) = ebml::find_pattern(buf, &SEGMENT_ID, 0) else {
        warn!(bytes = buf.len(), "MKV header: Segment element not found");
        return tracks;
    };
    let Some(tracks_at) = ebml::find_pattern(buf, &TRACKS_ID, segment + SEGMENT_ID.len()) else {
        warn!(segment, "MKV header: Tracks element not found in probe window");
        return tracks;
    };

    let size_at = tracks_at + TRACKS_ID.len();
    let Some(size) = ebml::read_vint(buf, size_at) else {
        warn!(offset = size_at, "MKV header: unreadable Tracks size");
        return tracks;
    };
    let body_start = size_at + size.len;
    let body_end = if size.unknown {
        buf.len()
    } else {
        usize::try_from(size.value)
            .ok()
            .and_then(|s| body_start.checked_add(s))
            .map_or(buf.len(), |end| end.min(buf.len()))
    };

    let mut pos = body_start;
    while pos < body_end {
        let Some(found) = buf[pos..body_end]
            .iter()
            .position(|&b| b as u32 == TRACK_ENTRY_ID)
            .map(|offset| pos + offset)
        else {
            break;
        };

        match parse_track_entry(buf, found, body_end) {
            Some((entry, next)) => {
                tracks.push(entry);
                pos = next;
            }
            None => pos = found + 1,
        }
    }

    debug!(
        audio = tracks.audio.len(),
        subtitles = tracks.subtitles.len(),
        "MKV header parsed"
    );
    tracks
}

/// Parse the TrackEntry whose ID byte sits at `at`; returns the entry and
/// the offset to resume scanning from
fn parse_track_entry(buf: &[u8], at: usize, limit: usize) -> Option<(RawTrackEntry, usize)> {
    let header = ebml::read_header(buf, at)?;
    if header.id != TRACK_ENTRY_ID {
        return None;
    }

    let declared_end = usize::try_from(header.size.value)
        .ok()
        .and_then(|s| header.data_start.checked_add(s))
        .filter(|&end| !header.size.unknown && end <= limit);
    let data_end = declared_end.unwrap_or(limit);

    let mut entry = RawTrackEntry::default();
    let mut seen_any = false;
    let mut pos = header.data_start;
    while pos < data_end {
        let Some(child) = ebml::read_header(buf, pos) else {
            break;
        };
        let child_end = usize::try_from(child.size.value)
            .ok()
            .and_then(|s| child.data_start.checked_add(s))
            .map_or(data_end, |end| end.min(data_end));
        if child.size.unknown || child_end <= pos {
            break;
        }

        match child.id {
            TRACK_NUMBER_ID => entry.number = ebml::read_uint(buf, child.data_start, child_end),
            TRACK_TYPE_ID => entry.track_type = ebml::read_uint(buf, child.data_start, child_end),
            CODEC_ID => entry.codec_id = Some(ebml::read_string(buf, child.data_start, child_end)),
            LANGUAGE_ID => entry.language = Some(ebml::read_string(buf, child.data_start, child_end)),
            NAME_ID => entry.name = Some(ebml::read_string(buf, child.data_start, child_end)),
            _ => {
                pos = child_end;
                continue;
            }
        }
        seen_any = true;
        pos = child_end;
    }

    if !seen_any {
        return None;
    }

    // Without a trustworthy length, fall back to the fixed scan step
    let next = declared_end.unwrap_or(at + TRACK_ENTRY_STRIDE);
    Some((entry, next))
}

#[cfg(test)]
pub(crate) mod test_data {
    //! Hand-assembled Matroska headers

    pub fn size(len: usize) -> Vec<u8> {
        if len < 0x7F {
            vec![0x80 | len as u8]
        } else {
            vec![0x40 | (len >> 8) as u8, (len & 0xFF) as u8]
        }
    }

    pub fn element(id: &[u8], payload: &[u8]) -> Vec<u8> {
        let mut out = id.to_vec();
        out.extend(size(payload.len()));
        out.extend_from_slice(payload);
        out
    }

    pub fn track_entry(number: u8, track_type: u8, codec: &str, language: Option<&str>, name: Option<&str>) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend(element(&[0xD7], &[number]));
        body.extend(element(&[0x83], &[track_type]));
        body.extend(element(&[0x86], codec.as_bytes()));
        if let Some(lang) = language {
            body.extend(element(&[0x22, 0xB5, 0x9C], lang.as_bytes()));
        }
        if let Some(name) = name {
            body.extend(element(&[0x53, 0x6E], name.as_bytes()));
        }
        element(&[0xAE], &body)
    }

    /// EBML header + Segment (unknown size) + SeekHead + Tracks(entries)
    pub fn matroska(entries: &[Vec<u8>]) -> Vec<u8> {
        let mut out = element(&[0x1A, 0x45, 0xDF, 0xA3], &element(&[0x42, 0x82], b"matroska"));
        out.extend_from_slice(&[0x18, 0x53, 0x80, 0x67, 0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]);
        out.extend(element(&[0x11, 0x4D, 0x9B, 0x74], &[0xEC, 0x82, 0x00, 0x00]));
        let body: Vec<u8> = entries.concat();
        out.extend(element(&[0x16, 0x54, 0xAE, 0x6B], &body));
        out
    }

    pub fn pad_to_probe(mut data: Vec<u8>) -> Vec<u8> {
        data.resize(super::HEADER_PROBE_BYTES, 0);
        data
    }
}

#[cfg(test)]
mod tests {
    use super::test_data::*;
    use super::*;

    #[test]
    fn test_extracts_audio_and_subtitles() {
        let data = pad_to_probe(matroska(&[
            track_entry(1, 1, "V_MPEG4/ISO/AVC", None, None),
            track_entry(2, 2, "A_AAC", Some("eng"), None),
            track_entry(3, 17, "S_TEXT/UTF8", Some("spa"), Some("Español")),
        ]));

        let tracks = extract_tracks(&data);
        assert_eq!(tracks.audio.len(), 1);
        assert_eq!(tracks.subtitles.len(), 1);

        let audio = &tracks.audio[0];
        assert_eq!(audio.language, "eng");
        assert_eq!(audio.codec_id, "A_AAC");
        assert_eq!(audio.track_number, 2);
        assert_eq!(audio.index, 0);
        assert_eq!(audio.name, "Audio 1 (eng)");

        let sub = &tracks.subtitles[0];
        assert_eq!(sub.language, "spa");
        assert_eq!(sub.name, "Español");
        assert_eq!(sub.kind, TrackKind::Subtitle);
    }

    #[test]
    fn test_missing_language_is_und() {
        let data = matroska(&[
            track_entry(1, 2, "A_AC3", None, None),
            track_entry(2, 2, "A_OPUS", Some("fre\0\0"), None),
        ]);
        let tracks = extract_tracks(&data);
        assert_eq!(tracks.audio[0].language, "und");
        assert_eq!(tracks.audio[0].name, "Audio 1");
        assert_eq!(tracks.audio[1].language, "fre");
        assert_eq!(tracks.audio[1].index, 1);
    }

    #[test]
    fn test_no_segment_yields_empty() {
        let tracks = extract_tracks(&[0u8; 4096]);
        assert!(tracks.is_empty());
    }

    #[test]
    fn test_segment_without_tracks_yields_empty() {
        let mut data = vec![0x18, 0x53, 0x80, 0x67, 0x81, 0x00];
        data.extend(vec![0xAE; 300]);
        assert!(extract_tracks(&data).is_empty());
    }

    #[test]
    fn test_truncated_header_never_panics() {
        let data = matroska(&[
            track_entry(1, 2, "A_AAC", Some("eng"), None),
            track_entry(2, 17, "S_TEXT/ASS", Some("ger"), None),
        ]);
        for cut in 0..data.len() {
            let _ = extract_tracks(&data[..cut]);
        }
        // Cutting into the second entry keeps the first
        let tracks = extract_tracks(&data[..data.len() - 4]);
        assert_eq!(tracks.audio.len(), 1);
    }

    #[test]
    fn test_tracks_beyond_probe_window_are_ignored() {
        let mut data = vec![0u8; HEADER_PROBE_BYTES];
        data.extend(matroska(&[track_entry(1, 2, "A_AAC", Some("eng"), None)]));
        assert!(extract_tracks(&data).is_empty());
    }
}
