//! Integration tests for Vigil Core

use vigil_core::{
    config::{HealthConfig, RetryConfig},
    extract_tracks,
    health::classify,
    is_signal_lost,
    mkv::{TrackKind, HEADER_PROBE_BYTES},
    Error, HealthAction, PlaybackErrorKind, PlaybackState, PlaylistSnapshot, RetryPolicy,
    StreamEndDetector, SupervisorConfig,
};

// =============================================================================
// MKV Tests
// =============================================================================

fn ebml_size(len: usize) -> Vec<u8> {
    assert!(len < 0x3FFF);
    if len < 0x7F {
        vec![0x80 | len as u8]
    } else {
        vec![0x40 | (len >> 8) as u8, (len & 0xFF) as u8]
    }
}

fn ebml_element(id: &[u8], payload: &[u8]) -> Vec<u8> {
    let mut out = id.to_vec();
    out.extend(ebml_size(payload.len()));
    out.extend_from_slice(payload);
    out
}

fn track_entry(number: u8, track_type: u8, codec: &str, language: &str) -> Vec<u8> {
    let mut body = ebml_element(&[0xD7], &[number]);
    body.extend(ebml_element(&[0x83], &[track_type]));
    body.extend(ebml_element(&[0x86], codec.as_bytes()));
    body.extend(ebml_element(&[0x22, 0xB5, 0x9C], language.as_bytes()));
    ebml_element(&[0xAE], &body)
}

fn matroska_header(entries: &[Vec<u8>]) -> Vec<u8> {
    let mut out = ebml_element(&[0x1A, 0x45, 0xDF, 0xA3], &ebml_element(&[0x42, 0x82], b"matroska"));
    out.extend_from_slice(&[0x18, 0x53, 0x80, 0x67, 0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]);
    out.extend(ebml_element(&[0x16, 0x54, 0xAE, 0x6B], &entries.concat()));
    out.resize(HEADER_PROBE_BYTES, 0);
    out
}

#[test]
fn test_mkv_audio_and_subtitle_tracks() {
    let data = matroska_header(&[
        track_entry(1, 2, "A_AAC", "eng"),
        track_entry(2, 17, "S_TEXT/UTF8", "spa"),
    ]);

    let tracks = extract_tracks(&data);
    assert_eq!(tracks.audio.len(), 1);
    assert_eq!(tracks.subtitles.len(), 1);

    let audio = &tracks.audio[0];
    assert_eq!(audio.kind, TrackKind::Audio);
    assert_eq!(audio.language, "eng");
    assert_eq!(audio.codec_id, "A_AAC");
    assert_eq!(audio.index, 0);

    let subtitle = &tracks.subtitles[0];
    assert_eq!(subtitle.kind, TrackKind::Subtitle);
    assert_eq!(subtitle.language, "spa");
    assert_eq!(subtitle.codec_id, "S_TEXT/UTF8");
}

#[test]
fn test_mkv_garbage_is_empty() {
    assert!(extract_tracks(&[]).is_empty());
    assert!(extract_tracks(&vec![0xAB; 4096]).is_empty());

    // Tracks header present but truncated mid-entry
    let mut data = matroska_header(&[track_entry(1, 2, "A_OPUS", "fra")]);
    let cut = data.windows(4).position(|w| w == [0x16, 0x54, 0xAE, 0x6B]).unwrap() + 8;
    data.truncate(cut);
    let _ = extract_tracks(&data);
}

// =============================================================================
// Stream-End Tests
// =============================================================================

#[test]
fn test_signal_lost_playlist_from_text() {
    let text = "#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:10\n#EXT-X-MEDIA-SEQUENCE:0\n\
                #EXTINF:10.0,\nblack.ts\n#EXT-X-ENDLIST\n";
    let playlist = PlaylistSnapshot::parse(Some("https://cdn.example.com/live/ch1.m3u8"), text).unwrap();

    assert!(playlist.end_list);
    assert_eq!(playlist.segment_urls, vec!["https://cdn.example.com/live/black.ts"]);
    assert!(is_signal_lost(&playlist));

    let mut detector = StreamEndDetector::new();
    assert!(detector.observe(&playlist));
    assert!(!detector.observe(&playlist));
    assert!(detector.is_latched());
}

#[test]
fn test_live_playlist_is_not_signal_loss() {
    let text = "#EXTM3U\n#EXT-X-TARGETDURATION:6\n#EXT-X-MEDIA-SEQUENCE:100\n\
                #EXTINF:6.0,\nseg100.ts\n#EXTINF:6.0,\nseg101.ts\n#EXTINF:6.0,\nseg102.ts\n";
    let playlist = PlaylistSnapshot::parse(Some("https://cdn.example.com/live/ch1.m3u8"), text).unwrap();

    assert!(!playlist.end_list);
    assert!(!is_signal_lost(&playlist));
}

// =============================================================================
// Retry Tests
// =============================================================================

#[test]
fn test_retry_delays_stay_in_jitter_band() {
    let mut policy = RetryPolicy::default();
    for (attempt, base) in [1000u64, 2000, 4000, 8000, 16000].into_iter().enumerate() {
        let delay = policy.next_delay_ms().expect("budget left");
        assert!(
            delay >= base * 7 / 8 && delay <= base * 9 / 8,
            "attempt {} delay {} outside band of {}",
            attempt + 1,
            delay,
            base
        );
    }
    assert!(policy.next_delay_ms().is_none());
    assert_eq!(policy.attempts(), 5);
}

#[test]
fn test_retry_delay_capped() {
    let policy = RetryPolicy::new(RetryConfig {
        max_attempts: 10,
        ..RetryConfig::default()
    });
    assert_eq!(policy.base_delay_ms(9), 16_000);
}

// =============================================================================
// Health Tests
// =============================================================================

#[test]
fn test_health_ladder() {
    let config = HealthConfig::default();
    assert_eq!(classify(2, 0, &config), HealthAction::Healthy);
    assert_eq!(classify(3, 0, &config), HealthAction::Recover);
    assert_eq!(classify(5, 1, &config), HealthAction::BackgroundReload);
    assert_eq!(classify(8, 2, &config), HealthAction::Severe);
}

// =============================================================================
// Config and Types Tests
// =============================================================================

#[test]
fn test_config_partial_json() {
    let config = SupervisorConfig::from_json(r#"{ "retry": { "max_attempts": 3 } }"#).unwrap();
    assert_eq!(config.retry.max_attempts, 3);
    assert_eq!(config.retry.base_delay_ms, 1000);
    assert_eq!(config.health.sample_interval_ms, 5000);
    assert_eq!(config.fragments.capacity, 8);
}

#[test]
fn test_config_rejects_unordered_ladder() {
    let json = r#"{ "health": { "recover_threshold": 9 } }"#;
    assert!(SupervisorConfig::from_json(json).is_err());
}

#[test]
fn test_playback_state_transitions() {
    assert!(PlaybackState::Idle.can_transition_to(PlaybackState::Loading));
    assert!(PlaybackState::Loading.can_transition_to(PlaybackState::Playing));
    assert!(PlaybackState::Playing.can_transition_to(PlaybackState::Recovering));
    assert!(PlaybackState::Recovering.can_transition_to(PlaybackState::Playing));
    assert!(PlaybackState::FailedToStart.can_transition_to(PlaybackState::Loading));

    assert!(!PlaybackState::Idle.can_transition_to(PlaybackState::Playing));
    assert!(!PlaybackState::Ended.can_transition_to(PlaybackState::Loading));
}

#[test]
fn test_error_kind_codes() {
    let codes: Vec<&str> = [
        PlaybackErrorKind::StreamFailedToStart,
        PlaybackErrorKind::NoSignal,
        PlaybackErrorKind::AutoplayFailed,
        PlaybackErrorKind::BufferingIssues,
    ]
    .iter()
    .map(|k| k.code())
    .collect();
    assert_eq!(codes, vec!["STREAM_FAILED_TO_START", "NO_SIGNAL", "AUTOPLAY_FAILED", "BUFFERING_ISSUES"]);
}

#[test]
fn test_engine_errors_are_recoverable() {
    assert!(Error::engine("decoder reset").is_recoverable());
    assert!(Error::Io(std::io::Error::other("socket closed")).is_recoverable());

    assert!(!Error::EngineUnavailable.is_recoverable());
    assert!(!Error::InvalidConfig("bad".into()).is_recoverable());
    assert!(!Error::StaleSession { session: 3 }.is_recoverable());
    assert_eq!(Error::StaleSession { session: 3 }.error_code(), "STALE_SESSION");
}
