//! Default configuration constants for livesub.
//!
//! This module provides shared constants used across the pipeline
//! to ensure consistency and eliminate duplication.

use std::time::Duration;

/// Capture sample rate in Hz.
///
/// The recognition service expects 16kHz mono PCM16, which is also the
/// standard rate for speech models.
pub const CAPTURE_SAMPLE_RATE: u32 = 16000;

/// Playback sample rate in Hz for synthesized speech.
pub const PLAYBACK_SAMPLE_RATE: u32 = 24000;

/// Samples per audio frame sent to the recognition service.
///
/// 1600 samples = 100ms at 16kHz. As PCM16 bytes this is the 3200-byte
/// frame the service contract expects.
pub const FRAME_SAMPLES: usize = 1600;

/// Bytes per audio frame (PCM16 encoding of [`FRAME_SAMPLES`]).
pub const FRAME_BYTES: usize = FRAME_SAMPLES * 2;

/// Maximum transcript lines kept per language track.
///
/// Oldest completed lines are evicted first; the open tail line is always
/// retained.
pub const TRANSCRIPT_CAPACITY: usize = 20;

/// Playback chunk size in bytes for streamed synthesis audio.
///
/// Bytes are written to the output device as soon as a full chunk is
/// available, bounding playback-start latency instead of waiting for the
/// whole response.
pub const PLAYBACK_CHUNK_BYTES: usize = 4096;

/// Minimum buffered characters before a clause-boundary punctuation mark
/// triggers an early synthesis flush.
pub const SYNTHESIS_FLUSH_CHARS: usize = 15;

/// Clause-boundary punctuation marks that can trigger an early flush.
pub const CLAUSE_BOUNDARIES: &[&str] = &["、", "，", "。"];

/// Pause marker appended to each synthesis request.
pub const SYNTHESIS_PAUSE_MARKER: &str = "[breath][breath][breath]";

/// Capacity of the recognition event queue consumed by the UI refresh
/// worker.
pub const EVENT_QUEUE_CAPACITY: usize = 256;

/// Capacity of the fixed-word queue feeding the synthesis worker.
///
/// Bounded so a long TTS-disabled stretch cannot grow the queue without
/// limit; when full, the newest delta is dropped with a warning.
pub const FIXED_WORD_QUEUE_CAPACITY: usize = 1024;

/// Maximum events the UI refresh worker drains per tick.
pub const UI_DRAIN_MAX_ITEMS: usize = 10;

/// UI refresh tick interval.
pub const UI_REFRESH_INTERVAL: Duration = Duration::from_millis(100);

/// Sleep while the capture device is not yet open during session startup.
pub const DEVICE_NOT_READY_RETRY: Duration = Duration::from_millis(10);

/// Backoff after a network failure before restarting the session.
pub const NETWORK_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Backoff after an audio device failure.
pub const DEVICE_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Backoff after an authentication failure. Long because the key will not
/// fix itself; the status line tells the user to update it.
pub const AUTH_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Backoff for unclassified failures before they are surfaced.
pub const UNKNOWN_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Backoff for unclassified failures once surfaced to the UI.
pub const UNKNOWN_SURFACED_DELAY: Duration = Duration::from_secs(5);

/// Consecutive unclassified failures tolerated before surfacing.
pub const UNKNOWN_RETRY_LIMIT: u32 = 3;

/// Interval between supervisor health checks.
pub const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Pause between stop() and start() when the health check restarts the
/// pipeline.
pub const RESTART_PAUSE: Duration = Duration::from_secs(1);

/// Pause between stop() and start() during reconfiguration.
pub const RECONFIGURE_PAUSE: Duration = Duration::from_millis(500);

/// Bounded wait for each worker thread to finish during stop().
pub const WORKER_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Languages accepted by set_languages, as (tag, display name) pairs.
pub const SUPPORTED_LANGUAGES: &[(&str, &str)] = &[
    ("zh-CN", "Chinese"),
    ("en-US", "English"),
    ("ja-JP", "Japanese"),
    ("ko-KR", "Korean"),
    ("fr-FR", "French"),
    ("de-DE", "German"),
    ("es-ES", "Spanish"),
    ("ru-RU", "Russian"),
    ("it-IT", "Italian"),
    ("pt-PT", "Portuguese"),
];

/// Returns true if `language` is one of the supported language tags.
pub fn is_supported_language(language: &str) -> bool {
    SUPPORTED_LANGUAGES.iter().any(|(tag, _)| *tag == language)
}

/// Short language code the services use, e.g. "zh-CN" → "zh".
pub fn service_code(language: &str) -> String {
    language
        .split('-')
        .next()
        .unwrap_or(language)
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_bytes_match_contract() {
        // 100ms at 16kHz mono PCM16
        assert_eq!(FRAME_BYTES, 3200);
        assert_eq!(FRAME_SAMPLES * 1000 / CAPTURE_SAMPLE_RATE as usize, 100);
    }

    #[test]
    fn supported_language_lookup() {
        assert!(is_supported_language("zh-CN"));
        assert!(is_supported_language("en-US"));
        assert!(!is_supported_language("en"));
        assert!(!is_supported_language("tlh"));
    }

    #[test]
    fn service_code_strips_region() {
        assert_eq!(service_code("zh-CN"), "zh");
        assert_eq!(service_code("en-US"), "en");
        assert_eq!(service_code("ja"), "ja");
    }
}
