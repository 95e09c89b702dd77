//! Default configuration constants for lenslive.
//!
//! This module provides shared constants used across different configuration types
//! to ensure consistency and eliminate duplication.

/// Microphone capture sample rate in Hz.
///
/// 16kHz is what the backend expects for `audio/pcm` realtime input and is
/// the standard rate for speech recognition workloads.
pub const INPUT_SAMPLE_RATE: u32 = 16000;

/// Assistant audio playback sample rate in Hz.
///
/// The backend synthesizes speech at 24kHz; the host audio output is
/// initialized to match before the session opens.
pub const OUTPUT_SAMPLE_RATE: u32 = 24000;

/// Default realtime model identifier sent in the session setup message.
pub const DEFAULT_MODEL: &str = "models/gemini-2.0-flash-live-preview-04-09";

/// Default sampling temperature for the generation config.
pub const DEFAULT_TEMPERATURE: f32 = 1.0;

/// Token count at which the backend starts compressing the context window.
///
/// Must stay above [`COMPRESSION_TARGET_TOKENS`]; validated at config load.
pub const COMPRESSION_TRIGGER_TOKENS: u32 = 20000;

/// Sliding-window token count the backend compresses down to.
pub const COMPRESSION_TARGET_TOKENS: u32 = 16000;

/// MIME type tag for outbound microphone chunks.
pub const AUDIO_MIME_TYPE: &str = "audio/pcm";

/// MIME type tag for outbound camera frames.
pub const VIDEO_MIME_TYPE: &str = "image/jpeg";

/// Duration of audio buffered into one outbound chunk, in milliseconds.
///
/// 100ms keeps transcription latency low without flooding the socket with
/// tiny frames.
pub const AUDIO_CHUNK_MS: u32 = 100;

/// Minimum interval between outbound camera frames, in milliseconds.
///
/// Camera frames are large; one every 1.5s is enough visual context for the
/// assistant without starving the audio stream.
pub const VIDEO_FRAME_INTERVAL_MS: u32 = 1500;

/// Default setup handshake timeout in milliseconds. Zero disables the timeout.
///
/// The backend normally acknowledges setup within a second; a session stuck
/// waiting for the ack is unusable and should be surfaced, not waited on
/// forever.
pub const SETUP_TIMEOUT_MS: u64 = 10_000;

/// Default per-stage generation stall timeout in milliseconds. Zero disables.
///
/// Refined meshes can take minutes; anything past this is treated as a stalled
/// request and the admission slot is released.
pub const STAGE_TIMEOUT_MS: u64 = 120_000;

/// Silence duration after which a one-shot voice query terminates, in
/// milliseconds.
pub const QUERY_SILENCE_TERMINATION_MS: u32 = 1500;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compression_trigger_exceeds_target() {
        assert!(COMPRESSION_TRIGGER_TOKENS > COMPRESSION_TARGET_TOKENS);
    }

    #[test]
    fn sample_rates_match_backend_contract() {
        assert_eq!(INPUT_SAMPLE_RATE, 16000);
        assert_eq!(OUTPUT_SAMPLE_RATE, 24000);
    }
}
