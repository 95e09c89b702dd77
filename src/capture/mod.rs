//! Capture-side encoding: turning device frames into transport-ready chunks.
//!
//! The host delivers raw microphone PCM and camera JPEG frames; the encoders
//! here buffer, rate-limit, and base64-encode them into [`EncodedChunk`]s at
//! a fixed cadence. The session layer only consumes the chunk channel.

pub mod audio;
pub mod encoder;
pub mod video;

pub use audio::PcmChunkEncoder;
pub use encoder::{EncodedChunk, MockEncoder, StreamEncoder};
pub use video::{Clock, JpegFrameEncoder, MockClock, SystemClock};
