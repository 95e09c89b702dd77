//! Fixed-cadence PCM chunk encoder for the microphone stream.

use crate::capture::encoder::{EncodedChunk, StreamEncoder};
use crate::defaults;
use crate::error::Result;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use crossbeam_channel::Sender;

/// Buffers 16-bit PCM frames and emits base64 `audio/pcm` chunks once enough
/// samples for one cadence interval have accumulated.
///
/// Frames pushed while the encoder is stopped are dropped; stopping flushes
/// any buffered remainder as a short final chunk.
pub struct PcmChunkEncoder {
    chunk_tx: Sender<EncodedChunk>,
    samples_per_chunk: usize,
    buffer: Vec<i16>,
    capturing: bool,
}

impl PcmChunkEncoder {
    /// Creates an encoder emitting one chunk per `chunk_ms` of audio at
    /// `sample_rate`.
    pub fn new(sample_rate: u32, chunk_ms: u32, chunk_tx: Sender<EncodedChunk>) -> Self {
        let samples_per_chunk = (sample_rate as usize * chunk_ms as usize) / 1000;
        Self {
            chunk_tx,
            // A zero cadence would never emit; clamp to one sample.
            samples_per_chunk: samples_per_chunk.max(1),
            buffer: Vec::new(),
            capturing: false,
        }
    }

    /// Feed one captured PCM frame. No-op while stopped.
    pub fn push_frame(&mut self, samples: &[i16]) {
        if !self.capturing || samples.is_empty() {
            return;
        }
        self.buffer.extend_from_slice(samples);

        while self.buffer.len() >= self.samples_per_chunk {
            let chunk: Vec<i16> = self.buffer.drain(..self.samples_per_chunk).collect();
            self.emit(&chunk);
        }
    }

    fn emit(&self, samples: &[i16]) {
        let chunk = EncodedChunk {
            mime_type: defaults::AUDIO_MIME_TYPE,
            data: encode_pcm(samples),
        };
        // Receiver gone means the session is shutting down; nothing to do.
        let _ = self.chunk_tx.send(chunk);
    }
}

/// Encodes PCM samples as base64 over little-endian bytes.
fn encode_pcm(samples: &[i16]) -> String {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for sample in samples {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    BASE64.encode(&bytes)
}

impl StreamEncoder for PcmChunkEncoder {
    fn start(&mut self) -> Result<()> {
        self.capturing = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if self.capturing && !self.buffer.is_empty() {
            let remainder: Vec<i16> = self.buffer.drain(..).collect();
            self.emit(&remainder);
        }
        self.capturing = false;
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing
    }

    fn mime_type(&self) -> &'static str {
        defaults::AUDIO_MIME_TYPE
    }
}
