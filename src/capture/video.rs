//! Rate-limited camera frame encoder.

use crate::capture::encoder::{EncodedChunk, StreamEncoder};
use crate::defaults;
use crate::error::Result;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use crossbeam_channel::Sender;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Abstraction over time sources for testability.
pub trait Clock: Send + Sync {
    /// Returns the current instant.
    fn now(&self) -> Instant;
}

/// Real system clock using `std::time::Instant::now()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Controllable clock for deterministic tests.
#[derive(Clone)]
pub struct MockClock {
    current: Arc<std::sync::Mutex<Instant>>,
}

impl MockClock {
    /// Creates a new mock clock starting at the current instant.
    pub fn new() -> Self {
        Self {
            current: Arc::new(std::sync::Mutex::new(Instant::now())),
        }
    }

    /// Advances the mock clock by the given duration.
    pub fn advance(&self, duration: Duration) {
        if let Ok(mut current) = self.current.lock() {
            *current += duration;
        }
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        self.current.lock().map(|i| *i).unwrap_or_else(|_| Instant::now())
    }
}

/// Rate-limits host-encoded JPEG camera frames to one per interval and
/// base64-encodes them as `image/jpeg` chunks.
///
/// Camera frames are large; the interval keeps visual context flowing without
/// starving the audio stream.
pub struct JpegFrameEncoder {
    chunk_tx: Sender<EncodedChunk>,
    interval: Duration,
    clock: Arc<dyn Clock>,
    last_sent: Option<Instant>,
    capturing: bool,
}

impl JpegFrameEncoder {
    /// Creates an encoder emitting at most one frame per `frame_interval_ms`.
    pub fn new(frame_interval_ms: u32, chunk_tx: Sender<EncodedChunk>) -> Self {
        Self::with_clock(frame_interval_ms, chunk_tx, Arc::new(SystemClock))
    }

    /// Creates an encoder with a custom clock (for deterministic testing).
    pub fn with_clock(
        frame_interval_ms: u32,
        chunk_tx: Sender<EncodedChunk>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            chunk_tx,
            interval: Duration::from_millis(frame_interval_ms as u64),
            clock,
            last_sent: None,
            capturing: false,
        }
    }

    /// Feed one JPEG-encoded camera frame. Frames arriving faster than the
    /// interval, or while stopped, are dropped.
    pub fn push_frame(&mut self, jpeg: &[u8]) {
        if !self.capturing || jpeg.is_empty() {
            return;
        }
        let now = self.clock.now();
        if let Some(last) = self.last_sent
            && now.duration_since(last) < self.interval
        {
            return;
        }
        self.last_sent = Some(now);

        let chunk = EncodedChunk {
            mime_type: defaults::VIDEO_MIME_TYPE,
            data: BASE64.encode(jpeg),
        };
        let _ = self.chunk_tx.send(chunk);
    }
}

impl StreamEncoder for JpegFrameEncoder {
    fn start(&mut self) -> Result<()> {
        self.capturing = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.capturing = false;
        self.last_sent = None;
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing
    }

    fn mime_type(&self) -> &'static str {
        defaults::VIDEO_MIME_TYPE
    }
}
