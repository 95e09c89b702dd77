use crate::error::{LensliveError, Result};
use std::sync::{Arc, Mutex};

/// One transport-ready media chunk: base64 payload plus its MIME tag.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedChunk {
    pub mime_type: &'static str,
    pub data: String,
}

/// Trait for capture encoders feeding the realtime session.
///
/// This trait allows swapping implementations (real device encoders vs mock).
/// Start and stop are idempotent: re-issuing the current state is a no-op at
/// the device layer but always permitted.
pub trait StreamEncoder: Send {
    /// Begin producing chunks on the encoder's channel.
    fn start(&mut self) -> Result<()>;

    /// Stop producing chunks, flushing any buffered remainder.
    fn stop(&mut self) -> Result<()>;

    /// Whether the encoder is currently capturing.
    fn is_capturing(&self) -> bool;

    /// MIME type this encoder tags its chunks with.
    fn mime_type(&self) -> &'static str;
}

/// Mock encoder for testing
///
/// State lives behind shared handles so tests can observe the encoder after
/// it has been boxed into a session.
pub struct MockEncoder {
    mime_type: &'static str,
    capturing: Arc<Mutex<bool>>,
    start_count: Arc<Mutex<u32>>,
    stop_count: Arc<Mutex<u32>>,
    should_fail_start: bool,
}

impl MockEncoder {
    /// Create a new mock encoder tagged as audio.
    pub fn new() -> Self {
        Self {
            mime_type: crate::defaults::AUDIO_MIME_TYPE,
            capturing: Arc::new(Mutex::new(false)),
            start_count: Arc::new(Mutex::new(0)),
            stop_count: Arc::new(Mutex::new(0)),
            should_fail_start: false,
        }
    }

    /// Tag the mock with a specific MIME type.
    pub fn with_mime_type(mut self, mime_type: &'static str) -> Self {
        self.mime_type = mime_type;
        self
    }

    /// Configure the mock to fail on start.
    pub fn with_start_failure(mut self) -> Self {
        self.should_fail_start = true;
        self
    }

    /// Shared handle to the capturing flag.
    pub fn capturing_flag(&self) -> Arc<Mutex<bool>> {
        Arc::clone(&self.capturing)
    }

    /// Shared handle to the start-call counter.
    pub fn start_counter(&self) -> Arc<Mutex<u32>> {
        Arc::clone(&self.start_count)
    }

    /// Shared handle to the stop-call counter.
    pub fn stop_counter(&self) -> Arc<Mutex<u32>> {
        Arc::clone(&self.stop_count)
    }
}

impl Default for MockEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamEncoder for MockEncoder {
    fn start(&mut self) -> Result<()> {
        if let Ok(mut count) = self.start_count.lock() {
            *count += 1;
        }
        if self.should_fail_start {
            return Err(LensliveError::CaptureDevice {
                message: "mock encoder start failure".to_string(),
            });
        }
        if let Ok(mut capturing) = self.capturing.lock() {
            *capturing = true;
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if let Ok(mut count) = self.stop_count.lock() {
            *count += 1;
        }
        if let Ok(mut capturing) = self.capturing.lock() {
            *capturing = false;
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing.lock().map(|c| *c).unwrap_or(false)
    }

    fn mime_type(&self) -> &'static str {
        self.mime_type
    }
}
