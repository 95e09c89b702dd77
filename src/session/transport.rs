//! Duplex transport abstraction and host audio-output collaborator.

use crate::error::{LensliveError, Result};
use crate::protocol::ClientMessage;
use std::sync::{Arc, Mutex};

/// Events delivered by a transport, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The connection is established; the setup handshake may begin.
    Open,
    /// One raw inbound payload.
    Message(String),
    /// The transport failed; the session will not be retried automatically.
    Error(String),
    /// The connection closed, with the peer's reason if any.
    Close(String),
}

/// Trait for the duplex message channel to the assistant backend.
///
/// This trait allows swapping implementations (real websocket vs mock).
/// Implementations deliver [`TransportEvent`]s on a channel supplied at
/// construction; delivery order matches arrival order.
pub trait SessionTransport: Send {
    /// Begin establishing the connection. Non-blocking; an `Open` event (or
    /// `Error`) follows on the event channel.
    fn open(&mut self) -> Result<()>;

    /// Send one message to the backend.
    fn send(&self, message: &ClientMessage) -> Result<()>;

    /// Tear the connection down. A `Close` event follows if one was open.
    fn close(&mut self);
}

/// Trait for the host audio playback device.
pub trait AudioOutput: Send {
    /// Prepare playback at the given sample rate.
    fn initialize(&mut self, sample_rate: u32) -> Result<()>;

    /// Best-effort request to stop any in-progress playback.
    fn interrupt(&mut self);
}

/// Audio output stub for hosts with playback disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullAudioOutput;

impl AudioOutput for NullAudioOutput {
    fn initialize(&mut self, _sample_rate: u32) -> Result<()> {
        Ok(())
    }

    fn interrupt(&mut self) {}
}

/// Mock audio output for testing
#[derive(Debug, Clone, Default)]
pub struct MockAudioOutput {
    initialized_rate: Arc<Mutex<Option<u32>>>,
    interrupt_count: Arc<Mutex<u32>>,
}

impl MockAudioOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sample rate passed to initialize, if called.
    pub fn initialized_rate(&self) -> Option<u32> {
        self.initialized_rate.lock().ok().and_then(|r| *r)
    }

    pub fn interrupt_count(&self) -> u32 {
        self.interrupt_count.lock().map(|c| *c).unwrap_or(0)
    }
}

impl AudioOutput for MockAudioOutput {
    fn initialize(&mut self, sample_rate: u32) -> Result<()> {
        if let Ok(mut rate) = self.initialized_rate.lock() {
            *rate = Some(sample_rate);
        }
        Ok(())
    }

    fn interrupt(&mut self) {
        if let Ok(mut count) = self.interrupt_count.lock() {
            *count += 1;
        }
    }
}

/// Mock transport for testing
///
/// Records every sent message behind a shared handle so tests can inspect
/// traffic after the transport has been moved into a session.
pub struct MockTransport {
    sent: Arc<Mutex<Vec<ClientMessage>>>,
    opened: Arc<Mutex<bool>>,
    closed: Arc<Mutex<bool>>,
    should_fail_open: bool,
    should_fail_send: bool,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            sent: Arc::new(Mutex::new(Vec::new())),
            opened: Arc::new(Mutex::new(false)),
            closed: Arc::new(Mutex::new(false)),
            should_fail_open: false,
            should_fail_send: false,
        }
    }

    /// Configure the mock to fail on open.
    pub fn with_open_failure(mut self) -> Self {
        self.should_fail_open = true;
        self
    }

    /// Configure the mock to fail on every send.
    pub fn with_send_failure(mut self) -> Self {
        self.should_fail_send = true;
        self
    }

    /// Shared handle to the sent-message log.
    pub fn sent_log(&self) -> Arc<Mutex<Vec<ClientMessage>>> {
        Arc::clone(&self.sent)
    }

    /// Shared handle answering whether open was called.
    pub fn opened_flag(&self) -> Arc<Mutex<bool>> {
        Arc::clone(&self.opened)
    }

    /// Shared handle answering whether close was called.
    pub fn closed_flag(&self) -> Arc<Mutex<bool>> {
        Arc::clone(&self.closed)
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionTransport for MockTransport {
    fn open(&mut self) -> Result<()> {
        if self.should_fail_open {
            return Err(LensliveError::Transport {
                message: "mock open failure".to_string(),
            });
        }
        if let Ok(mut opened) = self.opened.lock() {
            *opened = true;
        }
        Ok(())
    }

    fn send(&self, message: &ClientMessage) -> Result<()> {
        if self.should_fail_send {
            return Err(LensliveError::Transport {
                message: "mock send failure".to_string(),
            });
        }
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(message.clone());
        }
        Ok(())
    }

    fn close(&mut self) {
        if let Ok(mut closed) = self.closed.lock() {
            *closed = true;
        }
    }
}
