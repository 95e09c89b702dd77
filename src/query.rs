//! One-shot voice query capture.
//!
//! Wraps a host speech recognizer into a promise-like handle: the first
//! final transcript resolves it, a recognizer error rejects it. Only one
//! query may be active; starting another cancels the active query, rejects
//! its pending handle, and returns an error to the new caller.

use crate::defaults;
use crate::error::{LensliveError, Result};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Recognition settings passed to the host recognizer.
#[derive(Debug, Clone, PartialEq)]
pub struct RecognitionOptions {
    pub high_accuracy: bool,
    pub silence_until_termination_ms: u32,
}

impl Default for RecognitionOptions {
    fn default() -> Self {
        Self {
            high_accuracy: true,
            silence_until_termination_ms: defaults::QUERY_SILENCE_TERMINATION_MS,
        }
    }
}

/// Events produced by a running recognition.
#[derive(Debug, Clone, PartialEq)]
pub enum RecognitionEvent {
    Transcript { text: String, is_final: bool },
    Error { message: String },
}

/// Trait for the host speech recognition module.
///
/// This trait allows swapping implementations (real ASR vs mock).
pub trait SpeechRecognizer: Send + Sync {
    /// Begin transcribing; events arrive on the returned channel.
    fn start(&self, options: &RecognitionOptions) -> Result<Receiver<RecognitionEvent>>;

    /// Stop the running transcription, if any.
    fn stop(&self);
}

/// Pending query slot: a result sender tagged with its query id so a worker
/// resolving late cannot touch a successor's slot.
struct ActiveQuery {
    id: u64,
    result_tx: Sender<Result<String>>,
}

/// Handle to one pending voice query.
pub struct QueryHandle {
    rx: Receiver<Result<String>>,
}

impl QueryHandle {
    /// Block until the query resolves with the final transcript.
    pub fn wait(&self) -> Result<String> {
        self.rx
            .recv()
            .map_err(|_| LensliveError::Other("query worker dropped without resolving".to_string()))?
    }

    /// Block up to `timeout`; `None` when still pending.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<String>> {
        match self.rx.recv_timeout(timeout) {
            Ok(result) => Some(result),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(Err(LensliveError::Other(
                "query worker dropped without resolving".to_string(),
            ))),
        }
    }
}

/// One-shot voice query controller.
pub struct QueryCapture {
    recognizer: Arc<dyn SpeechRecognizer>,
    options: RecognitionOptions,
    active: Arc<Mutex<Option<ActiveQuery>>>,
    next_id: Mutex<u64>,
}

impl QueryCapture {
    pub fn new(recognizer: Arc<dyn SpeechRecognizer>) -> Self {
        Self {
            recognizer,
            options: RecognitionOptions::default(),
            active: Arc::new(Mutex::new(None)),
            next_id: Mutex::new(0),
        }
    }

    /// Override the recognition settings.
    pub fn with_options(mut self, options: RecognitionOptions) -> Self {
        self.options = options;
        self
    }

    /// Whether a query is currently pending.
    pub fn is_capturing(&self) -> bool {
        self.active.lock().map(|a| a.is_some()).unwrap_or(false)
    }

    /// Start a voice query.
    ///
    /// If a query is already active it is cancelled: the recognizer is
    /// stopped, the active handle is rejected, and this call returns
    /// [`LensliveError::CaptureCancelled`] instead of starting a new query.
    pub fn capture(&self) -> Result<QueryHandle> {
        let mut active = self
            .active
            .lock()
            .map_err(|_| LensliveError::Other("query state poisoned".to_string()))?;

        if let Some(cancelled) = active.take() {
            self.recognizer.stop();
            let _ = cancelled.result_tx.send(Err(LensliveError::CaptureCancelled {
                message: "superseded by a new capture".to_string(),
            }));
            return Err(LensliveError::CaptureCancelled {
                message: "a capture was already active and has been cancelled".to_string(),
            });
        }

        let events = self.recognizer.start(&self.options)?;

        let id = {
            let mut next_id = self
                .next_id
                .lock()
                .map_err(|_| LensliveError::Other("query state poisoned".to_string()))?;
            *next_id += 1;
            *next_id
        };

        let (result_tx, result_rx) = bounded(1);
        *active = Some(ActiveQuery {
            id,
            result_tx: result_tx.clone(),
        });
        drop(active);

        let recognizer = Arc::clone(&self.recognizer);
        let slot = Arc::clone(&self.active);
        thread::spawn(move || run_query(id, recognizer, events, slot));

        Ok(QueryHandle { rx: result_rx })
    }
}

fn run_query(
    id: u64,
    recognizer: Arc<dyn SpeechRecognizer>,
    events: Receiver<RecognitionEvent>,
    slot: Arc<Mutex<Option<ActiveQuery>>>,
) {
    // Take the slot only if it still belongs to this query; a cancelled
    // query's slot may already hold a successor.
    let resolve = |result: Result<String>| {
        if let Ok(mut active) = slot.lock()
            && active.as_ref().is_some_and(|a| a.id == id)
            && let Some(query) = active.take()
        {
            let _ = query.result_tx.send(result);
        }
    };

    loop {
        match events.recv() {
            Ok(RecognitionEvent::Transcript { text, is_final }) => {
                if is_final {
                    recognizer.stop();
                    resolve(Ok(text));
                    return;
                }
                // Interim transcripts are progress, not results.
            }
            Ok(RecognitionEvent::Error { message }) => {
                resolve(Err(LensliveError::CaptureDevice { message }));
                return;
            }
            Err(_) => {
                resolve(Err(LensliveError::CaptureDevice {
                    message: "recognition ended without a final transcript".to_string(),
                }));
                return;
            }
        }
    }
}

/// Mock recognizer for testing
pub struct MockRecognizer {
    event_tx: Mutex<Option<Sender<RecognitionEvent>>>,
    stop_count: Arc<Mutex<u32>>,
    should_fail_start: bool,
    last_options: Arc<Mutex<Option<RecognitionOptions>>>,
}

impl MockRecognizer {
    pub fn new() -> Self {
        Self {
            event_tx: Mutex::new(None),
            stop_count: Arc::new(Mutex::new(0)),
            should_fail_start: false,
            last_options: Arc::new(Mutex::new(None)),
        }
    }

    /// Configure the mock to fail on start.
    pub fn with_start_failure(mut self) -> Self {
        self.should_fail_start = true;
        self
    }

    /// Sender for the active recognition's event stream.
    pub fn event_sender(&self) -> Option<Sender<RecognitionEvent>> {
        self.event_tx.lock().ok().and_then(|tx| tx.clone())
    }

    pub fn stop_count(&self) -> u32 {
        self.stop_count.lock().map(|c| *c).unwrap_or(0)
    }

    /// Options the most recent start was called with.
    pub fn last_options(&self) -> Option<RecognitionOptions> {
        self.last_options.lock().ok().and_then(|o| o.clone())
    }
}

impl Default for MockRecognizer {
    fn default() -> Self {
        Self::new()
    }
}

impl SpeechRecognizer for MockRecognizer {
    fn start(&self, options: &RecognitionOptions) -> Result<Receiver<RecognitionEvent>> {
        if self.should_fail_start {
            return Err(LensliveError::CaptureDevice {
                message: "mock recognizer start failure".to_string(),
            });
        }
        if let Ok(mut last) = self.last_options.lock() {
            *last = Some(options.clone());
        }
        let (tx, rx) = crossbeam_channel::unbounded();
        if let Ok(mut event_tx) = self.event_tx.lock() {
            *event_tx = Some(tx);
        }
        Ok(rx)
    }

    fn stop(&self) {
        if let Ok(mut count) = self.stop_count.lock() {
            *count += 1;
        }
        // Dropping the sender ends the event stream, as a real stop would.
        if let Ok(mut event_tx) = self.event_tx.lock() {
            *event_tx = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capture_with_mock() -> (QueryCapture, Arc<MockRecognizer>) {
        let recognizer = Arc::new(MockRecognizer::new());
        let capture = QueryCapture::new(Arc::clone(&recognizer) as Arc<dyn SpeechRecognizer>);
        (capture, recognizer)
    }

    #[test]
    fn test_final_transcript_resolves_handle() {
        let (capture, recognizer) = capture_with_mock();

        let handle = capture.capture().unwrap();
        let tx = recognizer.event_sender().expect("recognition started");

        tx.send(RecognitionEvent::Transcript {
            text: "a tiny crown".to_string(),
            is_final: false,
        })
        .unwrap();
        tx.send(RecognitionEvent::Transcript {
            text: "a tiny golden crown".to_string(),
            is_final: true,
        })
        .unwrap();

        assert_eq!(handle.wait().unwrap(), "a tiny golden crown");
        assert!(!capture.is_capturing());
        assert_eq!(recognizer.stop_count(), 1);
    }

    #[test]
    fn test_default_options_reach_recognizer() {
        let (capture, recognizer) = capture_with_mock();
        let _handle = capture.capture().unwrap();

        let options = recognizer.last_options().expect("options recorded");
        assert!(options.high_accuracy);
        assert_eq!(options.silence_until_termination_ms, 1500);
    }

    #[test]
    fn test_custom_options_reach_recognizer() {
        let recognizer = Arc::new(MockRecognizer::new());
        let capture = QueryCapture::new(Arc::clone(&recognizer) as Arc<dyn SpeechRecognizer>)
            .with_options(RecognitionOptions {
                high_accuracy: false,
                silence_until_termination_ms: 500,
            });

        let _handle = capture.capture().unwrap();
        let options = recognizer.last_options().expect("options recorded");
        assert!(!options.high_accuracy);
        assert_eq!(options.silence_until_termination_ms, 500);
    }

    #[test]
    fn test_recognizer_error_rejects_handle() {
        let (capture, recognizer) = capture_with_mock();

        let handle = capture.capture().unwrap();
        recognizer
            .event_sender()
            .unwrap()
            .send(RecognitionEvent::Error {
                message: "microphone lost".to_string(),
            })
            .unwrap();

        match handle.wait() {
            Err(LensliveError::CaptureDevice { message }) => {
                assert_eq!(message, "microphone lost");
            }
            other => panic!("Expected CaptureDevice error, got {:?}", other),
        }
        assert!(!capture.is_capturing());
    }

    #[test]
    fn test_reentrant_capture_cancels_active_query() {
        let (capture, recognizer) = capture_with_mock();

        let first = capture.capture().unwrap();
        assert!(capture.is_capturing());

        let second = capture.capture();
        assert!(matches!(
            second,
            Err(LensliveError::CaptureCancelled { .. })
        ));

        // The active query's handle is rejected with the cancellation
        match first.wait() {
            Err(LensliveError::CaptureCancelled { message }) => {
                assert!(message.contains("superseded"));
            }
            other => panic!("Expected CaptureCancelled, got {:?}", other),
        }
        assert_eq!(recognizer.stop_count(), 1);
        assert!(!capture.is_capturing());
    }

    #[test]
    fn test_capture_usable_again_after_cancellation() {
        let (capture, recognizer) = capture_with_mock();

        let _first = capture.capture().unwrap();
        let _ = capture.capture(); // cancels

        let third = capture.capture().unwrap();
        let tx = recognizer.event_sender().expect("third query started");
        tx.send(RecognitionEvent::Transcript {
            text: "done".to_string(),
            is_final: true,
        })
        .unwrap();

        assert_eq!(third.wait().unwrap(), "done");
    }

    #[test]
    fn test_start_failure_propagates_and_leaves_slot_free() {
        let recognizer = Arc::new(MockRecognizer::new().with_start_failure());
        let capture = QueryCapture::new(recognizer as Arc<dyn SpeechRecognizer>);

        assert!(capture.capture().is_err());
        assert!(!capture.is_capturing());
    }

    #[test]
    fn test_stream_end_without_final_rejects() {
        let (capture, recognizer) = capture_with_mock();

        let handle = capture.capture().unwrap();
        // Dropping the sender ends the stream with no final transcript
        recognizer.stop();

        match handle.wait() {
            Err(LensliveError::CaptureDevice { message }) => {
                assert!(message.contains("without a final transcript"));
            }
            other => panic!("Expected CaptureDevice error, got {:?}", other),
        }
    }
}
