//! Assistant session state machine and its driver loop.
//!
//! [`AssistantSession`] owns the transport, the capture encoders, and the
//! host audio output, and advances through
//! `Idle → Connecting → AwaitingSetupAck → Streaming → Closed` with an
//! absorbing `Errored` state. It is a plain synchronous object;
//! [`SessionDriver`] runs it on a dedicated thread, feeding transport events,
//! encoder chunks, and control commands through it one at a time — no two
//! inbound messages are ever processed concurrently, and processing order is
//! arrival order.

use crate::capture::encoder::{EncodedChunk, StreamEncoder};
use crate::config::Config;
use crate::defaults;
use crate::error::{LensliveError, Result};
use crate::event::EventHub;
use crate::protocol::{
    ClientMessage, ContextWindowCompression, GenerationSettings, RealtimeInput, ServerEvent,
    ServerMessage, SessionSetup, SlidingWindow, SystemInstruction, ToolDeclaration, ToolResponse,
    TranscriptionSettings,
};
use crate::session::transport::{AudioOutput, SessionTransport, TransportEvent};
use crossbeam_channel::{Receiver, Sender, never, select, unbounded};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Session lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    AwaitingSetupAck,
    Streaming,
    Closed,
    Errored,
}

impl SessionState {
    /// Closed and Errored accept no further transitions besides Close.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Errored)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "Idle",
            SessionState::Connecting => "Connecting",
            SessionState::AwaitingSetupAck => "AwaitingSetupAck",
            SessionState::Streaming => "Streaming",
            SessionState::Closed => "Closed",
            SessionState::Errored => "Errored",
        };
        write!(f, "{}", name)
    }
}

/// Normalized events the session exposes to consumers.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The user's transcribed speech.
    UserSpeech { text: String, completed: bool },
    /// A backend-issued function invocation.
    ToolCall {
        name: String,
        args: serde_json::Value,
        call_id: Option<String>,
    },
    /// Lifecycle transition, with display-ready detail text.
    StateChanged { state: SessionState, detail: String },
}

/// Parameters for one session, assembled from [`Config`] plus tool
/// declarations registered by the application.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub model: String,
    pub instructions: String,
    pub temperature: f32,
    pub response_modalities: Vec<String>,
    pub video_input: bool,
    pub audio_output: bool,
    pub compression_trigger_tokens: u32,
    pub compression_target_tokens: u32,
    pub setup_timeout_ms: u64,
    pub tools: Vec<ToolDeclaration>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            model: defaults::DEFAULT_MODEL.to_string(),
            instructions: String::new(),
            temperature: defaults::DEFAULT_TEMPERATURE,
            response_modalities: Vec::new(),
            video_input: false,
            audio_output: false,
            compression_trigger_tokens: defaults::COMPRESSION_TRIGGER_TOKENS,
            compression_target_tokens: defaults::COMPRESSION_TARGET_TOKENS,
            setup_timeout_ms: defaults::SETUP_TIMEOUT_MS,
            tools: Vec::new(),
        }
    }
}

impl SessionOptions {
    /// Builds options from the assistant section of the configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            model: config.assistant.model.clone(),
            instructions: config.assistant.instructions.clone(),
            temperature: config.assistant.temperature,
            response_modalities: config.assistant.response_modalities.clone(),
            video_input: config.assistant.video_input,
            audio_output: config.assistant.audio_output,
            compression_trigger_tokens: config.assistant.compression_trigger_tokens,
            compression_target_tokens: config.assistant.compression_target_tokens,
            setup_timeout_ms: config.assistant.setup_timeout_ms,
            tools: Vec::new(),
        }
    }

    /// Registers a tool the backend may call.
    pub fn with_tool(mut self, tool: ToolDeclaration) -> Self {
        self.tools.push(tool);
        self
    }
}

/// The session state machine.
///
/// All methods run on the caller's thread; the driver serializes access.
pub struct AssistantSession {
    options: SessionOptions,
    transport: Box<dyn SessionTransport>,
    audio_output: Box<dyn AudioOutput>,
    audio_encoder: Box<dyn StreamEncoder>,
    video_encoder: Option<Box<dyn StreamEncoder>>,
    state: SessionState,
    events: Arc<EventHub<SessionEvent>>,
}

impl AssistantSession {
    pub fn new(
        options: SessionOptions,
        transport: Box<dyn SessionTransport>,
        audio_output: Box<dyn AudioOutput>,
        audio_encoder: Box<dyn StreamEncoder>,
        video_encoder: Option<Box<dyn StreamEncoder>>,
    ) -> Self {
        Self {
            options,
            transport,
            audio_output,
            audio_encoder,
            video_encoder,
            state: SessionState::Idle,
            events: Arc::new(EventHub::new()),
        }
    }

    /// Subscribe to the session's outbound events.
    pub fn subscribe(&self) -> Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Setup handshake timeout, if one is configured.
    pub fn setup_timeout(&self) -> Option<Duration> {
        (self.options.setup_timeout_ms > 0)
            .then(|| Duration::from_millis(self.options.setup_timeout_ms))
    }

    /// Begin connecting. Valid from `Idle` only; a duplicate start is
    /// rejected rather than opening a second transport.
    pub fn start(&mut self) -> Result<()> {
        if self.state != SessionState::Idle {
            return Err(LensliveError::SessionAlreadyStarted {
                state: self.state.to_string(),
            });
        }

        self.audio_output
            .initialize(defaults::OUTPUT_SAMPLE_RATE)
            .map_err(|e| {
                self.transition(SessionState::Errored, e.to_string());
                e
            })?;

        self.transition(
            SessionState::Connecting,
            "Connecting to assistant backend".to_string(),
        );

        if let Err(e) = self.transport.open() {
            self.transition(SessionState::Errored, e.to_string());
            return Err(e);
        }
        Ok(())
    }

    /// Process one transport event. Called by the driver in arrival order.
    pub fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Open => {
                if self.state != SessionState::Connecting {
                    return;
                }
                match self.send_setup() {
                    Ok(()) => self.transition(
                        SessionState::AwaitingSetupAck,
                        "Connection open, awaiting setup acknowledgement".to_string(),
                    ),
                    Err(e) => self.transition(SessionState::Errored, e.to_string()),
                }
            }
            TransportEvent::Message(payload) => self.dispatch(&payload),
            TransportEvent::Error(message) => {
                if !self.state.is_terminal() {
                    self.transition(
                        SessionState::Errored,
                        LensliveError::Transport { message }.to_string(),
                    );
                }
            }
            TransportEvent::Close(reason) => {
                if self.state != SessionState::Closed {
                    self.transition(
                        SessionState::Closed,
                        format!("Connection closed: {}", reason),
                    );
                }
            }
        }
    }

    /// Forward one encoded capture chunk. Chunks are dropped until the
    /// session reaches `Streaming`; nothing leaves before the setup ack.
    pub fn handle_chunk(&mut self, chunk: EncodedChunk) -> Result<()> {
        if self.state != SessionState::Streaming {
            return Ok(());
        }
        let envelope =
            ClientMessage::RealtimeInput(RealtimeInput::from_chunk(chunk.mime_type, chunk.data));
        self.transport.send(&envelope)
    }

    /// Toggle capture devices. Idempotent, and safe to call in any state —
    /// encoders simply produce nothing until started, and chunks produced
    /// before `Streaming` never leave the session.
    pub fn set_streaming(&mut self, enabled: bool) -> Result<()> {
        if enabled {
            self.audio_encoder.start()?;
            if self.options.video_input
                && let Some(video) = self.video_encoder.as_mut()
            {
                video.start()?;
            }
        } else {
            self.audio_encoder.stop()?;
            if let Some(video) = self.video_encoder.as_mut() {
                video.stop()?;
            }
        }
        Ok(())
    }

    /// Send a tool-response envelope for a completed function call.
    ///
    /// The session does not gate this on its own state; outside `Streaming`
    /// the transport is the layer that fails (or drops) the send.
    pub fn send_tool_response(&mut self, name: &str, content: &str) -> Result<()> {
        let message = ClientMessage::ToolResponse(ToolResponse::single(name, content));
        self.transport.send(&message)
    }

    /// Best-effort interruption of in-progress assistant playback. No-op
    /// when audio output is disabled.
    pub fn interrupt_output(&mut self) {
        if self.options.audio_output {
            self.audio_output.interrupt();
        }
    }

    /// Mark the setup handshake as timed out. Driven by the driver's clock.
    pub(crate) fn fail_setup(&mut self, waited_ms: u64) {
        if self.state == SessionState::AwaitingSetupAck {
            self.transition(
                SessionState::Errored,
                LensliveError::SetupTimeout { waited_ms }.to_string(),
            );
        }
    }

    /// Stop capture and tear the transport down.
    pub(crate) fn shutdown(&mut self) {
        if let Err(e) = self.set_streaming(false) {
            eprintln!("lenslive: failed to stop capture on shutdown: {e}");
        }
        self.transport.close();
    }

    fn transition(&mut self, state: SessionState, detail: String) {
        self.state = state;
        self.events.emit(SessionEvent::StateChanged { state, detail });
    }

    fn send_setup(&mut self) -> Result<()> {
        let setup = SessionSetup {
            model: self.options.model.clone(),
            generation_config: GenerationSettings {
                response_modalities: self.options.response_modalities.clone(),
                temperature: self.options.temperature,
            },
            system_instruction: SystemInstruction::from_text(&self.options.instructions),
            tools: self.options.tools.clone(),
            context_window_compression: ContextWindowCompression {
                trigger_tokens: self.options.compression_trigger_tokens,
                sliding_window: SlidingWindow {
                    target_tokens: self.options.compression_target_tokens,
                },
            },
            input_audio_transcription: TranscriptionSettings::default(),
            output_audio_transcription: TranscriptionSettings::default(),
        };
        self.transport.send(&ClientMessage::Setup(setup))
    }

    /// Dispatch one inbound payload: decode once, then process every matching
    /// branch independently, in the fixed order setup-complete →
    /// transcription → tool calls. Applies while `Streaming` and to
    /// late-arriving messages in `AwaitingSetupAck`.
    fn dispatch(&mut self, payload: &str) {
        if !matches!(
            self.state,
            SessionState::AwaitingSetupAck | SessionState::Streaming
        ) {
            return;
        }

        let message = match ServerMessage::decode(payload) {
            Ok(message) => message,
            Err(e) => {
                eprintln!("lenslive: undecodable server message: {e}");
                return;
            }
        };

        for event in message.events() {
            match event {
                ServerEvent::SetupComplete => {
                    if self.state == SessionState::AwaitingSetupAck {
                        self.transition(
                            SessionState::Streaming,
                            "Session established".to_string(),
                        );
                    }
                }
                ServerEvent::InputTranscription { text } => {
                    self.events.emit(SessionEvent::UserSpeech {
                        text,
                        completed: true,
                    });
                }
                ServerEvent::ToolCalls(calls) => {
                    for call in calls {
                        self.events.emit(SessionEvent::ToolCall {
                            name: call.name,
                            args: call.args,
                            call_id: call.id,
                        });
                    }
                }
            }
        }
    }
}

/// Control commands accepted by the driver loop.
enum SessionControl {
    SetStreaming(bool),
    SendToolResponse { name: String, content: String },
    InterruptOutput,
    Shutdown,
}

/// Cloneable control surface over a driven session.
#[derive(Clone)]
pub struct SessionController {
    control_tx: Sender<SessionControl>,
    state: Arc<Mutex<SessionState>>,
}

impl SessionController {
    /// Last state observed by the driver loop.
    pub fn state(&self) -> SessionState {
        self.state.lock().map(|s| *s).unwrap_or(SessionState::Errored)
    }

    /// Toggle capture streaming. Fire-and-forget; failures are reported to
    /// stderr by the driver.
    pub fn set_streaming(&self, enabled: bool) {
        let _ = self.control_tx.send(SessionControl::SetStreaming(enabled));
    }

    /// Queue a tool-response send.
    pub fn send_tool_response(&self, name: &str, content: &str) {
        let _ = self.control_tx.send(SessionControl::SendToolResponse {
            name: name.to_string(),
            content: content.to_string(),
        });
    }

    /// Request interruption of assistant playback.
    pub fn interrupt_output(&self) {
        let _ = self.control_tx.send(SessionControl::InterruptOutput);
    }
}

/// Handle to a running session driver.
pub struct SessionHandle {
    controller: SessionController,
    thread: Option<JoinHandle<()>>,
}

impl SessionHandle {
    pub fn controller(&self) -> SessionController {
        self.controller.clone()
    }

    pub fn state(&self) -> SessionState {
        self.controller.state()
    }

    pub fn set_streaming(&self, enabled: bool) {
        self.controller.set_streaming(enabled);
    }

    pub fn send_tool_response(&self, name: &str, content: &str) {
        self.controller.send_tool_response(name, content);
    }

    pub fn interrupt_output(&self) {
        self.controller.interrupt_output();
    }

    /// Stops the driver loop and joins its thread.
    pub fn stop(mut self) {
        let _ = self.controller.control_tx.send(SessionControl::Shutdown);
        if let Some(handle) = self.thread.take()
            && handle.join().is_err()
        {
            eprintln!("lenslive: session driver thread panicked");
        }
    }
}

/// Runs an [`AssistantSession`] on a dedicated thread.
pub struct SessionDriver;

impl SessionDriver {
    /// Starts the session and spawns the driver loop.
    ///
    /// # Arguments
    /// * `session` - The session to drive; `start()` is called before the
    ///   thread spawns so connection errors surface synchronously
    /// * `transport_rx` - Transport events, in arrival order
    /// * `chunk_rx` - Encoded capture chunks
    pub fn spawn(
        mut session: AssistantSession,
        transport_rx: Receiver<TransportEvent>,
        chunk_rx: Receiver<EncodedChunk>,
    ) -> Result<SessionHandle> {
        session.start()?;

        let (control_tx, control_rx) = unbounded();
        let state = Arc::new(Mutex::new(session.state()));
        let shared_state = Arc::clone(&state);

        let thread = thread::spawn(move || {
            Self::run(session, transport_rx, chunk_rx, control_rx, shared_state);
        });

        Ok(SessionHandle {
            controller: SessionController { control_tx, state },
            thread: Some(thread),
        })
    }

    fn run(
        mut session: AssistantSession,
        mut transport_rx: Receiver<TransportEvent>,
        mut chunk_rx: Receiver<EncodedChunk>,
        control_rx: Receiver<SessionControl>,
        shared_state: Arc<Mutex<SessionState>>,
    ) {
        let setup_timeout = session.setup_timeout();
        let mut setup_deadline: Option<Instant> = None;

        loop {
            let mut transport_gone = false;
            let mut chunks_gone = false;

            select! {
                recv(transport_rx) -> event => match event {
                    Ok(event) => session.handle_transport_event(event),
                    // Transport dropped; keep serving control commands.
                    Err(_) => transport_gone = true,
                },
                recv(chunk_rx) -> chunk => match chunk {
                    Ok(chunk) => {
                        if let Err(e) = session.handle_chunk(chunk) {
                            eprintln!("lenslive: failed to forward media chunk: {e}");
                        }
                    }
                    Err(_) => chunks_gone = true,
                },
                recv(control_rx) -> command => match command {
                    Ok(SessionControl::SetStreaming(enabled)) => {
                        if let Err(e) = session.set_streaming(enabled) {
                            eprintln!("lenslive: failed to toggle streaming: {e}");
                        }
                    }
                    Ok(SessionControl::SendToolResponse { name, content }) => {
                        if let Err(e) = session.send_tool_response(&name, &content) {
                            eprintln!("lenslive: failed to send tool response: {e}");
                        }
                    }
                    Ok(SessionControl::InterruptOutput) => session.interrupt_output(),
                    Ok(SessionControl::Shutdown) | Err(_) => break,
                },
                default(Duration::from_millis(50)) => {}
            }

            // Disconnected producers are swapped for never-ready channels so
            // the loop keeps serving the remaining ones without spinning.
            if transport_gone {
                transport_rx = never();
            }
            if chunks_gone {
                chunk_rx = never();
            }

            if session.state() == SessionState::AwaitingSetupAck {
                if let Some(timeout) = setup_timeout {
                    let deadline = *setup_deadline.get_or_insert_with(|| Instant::now() + timeout);
                    if Instant::now() >= deadline {
                        session.fail_setup(timeout.as_millis() as u64);
                    }
                }
            } else {
                setup_deadline = None;
            }

            if let Ok(mut state) = shared_state.lock() {
                *state = session.state();
            }
        }

        session.shutdown();
        if let Ok(mut state) = shared_state.lock() {
            *state = session.state();
        }
    }
}
