//! JSON message protocol for the realtime assistant session.
//!
//! Field names and casing are bit-compatible with the backend's wire format,
//! which mixes snake_case envelopes (`setup`, `realtime_input`,
//! `tool_response`) with camelCase payload fields (`setupComplete`,
//! `responseModalities`, `functionCalls`). Server messages are presence-keyed
//! rather than tagged: one payload may carry several sections at once, so
//! decoding produces an ordered list of [`ServerEvent`]s instead of a single
//! variant.

use serde::{Deserialize, Serialize};

/// Messages sent by the client to the assistant backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientMessage {
    /// Session setup handshake, sent exactly once after the transport opens.
    Setup(SessionSetup),
    /// Streaming media input (microphone chunks, camera frames).
    RealtimeInput(RealtimeInput),
    /// Response to a backend-issued tool call.
    ToolResponse(ToolResponse),
}

impl ClientMessage {
    /// Serialize the message to its wire JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Setup parameters for one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSetup {
    pub model: String,
    pub generation_config: GenerationSettings,
    pub system_instruction: SystemInstruction,
    pub tools: Vec<ToolDeclaration>,
    #[serde(rename = "contextWindowCompression")]
    pub context_window_compression: ContextWindowCompression,
    pub input_audio_transcription: TranscriptionSettings,
    pub output_audio_transcription: TranscriptionSettings,
}

/// Model generation settings.
///
/// An empty `responseModalities` list tells the backend to produce no spoken
/// or text replies at all (silent-mode operation): the session then consists
/// purely of input transcription and tool calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationSettings {
    #[serde(rename = "responseModalities")]
    pub response_modalities: Vec<String>,
    pub temperature: f32,
}

/// System instruction text, wrapped in the backend's parts structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemInstruction {
    pub parts: Vec<TextPart>,
}

impl SystemInstruction {
    /// Wraps plain instruction text into a single-part instruction.
    pub fn from_text(text: &str) -> Self {
        Self {
            parts: vec![TextPart {
                text: text.to_string(),
            }],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextPart {
    pub text: String,
}

/// One tool made available to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDeclaration {
    pub function_declarations: Vec<FunctionDeclaration>,
}

/// A callable function signature, with a JSON-schema parameter description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDeclaration {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Context-window compression thresholds.
///
/// `trigger_tokens` must exceed the sliding-window target; enforced at
/// config validation, not here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextWindowCompression {
    #[serde(rename = "triggerTokens")]
    pub trigger_tokens: u32,
    #[serde(rename = "slidingWindow")]
    pub sliding_window: SlidingWindow,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlidingWindow {
    #[serde(rename = "targetTokens")]
    pub target_tokens: u32,
}

/// Empty marker object enabling a transcription stream (`{}` on the wire).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionSettings {}

/// Streaming media payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealtimeInput {
    pub media_chunks: Vec<MediaChunk>,
}

impl RealtimeInput {
    /// Wraps one encoded chunk into a realtime-input envelope.
    pub fn from_chunk(mime_type: &str, data: String) -> Self {
        Self {
            media_chunks: vec![MediaChunk {
                mime_type: mime_type.to_string(),
                data,
            }],
        }
    }
}

/// One base64-encoded media chunk tagged with its MIME type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaChunk {
    pub mime_type: String,
    pub data: String,
}

/// Tool-response payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResponse {
    pub function_responses: Vec<FunctionResponse>,
}

impl ToolResponse {
    /// Builds a single-function response envelope.
    pub fn single(name: &str, content: &str) -> Self {
        Self {
            function_responses: vec![FunctionResponse {
                name: name.to_string(),
                response: ResponseBody {
                    content: content.to_string(),
                },
            }],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionResponse {
    pub name: String,
    pub response: ResponseBody,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseBody {
    pub content: String,
}

/// A raw inbound server message.
///
/// The backend distinguishes message kinds by the presence of sections, not a
/// discriminant tag, and a single message may carry more than one section.
/// Unknown fields are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    #[serde(default)]
    pub setup_complete: Option<serde_json::Value>,
    #[serde(default)]
    pub server_content: Option<ServerContent>,
    #[serde(default)]
    pub tool_call: Option<ToolCallPayload>,
}

/// Server-side content section.
///
/// Model-generated turns and output transcription are decoded so silent-mode
/// policy is a dispatch decision, not a parse failure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    #[serde(default)]
    pub input_transcription: Option<TranscriptionText>,
    #[serde(default)]
    pub output_transcription: Option<TranscriptionText>,
    #[serde(default)]
    pub turn_complete: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TranscriptionText {
    #[serde(default)]
    pub text: Option<String>,
}

/// Tool-call section: a batch of function calls in model-issued order.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToolCallPayload {
    #[serde(rename = "functionCalls", default)]
    pub function_calls: Vec<FunctionCall>,
}

/// One function invocation requested by the backend.
#[derive(Debug, Clone, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub args: serde_json::Value,
    #[serde(default)]
    pub id: Option<String>,
}

/// A decoded server message branch, in dispatch order.
#[derive(Debug, Clone)]
pub enum ServerEvent {
    /// Setup handshake acknowledged; streaming may begin.
    SetupComplete,
    /// The user's spoken words, transcribed server-side.
    InputTranscription { text: String },
    /// Function calls to route, in wire order.
    ToolCalls(Vec<FunctionCall>),
}

impl ServerMessage {
    /// Decode a raw payload string.
    pub fn decode(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }

    /// Flatten the message into its matching branches, in the fixed dispatch
    /// order: setup-complete, then input transcription, then tool calls.
    ///
    /// A message carrying several sections yields several events; sections
    /// with nothing to dispatch (empty transcription text, zero function
    /// calls) yield none.
    pub fn events(self) -> Vec<ServerEvent> {
        let mut events = Vec::new();

        if self.setup_complete.is_some() {
            events.push(ServerEvent::SetupComplete);
        }

        if let Some(content) = self.server_content {
            // Silent-mode policy: output transcription and model turns are
            // received but never surfaced.
            if let Some(transcription) = content.input_transcription
                && let Some(text) = transcription.text
                && !text.is_empty()
            {
                events.push(ServerEvent::InputTranscription { text });
            }
        }

        if let Some(tool_call) = self.tool_call
            && !tool_call.function_calls.is_empty()
        {
            events.push(ServerEvent::ToolCalls(tool_call.function_calls));
        }

        events
    }
}
