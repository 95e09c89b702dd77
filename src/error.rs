//! Error types for lenslive.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LensliveError {
    // Configuration errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Session errors
    #[error("Session already started (state: {state})")]
    SessionAlreadyStarted { state: String },

    #[error("Session transport error: {message}")]
    Transport { message: String },

    #[error("Session setup timed out after {waited_ms}ms")]
    SetupTimeout { waited_ms: u64 },

    #[error("Failed to decode server message: {0}")]
    MessageDecode(#[from] serde_json::Error),

    // Capture errors
    #[error("Capture device error: {message}")]
    CaptureDevice { message: String },

    #[error("Voice query cancelled: {message}")]
    CaptureCancelled { message: String },

    // Generation errors
    #[error("A generation request is already in flight")]
    GenerationBusy,

    #[error("Generation submission failed: {message}")]
    GenerationSubmit { message: String },

    #[error("Generation failed for \"{prompt}\": {message}")]
    GenerationFailed { prompt: String, message: String },

    #[error("Generation stalled at stage {stage} after {waited_ms}ms")]
    GenerationStalled { stage: String, waited_ms: u64 },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, LensliveError>;
