//! lenslive - Realtime multimodal assistant session core for AR glasses
//!
//! Streams microphone (and optionally camera) input to a realtime assistant
//! backend over a persistent session and turns backend tool calls into
//! asynchronous 3D asset generation.

// Error handling discipline: failures surface through Result and events,
// never panics.
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod bridge;
pub mod capture;
pub mod config;
pub mod defaults;
pub mod error;
pub mod event;
pub mod generation;
pub mod protocol;
pub mod query;
pub mod session;

// Core traits (capture → session → generation)
pub use capture::encoder::StreamEncoder;
pub use generation::pipeline::{ArtifactPlaceholder, PlaceholderFactory};
pub use generation::service::GenerationService;
pub use query::SpeechRecognizer;
pub use session::transport::{AudioOutput, SessionTransport};

// Session
pub use session::assistant::{
    AssistantSession, SessionController, SessionDriver, SessionEvent, SessionHandle,
    SessionOptions, SessionState,
};

// Generation
pub use generation::pipeline::{CompletionHandle, GenerationOutcome, GenerationPipeline};
pub use generation::service::{Stage, StageEvent};

// Voice query
pub use query::{QueryCapture, QueryHandle};

// Bridge
pub use bridge::AssistantBridge;

// Error handling
pub use error::{LensliveError, Result};

// Config
pub use config::Config;

// Event fan-out
pub use event::EventHub;

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.2+abc1234"` when git hash is available, `"0.1.2"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_string_starts_with_cargo_version() {
        let ver = version_string();
        assert!(
            ver.starts_with(env!("CARGO_PKG_VERSION")),
            "version_string should start with CARGO_PKG_VERSION, got: {}",
            ver
        );
    }

    #[test]
    fn version_string_contains_plus_when_git_hash_present() {
        let ver = version_string();
        // In a git repo build, GIT_HASH is set → expect "0.1.2+<hash>"
        // In CI without git, expect plain "0.1.2"
        if option_env!("GIT_HASH").is_some_and(|h| !h.is_empty()) {
            assert!(
                ver.contains('+'),
                "With GIT_HASH set, version should contain '+', got: {}",
                ver
            );
        } else {
            assert_eq!(ver, env!("CARGO_PKG_VERSION"));
        }
    }
}
