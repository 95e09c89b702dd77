use crate::defaults;
use crate::error::{LensliveError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub assistant: AssistantConfig,
    pub capture: CaptureConfig,
    pub generation: GenerationConfig,
}

/// Assistant session configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AssistantConfig {
    /// Realtime model identifier sent in the setup message.
    pub model: String,
    /// System instruction text.
    pub instructions: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Response modalities; empty means the assistant never speaks or
    /// writes (silent mode), leaving tool calls as its only output.
    pub response_modalities: Vec<String>,
    /// Whether camera frames are streamed alongside audio.
    pub video_input: bool,
    /// Whether assistant audio playback is enabled on the host.
    pub audio_output: bool,
    /// Context-window compression trigger; must exceed the target.
    pub compression_trigger_tokens: u32,
    /// Sliding-window target token count.
    pub compression_target_tokens: u32,
    /// Setup handshake timeout in milliseconds; 0 waits forever.
    pub setup_timeout_ms: u64,
}

/// Capture and encoding configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CaptureConfig {
    pub input_sample_rate: u32,
    pub output_sample_rate: u32,
    pub audio_chunk_ms: u32,
    pub video_frame_interval_ms: u32,
}

/// 3D generation pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GenerationConfig {
    /// Request the refinement pass after the base mesh.
    pub refine: bool,
    /// Bake vertex colors instead of textures.
    pub use_vertex_color: bool,
    /// Per-stage stall timeout in milliseconds; 0 disables.
    pub stage_timeout_ms: u64,
}

impl Default for AssistantConfig {
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
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            input_sample_rate: defaults::INPUT_SAMPLE_RATE,
            output_sample_rate: defaults::OUTPUT_SAMPLE_RATE,
            audio_chunk_ms: defaults::AUDIO_CHUNK_MS,
            video_frame_interval_ms: defaults::VIDEO_FRAME_INTERVAL_MS,
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            refine: true,
            use_vertex_color: false,
            stage_timeout_ms: defaults::STAGE_TIMEOUT_MS,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Only returns defaults if the file is missing.
    /// Returns errors for invalid TOML or invalid values.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(e) => {
                if e.downcast_ref::<std::io::Error>()
                    .map(|io_err| io_err.kind() == std::io::ErrorKind::NotFound)
                    .unwrap_or(false)
                {
                    Ok(Self::default())
                } else {
                    Err(e)
                }
            }
        }
    }

    /// Check cross-field invariants the serde layer cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.assistant.compression_trigger_tokens == 0
            || self.assistant.compression_target_tokens == 0
        {
            return Err(LensliveError::ConfigInvalidValue {
                key: "compression_target_tokens".to_string(),
                message: "token counts must be positive".to_string(),
            });
        }
        if self.assistant.compression_trigger_tokens <= self.assistant.compression_target_tokens {
            return Err(LensliveError::ConfigInvalidValue {
                key: "compression_trigger_tokens".to_string(),
                message: "must exceed the target token count".to_string(),
            });
        }
        if self.capture.input_sample_rate == 0 || self.capture.output_sample_rate == 0 {
            return Err(LensliveError::ConfigInvalidValue {
                key: "input_sample_rate".to_string(),
                message: "sample rates must be positive".to_string(),
            });
        }
        if self.capture.audio_chunk_ms == 0 {
            return Err(LensliveError::ConfigInvalidValue {
                key: "audio_chunk_ms".to_string(),
                message: "chunk cadence must be positive".to_string(),
            });
        }
        Ok(())
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - LENSLIVE_MODEL → assistant.model
    /// - LENSLIVE_INSTRUCTIONS → assistant.instructions
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(model) = std::env::var("LENSLIVE_MODEL")
            && !model.is_empty()
        {
            self.assistant.model = model;
        }

        if let Ok(instructions) = std::env::var("LENSLIVE_INSTRUCTIONS")
            && !instructions.is_empty()
        {
            self.assistant.instructions = instructions;
        }

        self
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/lenslive/config.toml on Linux
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("lenslive").join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::NamedTempFile;

    // Mutex to serialize tests that modify environment variables
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    // SAFETY: These helpers are only used in tests with ENV_LOCK held,
    // ensuring no concurrent access to environment variables.
    fn set_env(key: &str, value: &str) {
        unsafe { std::env::set_var(key, value) }
    }

    fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) }
    }

    fn clear_lenslive_env() {
        remove_env("LENSLIVE_MODEL");
        remove_env("LENSLIVE_INSTRUCTIONS");
    }

    #[test]
    fn test_default_config_has_correct_values() {
        let config = Config::default();

        assert_eq!(
            config.assistant.model,
            "models/gemini-2.0-flash-live-preview-04-09"
        );
        assert_eq!(config.assistant.temperature, 1.0);
        assert!(config.assistant.response_modalities.is_empty());
        assert!(!config.assistant.video_input);
        assert!(!config.assistant.audio_output);
        assert_eq!(config.assistant.compression_trigger_tokens, 20000);
        assert_eq!(config.assistant.compression_target_tokens, 16000);
        assert_eq!(config.assistant.setup_timeout_ms, 10_000);

        assert_eq!(config.capture.input_sample_rate, 16000);
        assert_eq!(config.capture.output_sample_rate, 24000);
        assert_eq!(config.capture.audio_chunk_ms, 100);
        assert_eq!(config.capture.video_frame_interval_ms, 1500);

        assert!(config.generation.refine);
        assert!(!config.generation.use_vertex_color);
        assert_eq!(config.generation.stage_timeout_ms, 120_000);
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_load_from_toml_file() {
        let toml_content = r#"
            [assistant]
            model = "models/custom-live"
            instructions = "only generate hats"
            video_input = true
            setup_timeout_ms = 0

            [capture]
            audio_chunk_ms = 250

            [generation]
            refine = false
        "#;

        let mut file = NamedTempFile::new().expect("create temp file");
        file.write_all(toml_content.as_bytes())
            .expect("write config");

        let config = Config::load(file.path()).expect("load config");
        assert_eq!(config.assistant.model, "models/custom-live");
        assert_eq!(config.assistant.instructions, "only generate hats");
        assert!(config.assistant.video_input);
        assert_eq!(config.assistant.setup_timeout_ms, 0);
        assert_eq!(config.capture.audio_chunk_ms, 250);
        assert!(!config.generation.refine);
        // Untouched sections keep defaults
        assert_eq!(config.capture.input_sample_rate, 16000);
    }

    #[test]
    fn test_load_rejects_invalid_toml() {
        let mut file = NamedTempFile::new().expect("create temp file");
        file.write_all(b"assistant = {{{").expect("write config");
        assert!(Config::load(file.path()).is_err());
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config =
            Config::load_or_default(Path::new("/nonexistent/lenslive.toml")).expect("defaults");
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_validate_rejects_trigger_at_or_below_target() {
        let mut config = Config::default();
        config.assistant.compression_trigger_tokens = 16000;
        config.assistant.compression_target_tokens = 16000;

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("compression_trigger_tokens"));
    }

    #[test]
    fn test_validate_rejects_zero_token_counts() {
        let mut config = Config::default();
        config.assistant.compression_target_tokens = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_chunk_cadence() {
        let mut config = Config::default();
        config.capture.audio_chunk_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let toml_content = r#"
            [assistant]
            compression_trigger_tokens = 1000
            compression_target_tokens = 2000
        "#;

        let mut file = NamedTempFile::new().expect("create temp file");
        file.write_all(toml_content.as_bytes())
            .expect("write config");

        assert!(Config::load(file.path()).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_lenslive_env();

        set_env("LENSLIVE_MODEL", "models/override-live");
        set_env("LENSLIVE_INSTRUCTIONS", "describe everything");

        let config = Config::default().with_env_overrides();
        assert_eq!(config.assistant.model, "models/override-live");
        assert_eq!(config.assistant.instructions, "describe everything");

        clear_lenslive_env();
    }

    #[test]
    fn test_empty_env_vars_do_not_override() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_lenslive_env();

        set_env("LENSLIVE_MODEL", "");

        let config = Config::default().with_env_overrides();
        assert_eq!(config.assistant.model, Config::default().assistant.model);

        clear_lenslive_env();
    }

    #[test]
    fn test_default_path_is_xdg_compliant() {
        let path = Config::default_path().expect("config dir resolvable");
        let path_str = path.to_string_lossy();

        assert!(path_str.contains("lenslive"));
        assert!(path_str.ends_with("config.toml"));
    }

    #[test]
    fn test_config_toml_roundtrip() {
        let config = Config::default();
        let serialized = toml::to_string(&config).expect("serialize");
        let deserialized: Config = toml::from_str(&serialized).expect("deserialize");
        assert_eq!(config, deserialized);
    }
}
