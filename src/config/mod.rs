//! Configuration for the Buddy core
//!
//! A single YAML file declares the collaborator endpoints, queue capacities,
//! and the adapter set. Secrets come from the environment, never the file.
//! Validation is fail-fast: a config that names an unknown adapter kind or a
//! zero-capacity queue refuses to load.

use std::path::PathBuf;

use serde::Deserialize;

use crate::{Error, Result};

/// Top-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Chat model and reply behavior
    pub brain: BrainSettings,

    /// STT/TTS endpoints and wake words
    #[serde(default)]
    pub voice: VoiceSettings,

    /// Queue capacities
    #[serde(default)]
    pub queues: QueueSettings,

    /// Database location override
    #[serde(default)]
    pub storage: StorageSettings,

    /// Adapter instances to construct at startup
    #[serde(default)]
    pub adapters: Vec<AdapterDecl>,
}

/// Chat model settings
#[derive(Debug, Clone, Deserialize)]
pub struct BrainSettings {
    /// Chat completions endpoint
    pub api_url: String,

    /// Model identifier
    pub model: String,

    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// System instruction prepended to every request
    #[serde(default = "default_system_instruction")]
    pub system_instruction: String,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f64,

    /// Conversation turns kept as request context
    #[serde(default = "default_history_turns")]
    pub history_turns: usize,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Spoken when the model fails or times out
    #[serde(default = "default_fallback_reply")]
    pub fallback_reply: String,

    /// Spoken on a voice-initiated shutdown
    #[serde(default = "default_farewell")]
    pub farewell: String,

    /// Temperature at which a memory note is filed
    #[serde(default = "default_hot_temperature")]
    pub hot_temperature_c: f64,
}

/// STT/TTS settings
#[derive(Debug, Clone, Deserialize)]
pub struct VoiceSettings {
    /// Transcription endpoint
    #[serde(default = "default_stt_url")]
    pub stt_url: String,

    /// STT model identifier
    #[serde(default = "default_stt_model")]
    pub stt_model: String,

    /// Transcription language hint
    #[serde(default)]
    pub language: Option<String>,

    /// Speech synthesis endpoint
    #[serde(default = "default_tts_url")]
    pub tts_url: String,

    /// TTS model identifier
    #[serde(default = "default_tts_model")]
    pub tts_model: String,

    /// TTS voice identifier
    #[serde(default = "default_tts_voice")]
    pub tts_voice: String,

    /// TTS speed multiplier
    #[serde(default = "default_tts_speed")]
    pub tts_speed: f64,

    /// Phrases that must open an utterance for it to be acted on
    #[serde(default = "default_wake_words")]
    pub wake_words: Vec<String>,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            stt_url: default_stt_url(),
            stt_model: default_stt_model(),
            language: None,
            tts_url: default_tts_url(),
            tts_model: default_tts_model(),
            tts_voice: default_tts_voice(),
            tts_speed: default_tts_speed(),
            wake_words: default_wake_words(),
        }
    }
}

/// Queue capacities
#[derive(Debug, Clone, Deserialize)]
pub struct QueueSettings {
    /// Shared input queue capacity
    #[serde(default = "default_input_capacity")]
    pub input_capacity: usize,

    /// Per-output-adapter delivery queue capacity
    #[serde(default = "default_output_capacity")]
    pub output_capacity: usize,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            input_capacity: default_input_capacity(),
            output_capacity: default_output_capacity(),
        }
    }
}

/// Storage settings
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageSettings {
    /// Database directory; defaults to the platform data dir
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

/// One adapter instance from the config file.
///
/// `kind` selects the constructor from the factory registry; `settings` is
/// handed to that constructor opaquely.
#[derive(Debug, Clone, Deserialize)]
pub struct AdapterDecl {
    /// Registered adapter kind, e.g. "voice" or "led"
    pub kind: String,

    /// Instance name; defaults to the kind
    #[serde(default)]
    pub name: Option<String>,

    /// Kind-specific settings, passed through unparsed
    #[serde(default)]
    pub settings: serde_yaml::Value,
}

impl AdapterDecl {
    /// Instance name, falling back to the kind
    #[must_use]
    pub fn instance_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.kind)
    }
}

impl Config {
    /// Load and validate a YAML config file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the file cannot be read, parsed, or
    /// fails validation.
    pub fn load(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        let config: Self = serde_yaml::from_str(&content)
            .map_err(|e| Error::Config(format!("cannot parse {}: {e}", path.display())))?;
        config.validate()?;
        tracing::info!(path = %path.display(), adapters = config.adapters.len(), "config loaded");
        Ok(config)
    }

    /// Parse and validate YAML config from a string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] on parse or validation failure.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)
            .map_err(|e| Error::Config(format!("cannot parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.queues.input_capacity == 0 {
            return Err(Error::Config("queues.input_capacity must be > 0".to_string()));
        }
        if self.queues.output_capacity == 0 {
            return Err(Error::Config("queues.output_capacity must be > 0".to_string()));
        }
        if !(0.25..=4.0).contains(&self.voice.tts_speed) {
            return Err(Error::Config(format!(
                "voice.tts_speed {} outside 0.25..=4.0",
                self.voice.tts_speed
            )));
        }

        let mut seen = std::collections::HashSet::new();
        for decl in &self.adapters {
            if decl.kind.is_empty() {
                return Err(Error::Config("adapter with empty kind".to_string()));
            }
            if !seen.insert(decl.instance_name().to_string()) {
                return Err(Error::Config(format!(
                    "duplicate adapter name '{}'",
                    decl.instance_name()
                )));
            }
        }

        Ok(())
    }

    /// API key from the configured environment variable; empty if unset
    #[must_use]
    pub fn api_key(&self) -> String {
        std::env::var(&self.brain.api_key_env).unwrap_or_default()
    }

    /// Database directory, created if missing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the directory cannot be created.
    pub fn data_dir(&self) -> Result<PathBuf> {
        let dir = self.storage.data_dir.clone().unwrap_or_else(default_data_dir);
        std::fs::create_dir_all(&dir)
            .map_err(|e| Error::Config(format!("cannot create {}: {e}", dir.display())))?;
        Ok(dir)
    }

    /// Chat model request timeout
    #[must_use]
    pub const fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.brain.request_timeout_secs)
    }
}

/// Default data directory: `~/.local/share/buddy` on Linux
fn default_data_dir() -> PathBuf {
    directories::BaseDirs::new()
        .map_or_else(|| PathBuf::from(".buddy"), |d| d.data_dir().join("buddy"))
}

/// Default config path: `~/.config/buddy/config.yaml` on Linux
#[must_use]
pub fn default_config_path() -> PathBuf {
    directories::BaseDirs::new().map_or_else(
        || PathBuf::from("config.yaml"),
        |d| d.config_dir().join("buddy").join("config.yaml"),
    )
}

fn default_api_key_env() -> String {
    "BUDDY_API_KEY".to_string()
}

fn default_system_instruction() -> String {
    "You are Buddy, a friendly home voice assistant. Keep replies short and speakable.".to_string()
}

const fn default_temperature() -> f64 {
    0.7
}

const fn default_history_turns() -> usize {
    8
}

const fn default_request_timeout_secs() -> u64 {
    30
}

fn default_fallback_reply() -> String {
    "Sorry, my thoughts are elsewhere right now.".to_string()
}

fn default_farewell() -> String {
    "Shutting down. See you soon!".to_string()
}

const fn default_hot_temperature() -> f64 {
    30.0
}

fn default_stt_url() -> String {
    "https://api.openai.com/v1/audio/transcriptions".to_string()
}

fn default_stt_model() -> String {
    "whisper-1".to_string()
}

fn default_tts_url() -> String {
    "https://api.openai.com/v1/audio/speech".to_string()
}

fn default_tts_model() -> String {
    "tts-1".to_string()
}

fn default_tts_voice() -> String {
    "alloy".to_string()
}

const fn default_tts_speed() -> f64 {
    1.0
}

fn default_wake_words() -> Vec<String> {
    vec!["buddy".to_string(), "hey buddy".to_string()]
}

const fn default_input_capacity() -> usize {
    256
}

const fn default_output_capacity() -> usize {
    64
}
