//! Main settings module

use std::path::Path;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Main application settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub audio: AudioSettings,

    #[serde(default)]
    pub stt: SttSettings,

    #[serde(default)]
    pub tts: TtsSettings,

    #[serde(default)]
    pub ollama: OllamaSettings,

    /// Prompting and intent-reconstruction behavior.
    #[serde(default)]
    pub llm: LlmSettings,

    #[serde(default)]
    pub profile: ProfileSettings,

    #[serde(default)]
    pub document_qa: DocumentQaSettings,

    #[serde(default)]
    pub curation: CurationSettings,

    #[serde(default)]
    pub persistence: PersistenceSettings,

    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioSettings {
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    /// Seconds of audio per STT chunk; effective value is clamped to
    /// [4, 15].
    #[serde(default = "default_chunk_duration_sec")]
    pub chunk_duration_sec: f64,

    /// Initial capture gain multiplier.
    #[serde(default = "default_sensitivity")]
    pub sensitivity: f32,

    #[serde(default)]
    pub auto_sensitivity: AutoSensitivitySettings,
}

fn default_sample_rate() -> u32 {
    16000
}

fn default_chunk_duration_sec() -> f64 {
    5.0
}

fn default_sensitivity() -> f32 {
    2.5
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            chunk_duration_sec: default_chunk_duration_sec(),
            sensitivity: default_sensitivity(),
            auto_sensitivity: AutoSensitivitySettings::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoSensitivitySettings {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_auto_min_level")]
    pub min_level: f32,

    #[serde(default = "default_auto_max_level")]
    pub max_level: f32,

    #[serde(default = "default_auto_step")]
    pub step: f32,

    #[serde(default = "default_auto_cooldown")]
    pub cooldown_chunks: u32,
}

fn default_auto_min_level() -> f32 {
    0.002
}

fn default_auto_max_level() -> f32 {
    0.08
}

fn default_auto_step() -> f32 {
    0.25
}

fn default_auto_cooldown() -> u32 {
    3
}

impl Default for AutoSensitivitySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            min_level: default_auto_min_level(),
            max_level: default_auto_max_level(),
            step: default_auto_step(),
            cooldown_chunks: default_auto_cooldown(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SttSettings {
    /// Engine identifier ("whisper", "vosk", ...). The binding to a
    /// concrete engine happens at assembly time.
    #[serde(default = "default_stt_engine")]
    pub engine: String,

    #[serde(default)]
    pub model_path: Option<String>,
}

fn default_stt_engine() -> String {
    "whisper".to_string()
}

impl Default for SttSettings {
    fn default() -> Self {
        Self {
            engine: default_stt_engine(),
            model_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsSettings {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_tts_engine")]
    pub engine: String,

    /// Default voice; the `tts_voice` user setting overrides it.
    #[serde(default)]
    pub voice: Option<String>,
}

fn default_tts_engine() -> String {
    "say".to_string()
}

impl Default for TtsSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            engine: default_tts_engine(),
            voice: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaSettings {
    #[serde(default = "default_ollama_base_url")]
    pub base_url: String,

    #[serde(default = "default_ollama_model")]
    pub model_name: String,

    #[serde(default = "default_ollama_timeout")]
    pub timeout_sec: f64,

    #[serde(default = "default_ollama_retries")]
    pub max_retries: u32,
}

fn default_ollama_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_ollama_model() -> String {
    "mistral".to_string()
}

fn default_ollama_timeout() -> f64 {
    60.0
}

fn default_ollama_retries() -> u32 {
    2
}

impl Default for OllamaSettings {
    fn default() -> Self {
        Self {
            base_url: default_ollama_base_url(),
            model_name: default_ollama_model(),
            timeout_sec: default_ollama_timeout(),
            max_retries: default_ollama_retries(),
        }
    }
}

/// Prompting and reconstruction descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    /// Run the regeneration pass over raw transcriptions.
    #[serde(default = "default_true")]
    pub regeneration_enabled: bool,

    /// Ask the model for a `{sentence, certainty}` JSON reply.
    #[serde(default = "default_true")]
    pub regeneration_request_certainty: bool,

    /// Use the reconstructed sentence as the final response when certainty
    /// allows, skipping the completion call.
    #[serde(default = "default_true")]
    pub use_regeneration_as_response: bool,

    /// Below this certainty the completion call runs anyway.
    #[serde(default = "default_certainty_threshold")]
    pub regeneration_certainty_threshold: u8,

    /// Transcriptions shorter than this are skipped entirely.
    #[serde(default)]
    pub min_transcription_length: usize,

    #[serde(default)]
    pub regeneration_system_prompt: Option<String>,

    #[serde(default)]
    pub regeneration_user_prompt_template: Option<String>,

    /// Completion system prompt base; built-in default when unset.
    #[serde(default)]
    pub system_prompt: Option<String>,

    #[serde(default)]
    pub user_prompt_template: Option<String>,

    /// When set, browse mode classifies with the plain-command prompt
    /// instead of the JSON intent prompt.
    #[serde(default)]
    pub web_mode_system_prompt: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_certainty_threshold() -> u8 {
    70
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            regeneration_enabled: true,
            regeneration_request_certainty: true,
            use_regeneration_as_response: true,
            regeneration_certainty_threshold: default_certainty_threshold(),
            min_transcription_length: 0,
            regeneration_system_prompt: None,
            regeneration_user_prompt_template: None,
            system_prompt: None,
            user_prompt_template: None,
            web_mode_system_prompt: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileSettings {
    #[serde(default = "default_user_context_max_chars")]
    pub user_context_max_chars: usize,

    #[serde(default = "default_correction_limit")]
    pub correction_limit: usize,

    #[serde(default = "default_accepted_limit")]
    pub accepted_limit: usize,

    #[serde(default = "default_correction_display_cap")]
    pub correction_display_cap: usize,

    #[serde(default = "default_accepted_display_cap")]
    pub accepted_display_cap: usize,
}

fn default_user_context_max_chars() -> usize {
    2000
}

fn default_correction_limit() -> usize {
    200
}

fn default_accepted_limit() -> usize {
    50
}

fn default_correction_display_cap() -> usize {
    50
}

fn default_accepted_display_cap() -> usize {
    30
}

impl Default for ProfileSettings {
    fn default() -> Self {
        Self {
            user_context_max_chars: default_user_context_max_chars(),
            correction_limit: default_correction_limit(),
            accepted_limit: default_accepted_limit(),
            correction_display_cap: default_correction_display_cap(),
            accepted_display_cap: default_accepted_display_cap(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentQaSettings {
    /// Chunks retrieved per question.
    #[serde(default = "default_document_qa_top_k")]
    pub top_k: usize,
}

fn default_document_qa_top_k() -> usize {
    8
}

impl Default for DocumentQaSettings {
    fn default() -> Self {
        Self {
            top_k: default_document_qa_top_k(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurationSettings {
    /// Hours between background passes; zero disables the scheduler.
    #[serde(default)]
    pub interval_hours: f64,

    #[serde(default)]
    pub min_weight: f64,

    #[serde(default = "default_max_weight")]
    pub max_weight: f64,

    #[serde(default = "default_correction_weight_bump")]
    pub correction_weight_bump: f64,

    #[serde(default = "default_pattern_count_weight_scale")]
    pub pattern_count_weight_scale: f64,

    #[serde(default = "default_true")]
    pub exclude_empty_transcription: bool,

    #[serde(default)]
    pub delete_older_than_days: Option<u32>,

    #[serde(default = "default_max_interactions_to_curate")]
    pub max_interactions_to_curate: usize,
}

fn default_max_weight() -> f64 {
    10.0
}

fn default_correction_weight_bump() -> f64 {
    1.5
}

fn default_pattern_count_weight_scale() -> f64 {
    0.5
}

fn default_max_interactions_to_curate() -> usize {
    10_000
}

impl Default for CurationSettings {
    fn default() -> Self {
        Self {
            interval_hours: 0.0,
            min_weight: 0.0,
            max_weight: default_max_weight(),
            correction_weight_bump: default_correction_weight_bump(),
            pattern_count_weight_scale: default_pattern_count_weight_scale(),
            exclude_empty_transcription: true,
            delete_older_than_days: None,
            max_interactions_to_curate: default_max_interactions_to_curate(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceSettings {
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

fn default_db_path() -> String {
    "data/talkie.db".to_string()
}

impl Default for PersistenceSettings {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Default filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Settings {
    /// Load settings: defaults, then `path` (when present), then
    /// `TALKIE__SECTION__KEY` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        let config = builder
            .add_source(Environment::with_prefix("TALKIE").separator("__"))
            .build()?;
        let settings: Settings = config.try_deserialize()?;
        Ok(settings)
    }

    /// Chunk duration with the documented clamp applied.
    pub fn effective_chunk_duration_sec(&self) -> f64 {
        self.audio.chunk_duration_sec.clamp(4.0, 15.0)
    }

    /// Refuse to run on out-of-range values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.audio.sample_rate == 0 {
            return Err(ConfigError::invalid("audio.sample_rate", "must be positive"));
        }
        if !self.audio.chunk_duration_sec.is_finite() || self.audio.chunk_duration_sec <= 0.0 {
            return Err(ConfigError::invalid(
                "audio.chunk_duration_sec",
                "must be a positive number",
            ));
        }
        if !(0.1..=10.0).contains(&self.audio.sensitivity) {
            return Err(ConfigError::invalid(
                "audio.sensitivity",
                format!("must be in [0.1, 10.0], got {}", self.audio.sensitivity),
            ));
        }
        let auto = &self.audio.auto_sensitivity;
        if auto.min_level < 0.0 || auto.max_level > 1.0 || auto.min_level > auto.max_level {
            return Err(ConfigError::invalid(
                "audio.auto_sensitivity",
                "level band must satisfy 0 <= min_level <= max_level <= 1",
            ));
        }
        if auto.enabled && auto.cooldown_chunks == 0 {
            return Err(ConfigError::invalid(
                "audio.auto_sensitivity.cooldown_chunks",
                "must be at least 1 when auto sensitivity is enabled",
            ));
        }
        if self.stt.engine.trim().is_empty() {
            return Err(ConfigError::invalid("stt.engine", "must not be empty"));
        }
        if self.ollama.base_url.trim().is_empty() {
            return Err(ConfigError::invalid("ollama.base_url", "must not be empty"));
        }
        if self.ollama.timeout_sec <= 0.0 {
            return Err(ConfigError::invalid("ollama.timeout_sec", "must be positive"));
        }
        if self.llm.regeneration_certainty_threshold > 100 {
            return Err(ConfigError::invalid(
                "llm.regeneration_certainty_threshold",
                "must be in [0, 100]",
            ));
        }
        if !(1..=20).contains(&self.document_qa.top_k) {
            return Err(ConfigError::invalid(
                "document_qa.top_k",
                format!("must be in [1, 20], got {}", self.document_qa.top_k),
            ));
        }
        if self.curation.min_weight > self.curation.max_weight {
            return Err(ConfigError::invalid(
                "curation.min_weight",
                "must not exceed curation.max_weight",
            ));
        }
        if self.persistence.db_path.trim().is_empty() {
            return Err(ConfigError::invalid("persistence.db_path", "must not be empty"));
        }
        Ok(())
    }
}
