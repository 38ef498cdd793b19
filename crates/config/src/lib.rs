//! Settings for the Talkie runtime
//!
//! Layered configuration in the usual order: defaults, then an optional
//! TOML file, then `TALKIE__`-prefixed environment variables. `validate()`
//! runs at startup and refuses to start the pipeline on out-of-range
//! values.

mod error;
mod settings;

pub use error::ConfigError;
pub use settings::{
    AudioSettings, AutoSensitivitySettings, CurationSettings, DocumentQaSettings, LlmSettings,
    LoggingSettings, OllamaSettings, PersistenceSettings, ProfileSettings, Settings, SttSettings,
    TtsSettings,
};
