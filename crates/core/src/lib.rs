//! Core traits and types for the Talkie runtime
//!
//! This crate provides the foundational pieces shared by all other crates:
//! - Engine contracts for pluggable backends (STT, TTS, speaker filter,
//!   retriever, browse handler)
//! - Pipeline events and the observer fan-out
//! - Text normalization helpers
//! - Error types

pub mod error;
pub mod events;
pub mod text;
pub mod traits;

pub use error::{Error, Result};
pub use events::{EventBus, PipelineEvent, PipelineStatus};
pub use traits::{
    BrowseHandler, BrowseOutcome, LlmClient, Retriever, SpeakerFilter, SttEngine, TtsEngine,
};
