//! The Talkie interaction pipeline
//!
//! A long-lived worker task consumes the audio chunk queue, transcribes,
//! filters, reconstructs intent, selects a response (verbatim repeat,
//! reconstruction, document QA, browse, or completion), persists the
//! interaction, and speaks the result, all while staying responsive to the
//! user speaking again and to `stop()`.

pub mod browse;
pub mod builder;
pub mod engines;
pub mod filters;
pub mod reconstruct;
pub mod worker;

pub use browse::{BrowseActionExecutor, IntentBrowseHandler};
pub use builder::{create_pipeline, BuildError, EngineBindings};
pub use filters::{DuplicateEchoFilter, FilterDecision};
pub use reconstruct::{reconstruct, Reconstruction, ReconstructionConfig};
pub use worker::{Pipeline, PipelineConfig, PipelineDeps, PipelineState, NO_DOCUMENTS_MESSAGE};
