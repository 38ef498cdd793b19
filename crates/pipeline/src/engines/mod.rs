//! Engine implementations kept in-tree: no-op stand-ins for every contract
//! and the process-spawning `say` TTS engine. Real STT engines and
//! retrievers are wired in by the embedding application.

mod noop;
mod say;

pub use noop::{NoOpSpeakerFilter, NoOpSttEngine, NoOpTtsEngine};
pub use say::SayTtsEngine;
