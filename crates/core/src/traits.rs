//! Engine contracts
//!
//! The pipeline worker is polymorphic over these traits. Concrete engines
//! live outside the core runtime; no-op implementations in `talkie-pipeline`
//! satisfy every contract for tests and headless runs.

use std::time::Duration;

use async_trait::async_trait;

use crate::Result;

/// Large-language-model backend.
///
/// Implementations own their retries and fallbacks: `generate` must return
/// a usable string (a fixed fallback after the retry budget) and never
/// raise into the worker loop.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// True when the backend answers within `timeout`.
    async fn check_connection(&self, timeout: Duration) -> bool;

    /// Generate a reply for `prompt` with an optional system prompt.
    async fn generate(&self, prompt: &str, system: Option<&str>) -> String;

    /// Model identifier for logging.
    fn model_name(&self) -> &str;
}

/// Speech-to-text engine. Expects 16 kHz mono little-endian int16 input.
///
/// `transcribe` returns the empty string when nothing was recognized and
/// raises only on genuine engine failure.
#[async_trait]
pub trait SttEngine: Send + Sync {
    /// Load the model / warm up. No-op by default.
    async fn start(&self) -> Result<()> {
        Ok(())
    }

    /// Release resources. No-op by default.
    async fn stop(&self) {}

    async fn transcribe(&self, audio: &[u8]) -> Result<String>;

    /// Transcription with an optional engine confidence in [0, 1].
    async fn transcribe_with_confidence(&self, audio: &[u8]) -> Result<(String, Option<f32>)> {
        Ok((self.transcribe(audio).await?, None))
    }
}

/// Text-to-speech engine.
///
/// `speak` starts playback and returns without waiting for it to finish;
/// calling it again aborts any in-progress speech. Empty or whitespace-only
/// text is a no-op.
#[async_trait]
pub trait TtsEngine: Send + Sync {
    async fn speak(&self, text: &str) -> Result<()>;

    /// Abort in-progress playback, if any.
    async fn stop(&self);

    /// Block until the current utterance finishes. No-op by default.
    async fn wait_until_done(&self) {}
}

/// Decides whether a transcribed segment came from the target user.
pub trait SpeakerFilter: Send + Sync {
    /// `audio` is the chunk the transcription came from, for
    /// embedding-based implementations.
    fn accept(&self, transcription: &str, audio: &[u8]) -> bool;
}

/// Document retriever for document-QA mode.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Concatenated context for the query, or the empty string.
    async fn retrieve(&self, query: &str, top_k: usize) -> Result<String>;

    /// True when at least one document chunk is indexed.
    async fn has_documents(&self) -> bool;
}

/// What a browse handler wants done after looking at an utterance.
///
/// The source of truth for browse mode and the event stream is the
/// pipeline, so the handler reports requested changes as data and the
/// dispatcher applies them.
#[derive(Debug, Clone, Default)]
pub struct BrowseOutcome {
    /// User-visible result. Persisted and spoken like any other response.
    pub message: Option<String>,
    /// Turn browse mode on or off.
    pub set_browse_mode: Option<bool>,
    /// Change (or clear, with `Some(None)`) the remembered link selection.
    pub set_selection: Option<Option<String>>,
    /// URL for the user's client to open.
    pub open_url: Option<String>,
}

/// Handles one browse-mode utterance.
///
/// Returning `None` means "not a browse action"; the pipeline continues
/// its normal flow for the utterance.
#[async_trait]
pub trait BrowseHandler: Send + Sync {
    async fn handle(&self, utterance: &str) -> Option<BrowseOutcome>;
}
