//! Error types shared across engine contracts

use thiserror::Error;

/// Errors raised by engine implementations into the pipeline worker.
#[derive(Debug, Error)]
pub enum Error {
    /// Capture device gone or never available. Fatal for the running loop.
    #[error("microphone unavailable: {0}")]
    Microphone(String),

    /// A transcription call failed. The worker skips the turn and continues.
    #[error("speech recognition failed: {0}")]
    Stt(String),

    /// A synthesis call failed. Logged, never fatal.
    #[error("speech synthesis failed: {0}")]
    Tts(String),

    /// Document retrieval failed. The turn proceeds without context.
    #[error("retrieval failed: {0}")]
    Retrieval(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
