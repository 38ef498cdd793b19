//! LLM error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("failed to build HTTP client: {0}")]
    Configuration(String),
}
