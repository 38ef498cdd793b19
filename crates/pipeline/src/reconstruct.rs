//! Intent reconstruction: raw STT output into one first-person sentence.

use talkie_core::{EventBus, LlmClient};
use talkie_llm::prompts::{build_regeneration_prompts, parse_regeneration_response};
use talkie_llm::FALLBACK_MESSAGE;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct ReconstructionConfig {
    pub enabled: bool,
    pub request_certainty: bool,
    /// Use the reconstructed sentence as the final response when certainty
    /// allows.
    pub use_as_response: bool,
    pub certainty_threshold: u8,
    pub min_transcription_length: usize,
    pub system_prompt: Option<String>,
    pub user_template: Option<String>,
}

impl Default for ReconstructionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            request_certainty: true,
            use_as_response: true,
            certainty_threshold: 70,
            min_transcription_length: 0,
            system_prompt: None,
            user_template: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconstruction {
    /// The intent sentence; the raw transcription when reconstruction did
    /// not run or failed.
    pub sentence: String,
    /// Always in 0..=100 when present.
    pub certainty: Option<u8>,
    /// True when an LLM reply was actually parsed.
    pub used: bool,
}

impl Reconstruction {
    fn raw(transcription: &str) -> Self {
        Self {
            sentence: transcription.to_string(),
            certainty: None,
            used: false,
        }
    }
}

/// Run the regeneration call when enabled. Empty or fallback replies leave
/// the raw transcription in place.
pub async fn reconstruct(
    llm: &dyn LlmClient,
    config: &ReconstructionConfig,
    transcription: &str,
    events: &EventBus,
) -> Reconstruction {
    if !config.enabled {
        return Reconstruction::raw(transcription);
    }
    let (system, user) = build_regeneration_prompts(
        transcription,
        config.system_prompt.as_deref(),
        config.user_template.as_deref(),
        config.request_certainty,
    );
    events.debug(if config.request_certainty {
        "Regeneration: raw -> intent sentence (with certainty)"
    } else {
        "Regeneration: raw -> intent sentence"
    });
    let reply = llm.generate(&user, Some(&system)).await;
    if reply.trim().is_empty() || reply == FALLBACK_MESSAGE {
        events.debug("Regeneration empty or fallback; using raw transcription");
        return Reconstruction::raw(transcription);
    }
    let (sentence, certainty) = parse_regeneration_response(&reply);
    if sentence.is_empty() {
        events.debug("Regeneration empty or fallback; using raw transcription");
        return Reconstruction::raw(transcription);
    }
    match certainty {
        Some(c) => {
            events.debug(format!("Regenerated intent: {sentence} (certainty {c}%)"));
        }
        None => {
            events.debug(format!("Regenerated intent: {sentence}"));
        }
    }
    debug!(?certainty, "regeneration parsed");
    Reconstruction {
        sentence,
        certainty,
        used: true,
    }
}
