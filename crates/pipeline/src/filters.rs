//! Duplicate and echo suppression.
//!
//! A transcription is processed once per distinct phrase: consecutive
//! duplicates are dropped, and a transcription matching the last spoken
//! response is treated as the microphone picking up our own TTS.

use talkie_core::text::collapse_whitespace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterDecision {
    Accept,
    /// Same as the previous processed transcription.
    Duplicate,
    /// Matches the last spoken response (speaker-to-mic echo).
    Echo,
}

#[derive(Debug, Default)]
pub struct DuplicateEchoFilter {
    /// Trimmed, whitespace-collapsed, case-sensitive.
    last_processed: Option<String>,
    /// Trimmed as spoken; compared case-insensitively.
    last_spoken: Option<String>,
}

impl DuplicateEchoFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide whether to process `transcription`. On accept, it becomes the
    /// new `last_processed`.
    pub fn check(&mut self, transcription: &str) -> FilterDecision {
        let normalized = collapse_whitespace(transcription.trim());
        if normalized.is_empty() {
            return FilterDecision::Accept;
        }
        if self.last_processed.as_deref() == Some(normalized.as_str()) {
            return FilterDecision::Duplicate;
        }
        self.last_processed = Some(normalized.clone());
        if let Some(spoken) = &self.last_spoken {
            if normalized.to_lowercase() == collapse_whitespace(spoken).to_lowercase() {
                return FilterDecision::Echo;
            }
        }
        FilterDecision::Accept
    }

    /// Remember what TTS is about to say, for the echo check.
    pub fn note_spoken(&mut self, response: &str) {
        self.last_spoken = Some(response.trim().to_string());
    }

    pub fn last_spoken(&self) -> Option<&str> {
        self.last_spoken.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_transcription_is_accepted() {
        let mut filter = DuplicateEchoFilter::new();
        assert_eq!(filter.check("I want water"), FilterDecision::Accept);
    }

    #[test]
    fn consecutive_duplicate_is_dropped_once() {
        let mut filter = DuplicateEchoFilter::new();
        assert_eq!(filter.check("I want water"), FilterDecision::Accept);
        assert_eq!(filter.check("I want water"), FilterDecision::Duplicate);
        assert_eq!(filter.check("  I want  water "), FilterDecision::Duplicate);
        // A different phrase resets the duplicate state.
        assert_eq!(filter.check("I want tea"), FilterDecision::Accept);
        assert_eq!(filter.check("I want water"), FilterDecision::Accept);
    }

    #[test]
    fn duplicate_check_is_case_sensitive() {
        let mut filter = DuplicateEchoFilter::new();
        filter.check("I want water");
        assert_eq!(filter.check("i want water"), FilterDecision::Accept);
    }

    #[test]
    fn echo_of_last_spoken_is_dropped() {
        let mut filter = DuplicateEchoFilter::new();
        filter.note_spoken("I am cold.");
        assert_eq!(filter.check("I am cold."), FilterDecision::Echo);
    }

    #[test]
    fn echo_check_ignores_case_and_whitespace() {
        let mut filter = DuplicateEchoFilter::new();
        filter.note_spoken("I am  Cold.");
        assert_eq!(filter.check("i am cold."), FilterDecision::Echo);
    }

    #[test]
    fn unrelated_transcription_passes_after_speaking() {
        let mut filter = DuplicateEchoFilter::new();
        filter.note_spoken("I am cold.");
        assert_eq!(filter.check("open the window"), FilterDecision::Accept);
    }
}
