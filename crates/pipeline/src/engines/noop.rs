//! No-op engines. Useful headless (TTS disabled in config) and as the
//! default speaker filter until voice profiles are trained.

use async_trait::async_trait;

use talkie_core::{Result, SpeakerFilter, SttEngine, TtsEngine};

/// Accepts every segment.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpSpeakerFilter;

impl SpeakerFilter for NoOpSpeakerFilter {
    fn accept(&self, _transcription: &str, _audio: &[u8]) -> bool {
        true
    }
}

/// Swallows all speech.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpTtsEngine;

#[async_trait]
impl TtsEngine for NoOpTtsEngine {
    async fn speak(&self, _text: &str) -> Result<()> {
        Ok(())
    }

    async fn stop(&self) {}
}

/// Recognizes nothing; every chunk transcribes to the empty string.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpSttEngine;

#[async_trait]
impl SttEngine for NoOpSttEngine {
    async fn transcribe(&self, _audio: &[u8]) -> Result<String> {
        Ok(String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_engines_satisfy_their_contracts() {
        assert!(NoOpSpeakerFilter.accept("anything", &[]));
        NoOpTtsEngine.speak("hello").await.unwrap();
        NoOpTtsEngine.stop().await;
        assert_eq!(NoOpSttEngine.transcribe(&[0, 0]).await.unwrap(), "");
    }
}
