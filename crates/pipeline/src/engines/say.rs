//! TTS via the system `say` binary.
//!
//! `speak` starts one `say` process per utterance and returns immediately;
//! speaking again aborts the previous process first, which is what lets a
//! user talk over a response to retry.

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::debug;

use talkie_core::{Error, Result, TtsEngine};

/// Words-per-minute for the recognized rate labels.
fn rate_wpm(label: &str) -> Option<u32> {
    match label {
        "slow" => Some(120),
        "normal" => Some(175),
        "fast" => Some(220),
        _ => None,
    }
}

pub struct SayTtsEngine {
    voice: String,
    rate_wpm: Option<u32>,
    child: Mutex<Option<Child>>,
}

impl SayTtsEngine {
    pub fn new(voice: impl Into<String>) -> Self {
        Self {
            voice: voice.into(),
            rate_wpm: None,
            child: Mutex::new(None),
        }
    }

    /// Apply a user rate setting ("slow" / "normal" / "fast"); anything
    /// else keeps the system default.
    pub fn with_rate_label(mut self, label: Option<&str>) -> Self {
        self.rate_wpm = label.and_then(rate_wpm);
        self
    }

    pub fn voice(&self) -> &str {
        &self.voice
    }
}

#[async_trait]
impl TtsEngine for SayTtsEngine {
    async fn speak(&self, text: &str) -> Result<()> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(());
        }
        // New speech aborts whatever is still playing.
        self.stop().await;
        let mut cmd = Command::new("say");
        cmd.arg("-v").arg(&self.voice);
        if let Some(rate) = self.rate_wpm {
            cmd.arg("-r").arg(rate.to_string());
        }
        cmd.arg(text);
        let child = cmd.spawn().map_err(|e| Error::Tts(e.to_string()))?;
        *self.child.lock().await = Some(child);
        Ok(())
    }

    async fn stop(&self) {
        if let Some(mut child) = self.child.lock().await.take() {
            if let Err(e) = child.start_kill() {
                debug!(error = %e, "say process kill failed (already exited?)");
            }
            let _ = child.wait().await;
        }
    }

    async fn wait_until_done(&self) {
        if let Some(child) = self.child.lock().await.as_mut() {
            let _ = child.wait().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_labels_map_to_wpm() {
        assert_eq!(rate_wpm("slow"), Some(120));
        assert_eq!(rate_wpm("normal"), Some(175));
        assert_eq!(rate_wpm("fast"), Some(220));
        assert_eq!(rate_wpm("warp"), None);
    }

    #[tokio::test]
    async fn empty_text_spawns_nothing() {
        let tts = SayTtsEngine::new("Daniel");
        tts.speak("   ").await.unwrap();
        assert!(tts.child.lock().await.is_none());
    }

    #[tokio::test]
    async fn stop_without_speech_is_a_noop() {
        let tts = SayTtsEngine::new("Daniel");
        tts.stop().await;
        tts.wait_until_done().await;
    }
}
