//! Ollama HTTP client.
//!
//! The client retries transient failures with a short fixed back-off and
//! returns [`FALLBACK_MESSAGE`] once the budget is spent. `generate` never
//! raises into the caller; the worker loop stays linear.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use talkie_core::LlmClient;

use crate::LlmError;

/// Spoken to the user when the backend cannot produce a reply.
pub const FALLBACK_MESSAGE: &str =
    "I'm sorry, I couldn't generate a response right now. Please try again.";

#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Ollama base URL, no trailing slash required.
    pub base_url: String,
    pub model_name: String,
    /// Per-call HTTP timeout.
    pub timeout: Duration,
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Fixed pause between attempts.
    pub retry_backoff: Duration,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model_name: "mistral".to_string(),
            timeout: Duration::from_secs(60),
            max_retries: 2,
            retry_backoff: Duration::from_secs(1),
        }
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: Option<String>,
}

pub struct OllamaClient {
    client: Client,
    config: LlmConfig,
}

impl OllamaClient {
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Configuration(e.to_string()))?;
        Ok(Self { client, config })
    }

    pub fn base_url(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/api{}", self.base_url(), path)
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn check_connection(&self, timeout: Duration) -> bool {
        let url = self.api_url("/tags");
        match self.client.get(&url).timeout(timeout).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                debug!(url, error = %e, "Ollama reachability probe failed");
                false
            }
        }
    }

    async fn generate(&self, prompt: &str, system: Option<&str>) -> String {
        let url = self.api_url("/generate");
        let payload = GenerateRequest {
            model: &self.config.model_name,
            prompt,
            stream: false,
            system,
        };

        for attempt in 0..=self.config.max_retries {
            match self.client.post(&url).json(&payload).send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if !status.is_success() {
                        warn!(%status, attempt, "Ollama returned an error status");
                    } else {
                        match resp.json::<GenerateResponse>().await {
                            Ok(data) => {
                                if let Some(reply) = data.response {
                                    let reply = reply.trim();
                                    if !reply.is_empty() {
                                        debug!(chars = reply.len(), "Ollama response ok");
                                        return reply.to_string();
                                    }
                                }
                                debug!("Ollama response empty or invalid; returning fallback");
                                return FALLBACK_MESSAGE.to_string();
                            }
                            Err(e) => {
                                warn!(attempt, error = %e, "Ollama response body unreadable");
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Ollama request failed");
                }
            }
            if attempt < self.config.max_retries {
                tokio::time::sleep(self.config.retry_backoff).await;
            }
        }
        debug!("Ollama returning fallback after retries");
        FALLBACK_MESSAGE.to_string()
    }

    fn model_name(&self) -> &str {
        &self.config.model_name
    }
}
