//! [`LanguageProfile`]: fetch, assemble, and cache the profile text.
//!
//! The profile holds read-capability handles only; it owns no persistence
//! state beyond its cache. On any repository error it returns the empty
//! string so the LLM still gets the base prompt.

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::warn;

use talkie_persistence::{keys, HistoryRepo, SettingsRepo, TrainingRepo};

use crate::builder::{build_profile_text, ProfileInputs};

pub const CORRECTION_PROFILE_LIMIT: usize = 200;
pub const ACCEPTED_PROFILE_LIMIT: usize = 50;
pub const CORRECTION_DISPLAY_CAP: usize = 50;
pub const ACCEPTED_DISPLAY_CAP: usize = 30;
pub const TRAINING_FACTS_PROFILE_LIMIT: usize = 100;

/// How long an assembled profile stays valid without new history.
pub const PROFILE_CACHE_TTL: Duration = Duration::from_secs(30);

/// Read access to correction and accepted pairs.
pub trait ProfileHistory: Send + Sync {
    fn corrections_for_profile(&self, limit: usize) -> Result<Vec<(String, String)>, String>;
    fn accepted_for_profile(&self, limit: usize) -> Result<Vec<(String, String)>, String>;
}

/// Read access to identity settings.
pub trait ProfileSettings: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, String>;
}

/// Read access to training facts.
pub trait ProfileFacts: Send + Sync {
    fn facts_for_profile(&self, limit: usize) -> Result<Vec<String>, String>;
}

impl ProfileHistory for HistoryRepo {
    fn corrections_for_profile(&self, limit: usize) -> Result<Vec<(String, String)>, String> {
        self.get_corrections_for_profile(limit).map_err(|e| e.to_string())
    }

    fn accepted_for_profile(&self, limit: usize) -> Result<Vec<(String, String)>, String> {
        self.get_accepted_for_profile(limit).map_err(|e| e.to_string())
    }
}

impl ProfileSettings for SettingsRepo {
    fn get(&self, key: &str) -> Result<Option<String>, String> {
        SettingsRepo::get(self, key).map_err(|e| e.to_string())
    }
}

impl ProfileFacts for TrainingRepo {
    fn facts_for_profile(&self, limit: usize) -> Result<Vec<String>, String> {
        self.get_for_profile(limit).map_err(|e| e.to_string())
    }
}

struct CachedContext {
    text: String,
    at: Instant,
}

/// Personalization context provider with a short-TTL cache.
pub struct LanguageProfile {
    history: Box<dyn ProfileHistory>,
    settings: Option<Box<dyn ProfileSettings>>,
    training: Option<Box<dyn ProfileFacts>>,
    correction_limit: usize,
    accepted_limit: usize,
    correction_display_cap: usize,
    accepted_display_cap: usize,
    ttl: Duration,
    cache: Mutex<Option<CachedContext>>,
}

impl LanguageProfile {
    pub fn new(
        history: Box<dyn ProfileHistory>,
        settings: Option<Box<dyn ProfileSettings>>,
        training: Option<Box<dyn ProfileFacts>>,
    ) -> Self {
        Self {
            history,
            settings,
            training,
            correction_limit: CORRECTION_PROFILE_LIMIT,
            accepted_limit: ACCEPTED_PROFILE_LIMIT,
            correction_display_cap: CORRECTION_DISPLAY_CAP,
            accepted_display_cap: ACCEPTED_DISPLAY_CAP,
            ttl: PROFILE_CACHE_TTL,
            cache: Mutex::new(None),
        }
    }

    pub fn with_limits(mut self, correction_limit: usize, accepted_limit: usize) -> Self {
        self.correction_limit = correction_limit;
        self.accepted_limit = accepted_limit;
        self
    }

    pub fn with_display_caps(mut self, correction_cap: usize, accepted_cap: usize) -> Self {
        self.correction_display_cap = correction_cap;
        self.accepted_display_cap = accepted_cap;
        self
    }

    #[cfg(test)]
    fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Drop the cached text (e.g. after a new interaction is saved).
    /// Idempotent and cheap.
    pub fn invalidate_cache(&self) {
        *self.cache.lock() = None;
    }

    /// The profile text to append to the system prompt. Cached for the TTL;
    /// empty string on repository errors.
    pub fn context_for_llm(&self) -> String {
        {
            let cache = self.cache.lock();
            if let Some(cached) = cache.as_ref() {
                if cached.at.elapsed() < self.ttl {
                    return cached.text.clone();
                }
            }
        }
        let text = match self.assemble() {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "profile assembly failed; using empty context");
                return String::new();
            }
        };
        *self.cache.lock() = Some(CachedContext {
            text: text.clone(),
            at: Instant::now(),
        });
        text
    }

    fn setting(&self, key: &str) -> Result<Option<String>, String> {
        match &self.settings {
            Some(settings) => settings.get(key),
            None => Ok(None),
        }
    }

    fn assemble(&self) -> Result<String, String> {
        let user_context = self.setting(keys::USER_CONTEXT)?;
        let preferred_name = self.setting(keys::PREFERRED_NAME)?;
        let pronouns = self.setting(keys::PRONOUNS)?;
        let training_facts = match &self.training {
            Some(training) => training.facts_for_profile(TRAINING_FACTS_PROFILE_LIMIT)?,
            None => Vec::new(),
        };
        let corrections = self.history.corrections_for_profile(self.correction_limit)?;
        let accepted = self.history.accepted_for_profile(self.accepted_limit)?;
        Ok(build_profile_text(&ProfileInputs {
            user_context,
            preferred_name,
            pronouns,
            training_facts,
            corrections,
            accepted,
            correction_display_cap: self.correction_display_cap,
            accepted_display_cap: self.accepted_display_cap,
        }))
    }
}
