//! Pipeline assembly from settings, repositories, and engine bindings.
//!
//! Calibration values stored in `user_settings` overlay the static
//! configuration: a calibrated sensitivity, chunk duration, and minimum
//! transcription length win over the file values. Invalid stored values
//! are ignored with a debug log.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use talkie_audio::sensitivity::AutoSensitivityConfig;
use talkie_audio::ChunkQueue;
use talkie_config::Settings;
use talkie_core::{Retriever, SpeakerFilter, SttEngine, TtsEngine};
use talkie_llm::{LlmConfig, OllamaClient};
use talkie_persistence::{keys, Database, HistoryRepo, SettingsRepo, TrainingRepo};
use talkie_profile::LanguageProfile;

use crate::browse::{BrowseActionExecutor, IntentBrowseHandler};
use crate::engines::{NoOpSpeakerFilter, NoOpTtsEngine, SayTtsEngine};
use crate::reconstruct::ReconstructionConfig;
use crate::worker::{Pipeline, PipelineConfig, PipelineDeps};

pub const DEFAULT_SAY_VOICE: &str = "Daniel";

#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Config(#[from] talkie_config::ConfigError),

    #[error(transparent)]
    Llm(#[from] talkie_llm::LlmError),
}

/// Engine bindings provided by the embedding application; everything
/// optional falls back to a no-op or config-driven default.
pub struct EngineBindings {
    pub stt: Arc<dyn SttEngine>,
    /// `None`: built from config (`say` engine, or no-op when TTS is
    /// disabled).
    pub tts: Option<Arc<dyn TtsEngine>>,
    pub speaker_filter: Option<Arc<dyn SpeakerFilter>>,
    pub retriever: Option<Arc<dyn Retriever>>,
    pub browse_executor: Option<Arc<dyn BrowseActionExecutor>>,
}

fn parse_setting<T: std::str::FromStr>(
    settings_repo: &SettingsRepo,
    key: &str,
) -> Option<T> {
    let raw = match settings_repo.get(key) {
        Ok(value) => value?,
        Err(e) => {
            debug!(key, error = %e, "calibration read failed; using config");
            return None;
        }
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    match raw.parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            debug!(key, raw, "invalid calibration value; using config");
            None
        }
    }
}

/// Sensitivity and chunk duration after the calibration overlay.
fn calibrated_audio(settings: &Settings, settings_repo: &SettingsRepo) -> (f32, f64) {
    let mut sensitivity = settings.audio.sensitivity;
    if let Some(calibrated) = parse_setting::<f32>(settings_repo, keys::CALIBRATION_SENSITIVITY) {
        sensitivity = calibrated.clamp(0.5, 10.0);
    }
    let mut chunk_duration = settings.effective_chunk_duration_sec();
    if let Some(calibrated) =
        parse_setting::<f64>(settings_repo, keys::CALIBRATION_CHUNK_DURATION_SEC)
    {
        chunk_duration = calibrated.clamp(4.0, 15.0);
    }
    (sensitivity, chunk_duration)
}

fn reconstruction_config(settings: &Settings, settings_repo: &SettingsRepo) -> ReconstructionConfig {
    let llm = &settings.llm;
    let mut min_len = llm.min_transcription_length;
    if let Some(calibrated) =
        parse_setting::<usize>(settings_repo, keys::CALIBRATION_MIN_TRANSCRIPTION_LENGTH)
    {
        min_len = calibrated;
    }
    ReconstructionConfig {
        enabled: llm.regeneration_enabled,
        request_certainty: llm.regeneration_request_certainty,
        use_as_response: llm.use_regeneration_as_response,
        certainty_threshold: llm.regeneration_certainty_threshold.min(100),
        min_transcription_length: min_len,
        system_prompt: llm.regeneration_system_prompt.clone(),
        user_template: llm.regeneration_user_prompt_template.clone(),
    }
}

fn make_tts(settings: &Settings, settings_repo: &SettingsRepo) -> Arc<dyn TtsEngine> {
    if !settings.tts.enabled {
        return Arc::new(NoOpTtsEngine);
    }
    match settings.tts.engine.to_lowercase().as_str() {
        "say" => {
            let voice = settings_repo
                .get(keys::TTS_VOICE)
                .ok()
                .flatten()
                .filter(|v| !v.trim().is_empty())
                .or_else(|| settings.tts.voice.clone())
                .unwrap_or_else(|| DEFAULT_SAY_VOICE.to_string());
            let rate = settings_repo.get(keys::TTS_RATE).ok().flatten();
            Arc::new(SayTtsEngine::new(voice).with_rate_label(rate.as_deref()))
        }
        _ => Arc::new(NoOpTtsEngine),
    }
}

/// Build a pipeline from validated settings, the database, and engine
/// bindings.
pub fn create_pipeline(
    settings: &Settings,
    db: Database,
    engines: EngineBindings,
) -> Result<Pipeline, BuildError> {
    settings.validate()?;

    let history = HistoryRepo::new(db.clone());
    let settings_repo =
        SettingsRepo::with_user_context_cap(db.clone(), settings.profile.user_context_max_chars);
    let training_repo = TrainingRepo::new(db);

    let (sensitivity, chunk_duration) = calibrated_audio(settings, &settings_repo);
    let sample_rate = settings.audio.sample_rate;
    let chunk_size_bytes = (sample_rate as f64 * chunk_duration).round() as usize * 2;
    let capture = Arc::new(ChunkQueue::new(chunk_size_bytes, sample_rate));
    capture.set_sensitivity(sensitivity);

    let llm = Arc::new(OllamaClient::new(LlmConfig {
        base_url: settings.ollama.base_url.clone(),
        model_name: settings.ollama.model_name.clone(),
        timeout: Duration::from_secs_f64(settings.ollama.timeout_sec),
        max_retries: settings.ollama.max_retries,
        retry_backoff: Duration::from_secs(1),
    })?);

    let profile = Arc::new(
        LanguageProfile::new(
            Box::new(history.clone()),
            Some(Box::new(settings_repo.clone())),
            Some(Box::new(training_repo)),
        )
        .with_limits(
            settings.profile.correction_limit,
            settings.profile.accepted_limit,
        )
        .with_display_caps(
            settings.profile.correction_display_cap,
            settings.profile.accepted_display_cap,
        ),
    );

    let tts = engines
        .tts
        .unwrap_or_else(|| make_tts(settings, &settings_repo));
    let speaker_filter = engines
        .speaker_filter
        .unwrap_or_else(|| Arc::new(NoOpSpeakerFilter));
    let browse_handler = engines.browse_executor.map(|executor| {
        Arc::new(
            IntentBrowseHandler::new(llm.clone(), executor)
                .with_web_mode_prompt(settings.llm.web_mode_system_prompt.clone()),
        ) as Arc<dyn talkie_core::BrowseHandler>
    });

    let config = PipelineConfig {
        reconstruction: reconstruction_config(settings, &settings_repo),
        completion_system_prompt: settings.llm.system_prompt.clone(),
        completion_user_template: settings.llm.user_prompt_template.clone(),
        document_qa_top_k: settings.document_qa.top_k,
    };

    let auto = &settings.audio.auto_sensitivity;
    let auto_sensitivity = AutoSensitivityConfig {
        enabled: auto.enabled,
        min_level: auto.min_level.clamp(0.0, 1.0),
        max_level: auto.max_level.clamp(0.0, 1.0),
        step: auto.step.clamp(0.05, 2.0),
        cooldown_chunks: auto.cooldown_chunks.max(1),
    };

    Ok(Pipeline::new(PipelineDeps {
        config,
        capture,
        stt: engines.stt,
        speaker_filter,
        llm,
        tts,
        history,
        profile,
        retriever: engines.retriever,
        browse_handler,
        auto_sensitivity,
    }))
}
