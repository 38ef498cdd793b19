//! The pipeline worker: read chunk -> STT -> filters -> reconstruct ->
//! respond -> persist -> events -> TTS, on one dedicated task per pipeline.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, warn};

use talkie_audio::sensitivity::{AutoSensitivityConfig, AutoSensitivityController};
use talkie_audio::{chunk_rms_level, ChunkQueue};
use talkie_core::text::normalize_for_repeat;
use talkie_core::{
    BrowseHandler, EventBus, LlmClient, PipelineStatus, Retriever, SpeakerFilter, SttEngine,
    TtsEngine,
};
use talkie_llm::prompts::{
    build_document_qa_system_prompt, build_document_qa_user_prompt, build_system_prompt,
    build_user_prompt,
};
use talkie_persistence::HistoryRepo;
use talkie_profile::LanguageProfile;

use crate::filters::{DuplicateEchoFilter, FilterDecision};
use crate::reconstruct::{reconstruct, Reconstruction, ReconstructionConfig};

/// Spoken and shown when document-QA mode is on but nothing is indexed.
pub const NO_DOCUMENTS_MESSAGE: &str =
    "No documents are indexed yet. Open Documents, add files, and click Vectorize.";

const LLM_PROBE_TIMEOUT: Duration = Duration::from_secs(5);
/// Upper bound on waiting for the worker task to finish after `stop()`.
const WORKER_JOIN_TIMEOUT: Duration = Duration::from_secs(7);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// Immutable configuration snapshot for one pipeline lifetime. Rebuilt by
/// the assembly layer on restart.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub reconstruction: ReconstructionConfig,
    /// Completion system prompt base; built-in default when unset.
    pub completion_system_prompt: Option<String>,
    pub completion_user_template: Option<String>,
    pub document_qa_top_k: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            reconstruction: ReconstructionConfig::default(),
            completion_system_prompt: None,
            completion_user_template: None,
            document_qa_top_k: 8,
        }
    }
}

/// Everything a pipeline owns for its lifetime.
pub struct PipelineDeps {
    pub config: PipelineConfig,
    pub capture: Arc<ChunkQueue>,
    pub stt: Arc<dyn SttEngine>,
    pub speaker_filter: Arc<dyn SpeakerFilter>,
    pub llm: Arc<dyn LlmClient>,
    pub tts: Arc<dyn TtsEngine>,
    pub history: HistoryRepo,
    pub profile: Arc<LanguageProfile>,
    pub retriever: Option<Arc<dyn Retriever>>,
    pub browse_handler: Option<Arc<dyn BrowseHandler>>,
    pub auto_sensitivity: AutoSensitivityConfig,
}

type TrainingCallback = Arc<dyn Fn(&str) + Send + Sync>;

struct Inner {
    config: PipelineConfig,
    capture: Arc<ChunkQueue>,
    stt: Arc<dyn SttEngine>,
    speaker_filter: Arc<dyn SpeakerFilter>,
    llm: Arc<dyn LlmClient>,
    tts: Arc<dyn TtsEngine>,
    history: HistoryRepo,
    profile: Arc<LanguageProfile>,
    retriever: Option<Arc<dyn Retriever>>,
    browse_handler: Option<Arc<dyn BrowseHandler>>,
    events: EventBus,
    state: Mutex<PipelineState>,
    running: AtomicBool,
    training_mode: AtomicBool,
    document_qa_mode: AtomicBool,
    document_qa_top_k: AtomicUsize,
    browse_mode: AtomicBool,
    quit_modal_pending: AtomicBool,
    browse_selection: Mutex<Option<String>>,
    filter: Mutex<DuplicateEchoFilter>,
    auto_sensitivity: Mutex<AutoSensitivityController>,
    on_training_transcription: Mutex<Option<TrainingCallback>>,
    session_id: String,
}

/// One long-lived interaction pipeline. Multiple pipelines per process are
/// fine; each owns its queue, worker task, and observer set.
pub struct Pipeline {
    inner: Arc<Inner>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Pipeline {
    pub fn new(deps: PipelineDeps) -> Self {
        let top_k = deps.config.document_qa_top_k.clamp(1, 20);
        let inner = Inner {
            auto_sensitivity: Mutex::new(AutoSensitivityController::new(deps.auto_sensitivity)),
            config: deps.config,
            capture: deps.capture,
            stt: deps.stt,
            speaker_filter: deps.speaker_filter,
            llm: deps.llm,
            tts: deps.tts,
            history: deps.history,
            profile: deps.profile,
            retriever: deps.retriever,
            browse_handler: deps.browse_handler,
            events: EventBus::new(),
            state: Mutex::new(PipelineState::Stopped),
            running: AtomicBool::new(false),
            training_mode: AtomicBool::new(false),
            document_qa_mode: AtomicBool::new(false),
            document_qa_top_k: AtomicUsize::new(top_k),
            browse_mode: AtomicBool::new(false),
            quit_modal_pending: AtomicBool::new(false),
            browse_selection: Mutex::new(None),
            filter: Mutex::new(DuplicateEchoFilter::new()),
            on_training_transcription: Mutex::new(None),
            session_id: uuid::Uuid::new_v4().to_string(),
        };
        Self {
            inner: Arc::new(inner),
            handle: Mutex::new(None),
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    /// The capture queue this pipeline reads from; the audio producer
    /// (e.g. the WebSocket handler) feeds it.
    pub fn capture(&self) -> Arc<ChunkQueue> {
        Arc::clone(&self.inner.capture)
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<talkie_core::PipelineEvent> {
        self.inner.events.subscribe()
    }

    pub fn state(&self) -> PipelineState {
        *self.inner.state.lock()
    }

    pub fn session_id(&self) -> &str {
        &self.inner.session_id
    }

    pub fn get_sensitivity(&self) -> f32 {
        self.inner.capture.get_sensitivity()
    }

    pub fn set_sensitivity(&self, value: f32) {
        self.inner.capture.set_sensitivity(value);
    }

    /// When on, transcriptions go to the training callback instead of the
    /// LLM.
    pub fn set_training_mode(&self, enabled: bool) {
        self.inner.training_mode.store(enabled, Ordering::SeqCst);
    }

    pub fn set_on_training_transcription(&self, callback: Option<TrainingCallback>) {
        *self.inner.on_training_transcription.lock() = callback;
    }

    /// When on, the next utterance is answered from the document index.
    pub fn set_document_qa_mode(&self, on: bool) {
        self.inner.document_qa_mode.store(on, Ordering::SeqCst);
    }

    pub fn set_document_qa_top_k(&self, top_k: usize) {
        self.inner
            .document_qa_top_k
            .store(top_k.clamp(1, 20), Ordering::SeqCst);
    }

    pub fn set_browse_mode(&self, on: bool) {
        self.inner.browse_mode.store(on, Ordering::SeqCst);
    }

    pub fn browse_mode(&self) -> bool {
        self.inner.browse_mode.load(Ordering::SeqCst)
    }

    /// The link the user last selected in browse mode, if any.
    pub fn browse_selection(&self) -> Option<String> {
        self.inner.browse_selection.lock().clone()
    }

    pub fn set_quit_modal_pending(&self, pending: bool) {
        self.inner.quit_modal_pending.store(pending, Ordering::SeqCst);
    }

    pub fn quit_modal_pending(&self) -> bool {
        self.inner.quit_modal_pending.load(Ordering::SeqCst)
    }

    /// The user confirmed the quit modal.
    pub fn confirm_quit(&self) {
        self.inner.events.emit(talkie_core::PipelineEvent::Quit);
    }

    /// The user dismissed the quit modal.
    pub fn cancel_quit(&self) {
        self.set_quit_modal_pending(false);
        self.inner
            .events
            .emit(talkie_core::PipelineEvent::CloseQuitModal);
    }

    /// Speak outside a turn (e.g. a ready message). Empty text is a no-op.
    pub async fn speak(&self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        if let Err(e) = self.inner.tts.speak(text).await {
            warn!(error = %e, "TTS speak failed");
        }
    }

    /// Start the worker task. No-op unless currently stopped.
    pub fn start(&self) {
        {
            let mut state = self.inner.state.lock();
            if *state != PipelineState::Stopped {
                return;
            }
            *state = PipelineState::Starting;
        }
        self.inner.running.store(true, Ordering::SeqCst);
        let inner = Arc::clone(&self.inner);
        *self.handle.lock() = Some(tokio::spawn(run_loop(inner)));
    }

    /// Signal the worker and wait for it, bounded. The worker owns the
    /// capture and STT shutdown; the queue's stop only wakes the blocked
    /// reader.
    pub async fn stop(&self) {
        {
            let mut state = self.inner.state.lock();
            if *state == PipelineState::Stopped {
                return;
            }
            *state = PipelineState::Stopping;
        }
        self.inner.running.store(false, Ordering::SeqCst);
        self.inner.capture.stop();
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if tokio::time::timeout(WORKER_JOIN_TIMEOUT, handle).await.is_err() {
                warn!("pipeline worker did not stop within timeout; may still be running");
            }
        }
    }
}

impl Inner {
    fn set_state(&self, state: PipelineState) {
        *self.state.lock() = state;
    }

    fn running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn handle_empty_transcription(&self, level: f32) {
        let mut controller = self.auto_sensitivity.lock();
        let cfg = controller.config().clone();
        self.events.debug(format!(
            "STT: (empty) level={level:.4} (auto sens: {}, band {:.4}-{:.4})",
            if cfg.enabled { "on" } else { "off" },
            cfg.min_level,
            cfg.max_level
        ));
        if level > cfg.max_level {
            self.events.debug(
                "High level but no transcription - check the mic is 16 kHz and the STT model is loaded.",
            );
        }
        if let Some(raised) = controller.on_empty_transcription(level, self.capture.get_sensitivity())
        {
            self.capture.set_sensitivity(raised);
            self.events.debug(format!(
                "Auto sensitivity: raised to {raised:.1} (level={level:.4}, no speech)"
            ));
            self.events.sensitivity(raised);
        }
    }

    /// The response-selection branches, first match wins. `None` means the
    /// turn produced nothing to persist or speak.
    async fn select_response(&self, raw: &str, recon: &Reconstruction) -> Option<String> {
        self.events.status(PipelineStatus::Responding);

        // Browse mode: the handler sees the raw utterance. A `None` from
        // the handler means "not a browse action", and the normal flow
        // continues below.
        if self.browse_mode.load(Ordering::SeqCst) {
            if let Some(handler) = &self.browse_handler {
                if let Some(outcome) = handler.handle(raw).await {
                    if let Some(mode) = outcome.set_browse_mode {
                        self.browse_mode.store(mode, Ordering::SeqCst);
                        self.events
                            .debug(format!("Browse mode {}", if mode { "on" } else { "off" }));
                    }
                    if let Some(selection) = outcome.set_selection {
                        *self.browse_selection.lock() = selection;
                    }
                    if let Some(url) = outcome.open_url {
                        self.events.open_url(url);
                    }
                    return outcome.message.filter(|m| !m.trim().is_empty());
                }
            }
        }

        // Document QA: constrained to retrieved context, fixed empty-state
        // message when nothing is indexed.
        if self.document_qa_mode.load(Ordering::SeqCst) {
            let retriever = match &self.retriever {
                Some(retriever) if retriever.has_documents().await => retriever,
                _ => {
                    self.events.debug("Document QA: no documents indexed, short-circuit");
                    return Some(NO_DOCUMENTS_MESSAGE.to_string());
                }
            };
            let top_k = self.document_qa_top_k.load(Ordering::SeqCst);
            let context = match retriever.retrieve(&recon.sentence, top_k).await {
                Ok(context) => context,
                Err(e) => {
                    error!(error = %e, "retriever failed");
                    self.events.debug(format!("Error (retriever): {e}"));
                    String::new()
                }
            };
            let system = build_document_qa_system_prompt(&context);
            let user = build_document_qa_user_prompt(&recon.sentence);
            self.events.debug(format!(
                "Document QA: LLM with retrieved context ({} chars)",
                context.len()
            ));
            return Some(self.llm.generate(&user, Some(&system)).await);
        }

        // Heard the full sentence and the model effectively agrees: repeat
        // it, no second call.
        let raw_norm = normalize_for_repeat(raw);
        let intent_norm = normalize_for_repeat(&recon.sentence);
        if recon.used && !raw_norm.is_empty() && raw_norm == intent_norm {
            self.events
                .debug("Heard full sentence; model agrees it makes sense - repeating it (skipping completion)");
            return Some(recon.sentence.trim().to_string());
        }

        // Trust the reconstruction outright when certainty allows.
        let cfg = &self.config.reconstruction;
        if cfg.use_as_response && recon.used {
            match recon.certainty {
                None => {
                    self.events
                        .debug("Using regenerated intent as response (skipping completion)");
                    return Some(recon.sentence.clone());
                }
                Some(c) if c >= cfg.certainty_threshold => {
                    self.events.debug(format!(
                        "Using regenerated intent as response (certainty {c}% >= {}%)",
                        cfg.certainty_threshold
                    ));
                    return Some(recon.sentence.clone());
                }
                Some(c) => {
                    self.events.debug(format!(
                        "Certainty {c}% < {}%, running completion call",
                        cfg.certainty_threshold
                    ));
                }
            }
        }

        // Completion: base prompt + profile context.
        let profile_context = self.profile.context_for_llm();
        let system = build_system_prompt(
            Some(&profile_context),
            self.config.completion_system_prompt.as_deref(),
            None,
        );
        let user = build_user_prompt(&recon.sentence, self.config.completion_user_template.as_deref());
        self.events
            .debug(format!("LLM completion call: model={}", self.llm.model_name()));
        Some(self.llm.generate(&user, Some(&system)).await)
    }
}

async fn run_loop(inner: Arc<Inner>) {
    let events = inner.events.clone();
    events.debug("Pipeline task started");
    events.status(PipelineStatus::Starting);

    inner.capture.start();
    events.debug("Audio capture started");
    if let Err(e) = inner.stt.start().await {
        error!(error = %e, "pipeline start failed");
        events.debug(format!("Pipeline start failed: {e}"));
        events.error(e.to_string());
        inner.running.store(false, Ordering::SeqCst);
        inner.capture.stop();
        inner.set_state(PipelineState::Stopped);
        events.status(PipelineStatus::Stopped);
        return;
    }
    events.debug("STT started");

    if !inner.llm.check_connection(LLM_PROBE_TIMEOUT).await {
        events.debug("Error: LLM backend not reachable. Is it running?");
        events.error("LLM backend not reachable. Is it running?");
        inner.running.store(false, Ordering::SeqCst);
        inner.capture.stop();
        inner.stt.stop().await;
        inner.set_state(PipelineState::Stopped);
        events.status(PipelineStatus::Stopped);
        return;
    }

    inner.set_state(PipelineState::Running);
    events.debug("Pipeline running (audio + STT started)");

    while inner.running() {
        events.status(PipelineStatus::Listening);
        let volume_events = events.clone();
        let on_level = move |level: f32| volume_events.volume(level);
        let chunk = inner.capture.read_chunk(Some(&on_level)).await;
        if !inner.running() {
            break;
        }
        let Some(chunk) = chunk else {
            // The queue closed under us without a stop(): capture is gone.
            events.debug("Microphone disconnected");
            events.error("Microphone disconnected");
            break;
        };

        let level = chunk_rms_level(&chunk);
        events.volume(level);
        events.debug(format!(
            "Audio chunk received ({} bytes), transcribing...",
            chunk.len()
        ));
        events.status(PipelineStatus::Transcribing);
        let text = match inner.stt.transcribe(&chunk).await {
            Ok(text) => text.trim().to_string(),
            Err(e) => {
                error!(error = %e, "STT transcribe failed");
                events.debug(format!("Error (STT transcribe): {e}"));
                events.error("Speech recognition failed");
                continue;
            }
        };
        if text.is_empty() {
            inner.handle_empty_transcription(level);
            continue;
        }
        events.debug(format!("Transcription: {text}"));

        let min_len = inner.config.reconstruction.min_transcription_length;
        if min_len > 0 && text.chars().count() < min_len {
            events.debug(format!(
                "Transcription too short ({} < {min_len}), skipping LLM to avoid spurious responses",
                text.chars().count()
            ));
            continue;
        }

        if !inner.speaker_filter.accept(&text, &chunk) {
            events.debug("Speaker filter: rejected");
            continue;
        }

        match inner.filter.lock().check(&text) {
            FilterDecision::Duplicate => {
                events.debug("Same transcription as last; skipping to avoid repeating response");
                continue;
            }
            FilterDecision::Echo => {
                events.debug("Transcription matches last spoken response (echo); skipping");
                continue;
            }
            FilterDecision::Accept => {}
        }

        // User started speaking again: abort any playing TTS so this turn
        // can be processed.
        inner.tts.stop().await;

        let recon = reconstruct(
            inner.llm.as_ref(),
            &inner.config.reconstruction,
            &text,
            &events,
        )
        .await;

        if inner.training_mode.load(Ordering::SeqCst) {
            let callback = inner.on_training_transcription.lock().clone();
            if let Some(callback) = callback {
                events.debug("Training mode: saving sentence as fact");
                callback(&text);
                inner.profile.invalidate_cache();
            }
            events.status(PipelineStatus::Listening);
            continue;
        }

        let Some(response) = inner.select_response(&text, &recon).await else {
            events.status(PipelineStatus::Listening);
            continue;
        };

        let interaction_id = match inner.history.insert_interaction(
            &text,
            &response,
            None,
            Some(&inner.session_id),
        ) {
            Ok(id) => {
                inner.profile.invalidate_cache();
                events.debug(format!("Saved interaction id={id}"));
                id
            }
            Err(e) => {
                error!(error = %e, "failed to save interaction");
                events.debug(format!("Error (save interaction): {e}"));
                events.error("Could not save to history");
                0
            }
        };

        events.response(response.clone(), interaction_id);
        inner.filter.lock().note_spoken(&response);
        match inner.tts.speak(&response).await {
            Ok(()) => events.debug("TTS: started speaking (speak again to abort and retry)"),
            Err(e) => {
                error!(error = %e, "TTS speak failed");
                events.debug(format!("Error (TTS): {e}"));
            }
        }
        // Do not wait for TTS; back to listening so the user can speak to
        // abort and retry.
        events.status(PipelineStatus::Listening);
    }

    events.debug("Pipeline stopped");
    inner.capture.stop();
    inner.stt.stop().await;
    inner.running.store(false, Ordering::SeqCst);
    inner.set_state(PipelineState::Stopped);
    events.status(PipelineStatus::Stopped);
}
