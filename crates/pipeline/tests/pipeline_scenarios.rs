//! End-to-end pipeline scenarios against scripted engines.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::timeout;

use talkie_audio::sensitivity::AutoSensitivityConfig;
use talkie_audio::ChunkQueue;
use talkie_core::{
    BrowseHandler, BrowseOutcome, LlmClient, PipelineEvent, Result as CoreResult, Retriever,
    SpeakerFilter, SttEngine, TtsEngine,
};
use talkie_persistence::{Database, HistoryRepo};
use talkie_pipeline::{
    Pipeline, PipelineConfig, PipelineDeps, PipelineState, ReconstructionConfig,
    NO_DOCUMENTS_MESSAGE,
};
use talkie_profile::LanguageProfile;

const CHUNK_SIZE: usize = 4;

struct ScriptedStt {
    replies: Mutex<VecDeque<String>>,
}

impl ScriptedStt {
    fn new(replies: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.iter().map(|s| s.to_string()).collect()),
        })
    }
}

#[async_trait]
impl SttEngine for ScriptedStt {
    async fn transcribe(&self, _audio: &[u8]) -> CoreResult<String> {
        Ok(self.replies.lock().pop_front().unwrap_or_default())
    }
}

struct ScriptedLlm {
    replies: Mutex<VecDeque<String>>,
    calls: Mutex<Vec<(String, Option<String>)>>,
}

impl ScriptedLlm {
    fn new(replies: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.iter().map(|s| s.to_string()).collect()),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn check_connection(&self, _timeout: Duration) -> bool {
        true
    }

    async fn generate(&self, prompt: &str, system: Option<&str>) -> String {
        self.calls
            .lock()
            .push((prompt.to_string(), system.map(|s| s.to_string())));
        self.replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| "COMPLETION".to_string())
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

#[derive(Default)]
struct RecordingTts {
    spoken: Mutex<Vec<String>>,
    stops: AtomicUsize,
}

#[async_trait]
impl TtsEngine for RecordingTts {
    async fn speak(&self, text: &str) -> CoreResult<()> {
        if !text.trim().is_empty() {
            self.spoken.lock().push(text.to_string());
        }
        Ok(())
    }

    async fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

struct AcceptAll;

impl SpeakerFilter for AcceptAll {
    fn accept(&self, _transcription: &str, _audio: &[u8]) -> bool {
        true
    }
}

struct EmptyRetriever;

#[async_trait]
impl Retriever for EmptyRetriever {
    async fn retrieve(&self, _query: &str, _top_k: usize) -> CoreResult<String> {
        Ok(String::new())
    }

    async fn has_documents(&self) -> bool {
        false
    }
}

struct Harness {
    pipeline: Pipeline,
    capture: Arc<ChunkQueue>,
    llm: Arc<ScriptedLlm>,
    tts: Arc<RecordingTts>,
    history: HistoryRepo,
    _dir: tempfile::TempDir,
}

fn reconstruction(certainty_threshold: u8) -> ReconstructionConfig {
    ReconstructionConfig {
        certainty_threshold,
        ..ReconstructionConfig::default()
    }
}

fn build(
    stt: Arc<ScriptedStt>,
    llm: Arc<ScriptedLlm>,
    config: PipelineConfig,
    retriever: Option<Arc<dyn Retriever>>,
    browse_handler: Option<Arc<dyn BrowseHandler>>,
) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(dir.path().join("talkie.db")).unwrap();
    let history = HistoryRepo::new(db);
    let profile = Arc::new(LanguageProfile::new(Box::new(history.clone()), None, None));
    let capture = Arc::new(ChunkQueue::new(CHUNK_SIZE, 16000));
    let tts = Arc::new(RecordingTts::default());
    let pipeline = Pipeline::new(PipelineDeps {
        config,
        capture: Arc::clone(&capture),
        stt,
        speaker_filter: Arc::new(AcceptAll),
        llm: llm.clone(),
        tts: tts.clone(),
        history: history.clone(),
        profile,
        retriever,
        browse_handler,
        auto_sensitivity: AutoSensitivityConfig::default(),
    });
    Harness {
        pipeline,
        capture,
        llm,
        tts,
        history,
        _dir: dir,
    }
}

async fn start_and_wait_running(harness: &Harness) {
    harness.pipeline.start();
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while harness.pipeline.state() != PipelineState::Running {
        assert!(std::time::Instant::now() < deadline, "pipeline never ran");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

fn feed_chunk(harness: &Harness) {
    harness.capture.put(&[100, 0, 100, 0]);
}

async fn next_response(
    rx: &mut tokio::sync::broadcast::Receiver<PipelineEvent>,
) -> (String, i64) {
    timeout(Duration::from_secs(5), async {
        loop {
            if let PipelineEvent::Response {
                text,
                interaction_id,
            } = rx.recv().await.unwrap()
            {
                return (text, interaction_id);
            }
        }
    })
    .await
    .expect("no response event")
}

/// Drain everything currently buffered on the receiver.
fn drain(rx: &mut tokio::sync::broadcast::Receiver<PipelineEvent>) -> Vec<PipelineEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Receive events until (and including) the next response.
async fn collect_until_response(
    rx: &mut tokio::sync::broadcast::Receiver<PipelineEvent>,
) -> Vec<PipelineEvent> {
    timeout(Duration::from_secs(5), async {
        let mut events = Vec::new();
        loop {
            let event = rx.recv().await.unwrap();
            let done = matches!(event, PipelineEvent::Response { .. });
            events.push(event);
            if done {
                return events;
            }
        }
    })
    .await
    .expect("no response event")
}

#[tokio::test]
async fn short_input_gate_skips_the_turn() {
    let stt = ScriptedStt::new(&["hi"]);
    let llm = ScriptedLlm::new(&[]);
    let config = PipelineConfig {
        reconstruction: ReconstructionConfig {
            min_transcription_length: 5,
            ..ReconstructionConfig::default()
        },
        ..PipelineConfig::default()
    };
    let harness = build(stt, llm, config, None, None);
    let mut rx = harness.pipeline.subscribe();

    start_and_wait_running(&harness).await;
    feed_chunk(&harness);
    tokio::time::sleep(Duration::from_millis(300)).await;
    harness.pipeline.stop().await;

    assert_eq!(harness.llm.call_count(), 0);
    let events = drain(&mut rx);
    assert!(!events
        .iter()
        .any(|e| matches!(e, PipelineEvent::Response { .. })));
    assert!(events.iter().any(|e| matches!(
        e,
        PipelineEvent::Debug { message } if message.contains("too short")
    )));
    assert!(harness.history.list_recent(10).unwrap().is_empty());
}

#[tokio::test]
async fn agreement_repeat_uses_one_llm_call() {
    let stt = ScriptedStt::new(&["I want water"]);
    let llm = ScriptedLlm::new(&[r#"{"sentence": "I want water.", "certainty": 95}"#]);
    let harness = build(stt, llm, PipelineConfig::default(), None, None);
    let mut rx = harness.pipeline.subscribe();

    start_and_wait_running(&harness).await;
    feed_chunk(&harness);
    let (text, id) = next_response(&mut rx).await;
    harness.pipeline.stop().await;

    assert_eq!(text, "I want water.");
    assert!(id > 0);
    assert_eq!(harness.llm.call_count(), 1);
    let rows = harness.history.list_recent(10).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].original_transcription, "I want water");
    assert_eq!(rows[0].llm_response, "I want water.");
    assert_eq!(harness.tts.spoken.lock().as_slice(), ["I want water."]);
}

#[tokio::test]
async fn reconstruction_above_threshold_is_the_response() {
    let stt = ScriptedStt::new(&["close window"]);
    let llm = ScriptedLlm::new(&[r#"{"sentence": "Please close the window.", "certainty": 80}"#]);
    let config = PipelineConfig {
        reconstruction: reconstruction(70),
        ..PipelineConfig::default()
    };
    let harness = build(stt, llm, config, None, None);
    let mut rx = harness.pipeline.subscribe();

    start_and_wait_running(&harness).await;
    feed_chunk(&harness);
    let (text, _) = next_response(&mut rx).await;
    harness.pipeline.stop().await;

    assert_eq!(text, "Please close the window.");
    assert_eq!(harness.llm.call_count(), 1);
}

#[tokio::test]
async fn reconstruction_below_threshold_runs_completion() {
    let stt = ScriptedStt::new(&["mumble"]);
    let llm = ScriptedLlm::new(&[
        r#"{"sentence": "Something unclear.", "certainty": 40}"#,
        "I need some rest.",
    ]);
    let config = PipelineConfig {
        reconstruction: reconstruction(70),
        ..PipelineConfig::default()
    };
    let harness = build(stt, llm, config, None, None);
    let mut rx = harness.pipeline.subscribe();

    start_and_wait_running(&harness).await;
    feed_chunk(&harness);
    let (text, _) = next_response(&mut rx).await;
    harness.pipeline.stop().await;

    assert_eq!(text, "I need some rest.");
    assert_eq!(harness.llm.call_count(), 2);
}

#[tokio::test]
async fn document_qa_empty_state_short_circuits() {
    let stt = ScriptedStt::new(&["what does my paper say"]);
    let llm = ScriptedLlm::new(&[]);
    let config = PipelineConfig {
        reconstruction: ReconstructionConfig {
            enabled: false,
            ..ReconstructionConfig::default()
        },
        ..PipelineConfig::default()
    };
    let harness = build(stt, llm, config, Some(Arc::new(EmptyRetriever)), None);
    harness.pipeline.set_document_qa_mode(true);
    let mut rx = harness.pipeline.subscribe();

    start_and_wait_running(&harness).await;
    feed_chunk(&harness);
    let (text, _) = next_response(&mut rx).await;
    harness.pipeline.stop().await;

    assert_eq!(text, NO_DOCUMENTS_MESSAGE);
    assert_eq!(harness.llm.call_count(), 0);
}

#[tokio::test]
async fn echo_of_spoken_response_is_dropped() {
    // First turn produces "I am cold."; the second turn is the speaker
    // echoing into the microphone.
    let stt = ScriptedStt::new(&["tell cold", "I am cold."]);
    let llm = ScriptedLlm::new(&[
        r#"{"sentence": "I am cold.", "certainty": 95}"#,
    ]);
    let harness = build(stt, llm, PipelineConfig::default(), None, None);
    let mut rx = harness.pipeline.subscribe();

    start_and_wait_running(&harness).await;
    feed_chunk(&harness);
    let (text, _) = next_response(&mut rx).await;
    assert_eq!(text, "I am cold.");

    feed_chunk(&harness);
    tokio::time::sleep(Duration::from_millis(300)).await;
    harness.pipeline.stop().await;

    let events = drain(&mut rx);
    assert!(!events
        .iter()
        .any(|e| matches!(e, PipelineEvent::Response { .. })));
    assert_eq!(harness.history.list_recent(10).unwrap().len(), 1);
    assert_eq!(harness.llm.call_count(), 1);
}

#[tokio::test]
async fn duplicate_transcription_yields_one_response() {
    let stt = ScriptedStt::new(&["I want water", "I want water"]);
    let llm = ScriptedLlm::new(&[
        r#"{"sentence": "I want water.", "certainty": 95}"#,
    ]);
    let harness = build(stt, llm, PipelineConfig::default(), None, None);
    let mut rx = harness.pipeline.subscribe();

    start_and_wait_running(&harness).await;
    feed_chunk(&harness);
    next_response(&mut rx).await;
    feed_chunk(&harness);
    tokio::time::sleep(Duration::from_millis(300)).await;
    harness.pipeline.stop().await;

    assert_eq!(harness.history.list_recent(10).unwrap().len(), 1);
}

#[tokio::test]
async fn new_speech_aborts_playing_tts_before_responding() {
    let stt = ScriptedStt::new(&["first thing", "second thing"]);
    let llm = ScriptedLlm::new(&[
        r#"{"sentence": "The first thing.", "certainty": 95}"#,
        r#"{"sentence": "The second thing.", "certainty": 95}"#,
    ]);
    let harness = build(stt, llm, PipelineConfig::default(), None, None);
    let mut rx = harness.pipeline.subscribe();

    start_and_wait_running(&harness).await;
    feed_chunk(&harness);
    next_response(&mut rx).await;
    let stops_after_first = harness.tts.stops.load(Ordering::SeqCst);
    feed_chunk(&harness);
    next_response(&mut rx).await;
    harness.pipeline.stop().await;

    assert!(harness.tts.stops.load(Ordering::SeqCst) > stops_after_first);
    assert_eq!(harness.tts.spoken.lock().len(), 2);
}

#[tokio::test]
async fn training_mode_forwards_without_llm_or_persistence() {
    let stt = ScriptedStt::new(&["Star is my dog"]);
    let llm = ScriptedLlm::new(&[r#"{"sentence": "Star is my dog.", "certainty": 95}"#]);
    let harness = build(stt, llm, PipelineConfig::default(), None, None);
    let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    harness.pipeline.set_training_mode(true);
    harness
        .pipeline
        .set_on_training_transcription(Some(Arc::new(move |text: &str| {
            sink.lock().push(text.to_string());
        })));
    let mut rx = harness.pipeline.subscribe();

    start_and_wait_running(&harness).await;
    feed_chunk(&harness);
    tokio::time::sleep(Duration::from_millis(500)).await;
    harness.pipeline.stop().await;

    assert_eq!(seen.lock().as_slice(), ["Star is my dog"]);
    assert!(harness.history.list_recent(10).unwrap().is_empty());
    let events = drain(&mut rx);
    assert!(!events
        .iter()
        .any(|e| matches!(e, PipelineEvent::Response { .. })));
}

struct ScriptedBrowseHandler {
    outcome: BrowseOutcome,
}

#[async_trait]
impl BrowseHandler for ScriptedBrowseHandler {
    async fn handle(&self, _utterance: &str) -> Option<BrowseOutcome> {
        Some(self.outcome.clone())
    }
}

#[tokio::test]
async fn browse_outcome_is_applied_and_spoken() {
    let stt = ScriptedStt::new(&["search cats"]);
    let llm = ScriptedLlm::new(&[r#"{"sentence": "Search cats.", "certainty": 95}"#]);
    let handler = Arc::new(ScriptedBrowseHandler {
        outcome: BrowseOutcome {
            message: Some("Opened the results for cats.".to_string()),
            open_url: Some("https://example.com/search?q=cats".to_string()),
            set_selection: Some(Some("CNN breaking news".to_string())),
            ..BrowseOutcome::default()
        },
    });
    let harness = build(stt, llm, PipelineConfig::default(), None, Some(handler));
    harness.pipeline.set_browse_mode(true);
    let mut rx = harness.pipeline.subscribe();

    start_and_wait_running(&harness).await;
    feed_chunk(&harness);
    let events = collect_until_response(&mut rx).await;
    harness.pipeline.stop().await;

    let (text, id) = events
        .iter()
        .find_map(|e| match e {
            PipelineEvent::Response {
                text,
                interaction_id,
            } => Some((text.clone(), *interaction_id)),
            _ => None,
        })
        .unwrap();
    assert_eq!(text, "Opened the results for cats.");
    assert!(id > 0);
    assert!(events.iter().any(|e| {
        matches!(e, PipelineEvent::OpenUrl { url } if url.contains("q=cats"))
    }));
    assert_eq!(
        harness.pipeline.browse_selection().as_deref(),
        Some("CNN breaking news")
    );
    assert_eq!(harness.history.list_recent(1).unwrap().len(), 1);
    assert_eq!(
        harness.tts.spoken.lock().as_slice(),
        ["Opened the results for cats."]
    );
}

#[tokio::test]
async fn quiet_empty_transcription_raises_sensitivity() {
    let stt = ScriptedStt::new(&[""]);
    let llm = ScriptedLlm::new(&[]);
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(dir.path().join("talkie.db")).unwrap();
    let history = HistoryRepo::new(db);
    let profile = Arc::new(LanguageProfile::new(Box::new(history.clone()), None, None));
    let capture = Arc::new(ChunkQueue::new(CHUNK_SIZE, 16000));
    let pipeline = Pipeline::new(PipelineDeps {
        config: PipelineConfig::default(),
        capture: Arc::clone(&capture),
        stt,
        speaker_filter: Arc::new(AcceptAll),
        llm,
        tts: Arc::new(RecordingTts::default()),
        history,
        profile,
        retriever: None,
        browse_handler: None,
        auto_sensitivity: AutoSensitivityConfig {
            enabled: true,
            ..AutoSensitivityConfig::default()
        },
    });
    pipeline.set_sensitivity(2.0);
    let mut rx = pipeline.subscribe();

    pipeline.start();
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while pipeline.state() != PipelineState::Running {
        assert!(std::time::Instant::now() < deadline);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let sample = 1000i16.to_le_bytes();
    capture.put(&[sample[0], sample[1], sample[0], sample[1]]);
    let raised = timeout(Duration::from_secs(5), async {
        loop {
            if let PipelineEvent::Sensitivity { value } = rx.recv().await.unwrap() {
                return value;
            }
        }
    })
    .await
    .expect("no sensitivity event");
    pipeline.stop().await;

    assert_eq!(raised, 2.25);
    assert_eq!(pipeline.get_sensitivity(), 2.25);
}

#[tokio::test]
async fn stop_wakes_an_idle_pipeline_promptly() {
    let stt = ScriptedStt::new(&[]);
    let llm = ScriptedLlm::new(&[]);
    let harness = build(stt, llm, PipelineConfig::default(), None, None);

    start_and_wait_running(&harness).await;
    let begin = std::time::Instant::now();
    harness.pipeline.stop().await;
    assert!(begin.elapsed() < Duration::from_secs(2));
    assert_eq!(harness.pipeline.state(), PipelineState::Stopped);
}

#[tokio::test]
async fn events_for_a_turn_arrive_in_order() {
    let stt = ScriptedStt::new(&["I want water"]);
    let llm = ScriptedLlm::new(&[r#"{"sentence": "I want water.", "certainty": 95}"#]);
    let harness = build(stt, llm, PipelineConfig::default(), None, None);
    let mut rx = harness.pipeline.subscribe();

    start_and_wait_running(&harness).await;
    feed_chunk(&harness);
    let events = collect_until_response(&mut rx).await;
    harness.pipeline.stop().await;

    let status_pos = |wanted: &str| {
        events.iter().position(|e| {
            matches!(e, PipelineEvent::Status { value } if format!("{value:?}").contains(wanted))
        })
    };
    let listening = status_pos("Listening").expect("no Listening status");
    let transcribing = status_pos("Transcribing").expect("no Transcribing status");
    let responding = status_pos("Responding").expect("no Responding status");
    let volume = events
        .iter()
        .position(|e| matches!(e, PipelineEvent::Volume { .. }))
        .expect("no volume event");
    let response = events.len() - 1;
    assert!(listening < transcribing);
    assert!(transcribing < responding);
    assert!(responding < response);
    assert!(volume < transcribing);
    assert!(matches!(events[response], PipelineEvent::Response { .. }));
}

#[tokio::test]
async fn persistence_failure_emits_response_with_id_zero() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("talkie.db");
    let db = Database::open(&db_path).unwrap();
    let history = HistoryRepo::new(db);
    let profile = Arc::new(LanguageProfile::new(Box::new(history.clone()), None, None));
    let capture = Arc::new(ChunkQueue::new(CHUNK_SIZE, 16000));
    let llm = ScriptedLlm::new(&[r#"{"sentence": "I want water.", "certainty": 95}"#]);
    let pipeline = Pipeline::new(PipelineDeps {
        config: PipelineConfig::default(),
        capture: Arc::clone(&capture),
        stt: ScriptedStt::new(&["I want water"]),
        speaker_filter: Arc::new(AcceptAll),
        llm,
        tts: Arc::new(RecordingTts::default()),
        history,
        profile,
        retriever: None,
        browse_handler: None,
        auto_sensitivity: AutoSensitivityConfig::default(),
    });
    let mut rx = pipeline.subscribe();

    pipeline.start();
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while pipeline.state() != PipelineState::Running {
        assert!(std::time::Instant::now() < deadline);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    // Break the store out from under the pipeline: fresh connections now
    // see a database without tables.
    std::fs::remove_file(&db_path).unwrap();
    capture.put(&[100, 0, 100, 0]);
    let (text, id) = next_response(&mut rx).await;
    pipeline.stop().await;

    assert_eq!(text, "I want water.");
    assert_eq!(id, 0);
    let events = drain(&mut rx);
    assert!(events.iter().any(|e| matches!(
        e,
        PipelineEvent::Error { message } if message.contains("save")
    )));
}
