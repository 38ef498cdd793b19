//! Pipeline events and the observer fan-out
//!
//! The worker task publishes state through a bounded broadcast channel.
//! Delivery is best-effort: subscribers receive events in FIFO order, and a
//! subscriber that falls behind loses the oldest events rather than blocking
//! the worker.

use serde::Serialize;
use tokio::sync::broadcast;

/// Events emitted per subscriber, default channel depth.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Coarse pipeline state as shown to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    Stopped,
    Starting,
    Listening,
    Transcribing,
    Responding,
}

impl std::fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PipelineStatus::Stopped => "Stopped",
            PipelineStatus::Starting => "Starting...",
            PipelineStatus::Listening => "Listening...",
            PipelineStatus::Transcribing => "Transcribing...",
            PipelineStatus::Responding => "Responding...",
        };
        f.write_str(s)
    }
}

/// Events published by the pipeline worker.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    Status { value: PipelineStatus },
    /// Final response text with the persisted interaction id (0 when the
    /// row could not be saved).
    Response { text: String, interaction_id: i64 },
    Error { message: String },
    Debug { message: String },
    /// Normalized chunk RMS in [0, 1].
    Volume { value: f32 },
    /// Auto-sensitivity raised the capture gain.
    Sensitivity { value: f32 },
    /// Ask the user's client to open a URL (browse actions run client-side).
    OpenUrl { url: String },
    Quit,
    CloseQuitModal,
}

/// Fan-out handle shared by the worker and its observers.
///
/// Cloneable; `subscribe` may be called any number of times. Emission never
/// blocks and never fails into the worker; an event with no listeners is
/// simply dropped.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PipelineEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: PipelineEvent) {
        let _ = self.tx.send(event);
    }

    pub fn status(&self, value: PipelineStatus) {
        self.emit(PipelineEvent::Status { value });
    }

    pub fn response(&self, text: impl Into<String>, interaction_id: i64) {
        self.emit(PipelineEvent::Response {
            text: text.into(),
            interaction_id,
        });
    }

    pub fn error(&self, message: impl Into<String>) {
        self.emit(PipelineEvent::Error {
            message: message.into(),
        });
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.emit(PipelineEvent::Debug {
            message: message.into(),
        });
    }

    pub fn volume(&self, value: f32) {
        self.emit(PipelineEvent::Volume { value });
    }

    pub fn sensitivity(&self, value: f32) {
        self.emit(PipelineEvent::Sensitivity { value });
    }

    pub fn open_url(&self, url: impl Into<String>) {
        self.emit(PipelineEvent::OpenUrl { url: url.into() });
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
