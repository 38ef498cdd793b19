//! Curation of the interaction history
//!
//! One pass groups similar phrases by pattern key, assigns each row a
//! weight from recurrence and correction signals, optionally excludes rows
//! with empty transcriptions, and optionally deletes rows past a retention
//! cutoff. Heavier rows are preferred by the profile builder and by the
//! fine-tuning export. A background loop reruns the pass on an interval.

pub mod curator;
pub mod export;
pub mod scheduler;

pub use curator::{run_curation, CurationCounts, CuratorConfig};
pub use export::{export_for_finetuning, ExportOptions};
pub use scheduler::spawn_scheduler;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CurationError {
    #[error(transparent)]
    Persistence(#[from] talkie_persistence::PersistenceError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CurationError>;
