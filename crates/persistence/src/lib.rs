//! SQLite persistence for the Talkie runtime
//!
//! One relational store holds interactions, the user-settings key-value
//! table, and training facts. Every operation runs on its own connection
//! with WAL journaling and a 5 s busy timeout; batched mutations share one
//! transaction that rolls back on any error. Migrations are idempotent and
//! safe to run on every startup.

pub mod database;
pub mod error;
pub mod history;
pub mod schema;
pub mod settings;
pub mod training;

pub use database::Database;
pub use error::{PersistenceError, Result};
pub use history::{HistoryRepo, InteractionRecord};
pub use settings::{keys, SettingsRepo};
pub use training::{TrainingFact, TrainingRepo};
