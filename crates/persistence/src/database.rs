//! Connection management.
//!
//! Repositories share a [`Database`] handle and open a fresh connection per
//! operation; WAL journaling and the busy timeout are applied to every
//! connection so concurrent readers and the single writer coexist.

use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use rusqlite::Connection;
use tracing::info;

use crate::schema;
use crate::Result;

const BUSY_TIMEOUT_MS: u32 = 5000;

/// Handle to the store on disk. Cheap to clone.
#[derive(Clone)]
pub struct Database {
    path: PathBuf,
}

impl Database {
    /// Create the database file if needed and apply schema + migrations.
    /// Idempotent; safe to call on every startup.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let db = Self { path };
        let conn = db.connect()?;
        schema::apply_schema(&conn)?;
        info!(path = %db.path.display(), "schema applied");
        Ok(db)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// New connection with WAL and busy timeout applied.
    pub fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.busy_timeout(std::time::Duration::from_millis(BUSY_TIMEOUT_MS as u64))?;
        Ok(conn)
    }
}

/// Current UTC time as ISO-8601, microsecond precision. Lexicographic order
/// matches chronological order, which the cutoff queries rely on.
pub(crate) fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_creates_file_and_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/data/talkie.db");
        let db = Database::open(&path).unwrap();
        assert!(path.exists());
        // Reopening an existing store works.
        drop(db);
        Database::open(&path).unwrap();
    }

    #[test]
    fn connections_use_wal() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path().join("talkie.db")).unwrap();
        let conn = db.connect().unwrap();
        let mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
    }

    #[test]
    fn now_iso_is_sortable() {
        let a = now_iso();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = now_iso();
        assert!(a < b);
    }
}
