//! Schema and idempotent migrations.
//!
//! The schema script is re-runnable (`CREATE TABLE IF NOT EXISTS`), and the
//! migrations add columns only when missing, so older database files are
//! upgraded in place on startup.

use rusqlite::Connection;
use tracing::debug;

use crate::Result;

pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS interactions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    created_at TEXT NOT NULL,
    original_transcription TEXT NOT NULL,
    llm_response TEXT NOT NULL,
    corrected_response TEXT,
    exclude_from_profile INTEGER NOT NULL DEFAULT 0,
    weight REAL,
    speaker_id TEXT,
    session_id TEXT
);

CREATE TABLE IF NOT EXISTS user_settings (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS training_facts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    text TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_interactions_created_at ON interactions(created_at);
"#;

pub fn apply_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;
    run_migrations(conn)?;
    Ok(())
}

fn has_column(conn: &Connection, table: &str, column: &str) -> Result<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Upgrade databases created before `exclude_from_profile` and `weight`
/// existed. Re-running on a current schema is a no-op.
fn run_migrations(conn: &Connection) -> Result<()> {
    if !has_column(conn, "interactions", "exclude_from_profile")? {
        conn.execute(
            "ALTER TABLE interactions ADD COLUMN exclude_from_profile INTEGER NOT NULL DEFAULT 0",
            [],
        )?;
        debug!("added exclude_from_profile to interactions");
    }
    if !has_column(conn, "interactions", "weight")? {
        conn.execute("ALTER TABLE interactions ADD COLUMN weight REAL", [])?;
        debug!("added weight to interactions");
    }
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_interactions_weight ON interactions(weight) WHERE weight IS NOT NULL",
        [],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema_dump(conn: &Connection) -> Vec<String> {
        let mut stmt = conn
            .prepare("SELECT COALESCE(sql, '') FROM sqlite_master ORDER BY type, name")
            .unwrap();
        stmt.query_map([], |row| row.get::<_, String>(0))
            .unwrap()
            .map(|r| r.unwrap())
            .collect()
    }

    #[test]
    fn applying_schema_twice_is_a_noop() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).unwrap();
        let first = schema_dump(&conn);
        apply_schema(&conn).unwrap();
        assert_eq!(first, schema_dump(&conn));
    }

    #[test]
    fn legacy_table_gains_missing_columns() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE interactions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                created_at TEXT NOT NULL,
                original_transcription TEXT NOT NULL,
                llm_response TEXT NOT NULL,
                corrected_response TEXT,
                speaker_id TEXT,
                session_id TEXT
            );",
        )
        .unwrap();
        apply_schema(&conn).unwrap();
        assert!(has_column(&conn, "interactions", "exclude_from_profile").unwrap());
        assert!(has_column(&conn, "interactions", "weight").unwrap());
        // Second run leaves the upgraded schema untouched.
        let dump = schema_dump(&conn);
        apply_schema(&conn).unwrap();
        assert_eq!(dump, schema_dump(&conn));
    }
}
