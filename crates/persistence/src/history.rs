//! Interaction history: inserts, corrections, profile queries, curation
//! support.

use rusqlite::{params, Connection, Row};
use tracing::error;

use crate::database::{now_iso, Database};
use crate::Result;

/// Max stored length for transcription and response text, to bound database
/// growth.
pub const MAX_TEXT_LENGTH: usize = 65_536;
pub const TRUNCATED_SUFFIX: &str = " [truncated]";

/// One persisted interaction.
#[derive(Debug, Clone, PartialEq)]
pub struct InteractionRecord {
    pub id: i64,
    pub created_at: String,
    pub original_transcription: String,
    pub llm_response: String,
    pub corrected_response: Option<String>,
    pub exclude_from_profile: bool,
    pub weight: Option<f64>,
    pub speaker_id: Option<String>,
    pub session_id: Option<String>,
}

impl InteractionRecord {
    /// The correction when present, otherwise the raw model response.
    pub fn preferred_response(&self) -> &str {
        match self.corrected_response.as_deref() {
            Some(c) if !c.trim().is_empty() => c,
            _ => &self.llm_response,
        }
    }
}

fn truncate_for_storage(text: &str) -> String {
    if text.len() <= MAX_TEXT_LENGTH {
        return text.to_string();
    }
    let mut cut = MAX_TEXT_LENGTH - TRUNCATED_SUFFIX.len();
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}{}", &text[..cut], TRUNCATED_SUFFIX)
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<InteractionRecord> {
    Ok(InteractionRecord {
        id: row.get(0)?,
        created_at: row.get(1)?,
        original_transcription: row.get(2)?,
        llm_response: row.get(3)?,
        corrected_response: row.get(4)?,
        exclude_from_profile: row.get::<_, i64>(5)? != 0,
        weight: row.get(6)?,
        speaker_id: row.get(7)?,
        session_id: row.get(8)?,
    })
}

const SELECT_COLUMNS: &str = "id, created_at, original_transcription, llm_response, \
     corrected_response, COALESCE(exclude_from_profile, 0), weight, speaker_id, session_id";

/// Insert and query interactions; update corrections and curation fields.
#[derive(Clone)]
pub struct HistoryRepo {
    db: Database,
}

impl HistoryRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    fn conn(&self) -> Result<Connection> {
        self.db.connect()
    }

    /// Insert one interaction; returns the new row id.
    pub fn insert_interaction(
        &self,
        original_transcription: &str,
        llm_response: &str,
        speaker_id: Option<&str>,
        session_id: Option<&str>,
    ) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO interactions (created_at, original_transcription, llm_response, speaker_id, session_id)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                now_iso(),
                truncate_for_storage(original_transcription),
                truncate_for_storage(llm_response),
                speaker_id,
                session_id,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Store a user/caregiver edit of the response.
    pub fn update_correction(&self, interaction_id: i64, corrected_response: &str) -> Result<()> {
        self.conn()?.execute(
            "UPDATE interactions SET corrected_response = ?1 WHERE id = ?2",
            params![corrected_response, interaction_id],
        )?;
        Ok(())
    }

    /// Most recent interactions, newest first.
    pub fn list_recent(&self, limit: usize) -> Result<Vec<InteractionRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SELECT_COLUMNS} FROM interactions ORDER BY created_at DESC LIMIT ?1"
        ))?;
        let rows = stmt.query_map([limit as i64], row_to_record)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// `(llm_response, corrected_response)` pairs with a correction, not
    /// excluded from the profile, heaviest first.
    pub fn get_corrections_for_profile(&self, limit: usize) -> Result<Vec<(String, String)>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT llm_response, corrected_response FROM interactions
             WHERE corrected_response IS NOT NULL AND corrected_response != ''
               AND (exclude_from_profile = 0 OR exclude_from_profile IS NULL)
             ORDER BY COALESCE(weight, 0) DESC, created_at DESC
             LIMIT ?1",
        )?;
        let rows = stmt.query_map([limit as i64], |row| Ok((row.get(0)?, row.get(1)?)))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// `(original_transcription, llm_response)` pairs accepted as-is (no
    /// correction), not excluded from the profile, heaviest first.
    pub fn get_accepted_for_profile(&self, limit: usize) -> Result<Vec<(String, String)>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT original_transcription, llm_response FROM interactions
             WHERE corrected_response IS NULL
               AND (exclude_from_profile = 0 OR exclude_from_profile IS NULL)
             ORDER BY COALESCE(weight, 0) DESC, created_at DESC
             LIMIT ?1",
        )?;
        let rows = stmt.query_map([limit as i64], |row| Ok((row.get(0)?, row.get(1)?)))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn update_exclude_from_profile(&self, interaction_id: i64, exclude: bool) -> Result<()> {
        self.conn()?.execute(
            "UPDATE interactions SET exclude_from_profile = ?1 WHERE id = ?2",
            params![exclude as i64, interaction_id],
        )?;
        Ok(())
    }

    /// Interactions for the curation pass, oldest first.
    pub fn list_for_curation(&self, limit: usize) -> Result<Vec<InteractionRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SELECT_COLUMNS} FROM interactions ORDER BY created_at ASC LIMIT ?1"
        ))?;
        let rows = stmt.query_map([limit as i64], row_to_record)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Set weights for many interactions in one transaction.
    pub fn update_weights_batch(&self, updates: &[(i64, f64)]) -> Result<()> {
        if updates.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        for (id, weight) in updates {
            tx.execute(
                "UPDATE interactions SET weight = ?1 WHERE id = ?2",
                params![weight, id],
            )?;
        }
        tx.commit().map_err(|e| {
            error!(error = %e, "weight batch commit failed");
            e
        })?;
        Ok(())
    }

    /// Set the exclusion flag for many interactions in one transaction.
    pub fn set_exclude_batch(&self, interaction_ids: &[i64], exclude: bool) -> Result<()> {
        if interaction_ids.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        for id in interaction_ids {
            tx.execute(
                "UPDATE interactions SET exclude_from_profile = ?1 WHERE id = ?2",
                params![exclude as i64, id],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn list_ids_older_than(&self, created_before_iso: &str) -> Result<Vec<i64>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT id FROM interactions WHERE created_at < ?1")?;
        let rows = stmt.query_map([created_before_iso], |row| row.get(0))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Delete interactions by id. Returns the number deleted.
    pub fn delete_interactions(&self, interaction_ids: &[i64]) -> Result<usize> {
        if interaction_ids.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut deleted = 0;
        for id in interaction_ids {
            deleted += tx.execute("DELETE FROM interactions WHERE id = ?1", [id])?;
        }
        tx.commit()?;
        Ok(deleted)
    }

    /// Delete the whole history. Returns the number deleted.
    pub fn delete_all(&self) -> Result<usize> {
        Ok(self.conn()?.execute("DELETE FROM interactions", [])?)
    }
}
