//! User settings key-value store.

use rusqlite::params;

use crate::database::Database;
use crate::Result;

/// Keys the runtime reads and writes. Unknown keys are stored as-is.
pub mod keys {
    pub const USER_CONTEXT: &str = "user_context";
    pub const PREFERRED_NAME: &str = "preferred_name";
    pub const PRONOUNS: &str = "pronouns";
    pub const TTS_VOICE: &str = "tts_voice";
    pub const TTS_RATE: &str = "tts_rate";
    pub const RESPONSE_STYLE: &str = "response_style";
    pub const RESPONSE_LENGTH: &str = "response_length";
    pub const CALIBRATION_SENSITIVITY: &str = "calibration_sensitivity";
    pub const CALIBRATION_CHUNK_DURATION_SEC: &str = "calibration_chunk_duration_sec";
    pub const CALIBRATION_MIN_TRANSCRIPTION_LENGTH: &str = "calibration_min_transcription_length";
    pub const CALIBRATION_VOICE_PROFILE_THRESHOLD: &str = "calibration_voice_profile_threshold";
}

/// Default cap on stored user context; deployments override it from config.
pub const USER_CONTEXT_MAX_CHARS: usize = 2000;

/// Read/write the `user_settings` table. `get` returns `None` for a missing
/// key; mutations raise on database errors so callers can surface them.
#[derive(Clone)]
pub struct SettingsRepo {
    db: Database,
    user_context_max_chars: usize,
}

impl SettingsRepo {
    pub fn new(db: Database) -> Self {
        Self::with_user_context_cap(db, USER_CONTEXT_MAX_CHARS)
    }

    pub fn with_user_context_cap(db: Database, user_context_max_chars: usize) -> Self {
        Self {
            db,
            user_context_max_chars,
        }
    }

    fn capped<'a>(&self, key: &str, value: &'a str) -> &'a str {
        if key == keys::USER_CONTEXT && value.len() > self.user_context_max_chars {
            let mut cut = self.user_context_max_chars;
            while !value.is_char_boundary(cut) {
                cut -= 1;
            }
            &value[..cut]
        } else {
            value
        }
    }

    /// Value for `key`, or `None` when absent.
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.db.connect()?;
        let mut stmt = conn.prepare("SELECT value FROM user_settings WHERE key = ?1")?;
        let mut rows = stmt.query([key])?;
        match rows.next()? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    /// Values for several keys; missing keys map to `None`.
    pub fn get_many(&self, keys: &[&str]) -> Result<Vec<(String, Option<String>)>> {
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            out.push(((*key).to_string(), self.get(key)?));
        }
        Ok(out)
    }

    /// Store `value` under `key`, upserting. User context is truncated to
    /// the configured cap.
    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.db.connect()?;
        conn.execute(
            "INSERT INTO user_settings (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, self.capped(key, value)],
        )?;
        Ok(())
    }

    /// Store several pairs in one transaction; rolls back on failure.
    pub fn set_many(&self, pairs: &[(&str, &str)]) -> Result<()> {
        if pairs.is_empty() {
            return Ok(());
        }
        let mut conn = self.db.connect()?;
        let tx = conn.transaction()?;
        for (key, value) in pairs {
            tx.execute(
                "INSERT INTO user_settings (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![key, self.capped(key, value)],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Remove `key`. No-op when absent.
    pub fn delete(&self, key: &str) -> Result<()> {
        self.db
            .connect()?
            .execute("DELETE FROM user_settings WHERE key = ?1", [key])?;
        Ok(())
    }

    /// Remove several keys in one transaction.
    pub fn delete_many(&self, keys: &[&str]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut conn = self.db.connect()?;
        let tx = conn.transaction()?;
        for key in keys {
            tx.execute("DELETE FROM user_settings WHERE key = ?1", [key])?;
        }
        tx.commit()?;
        Ok(())
    }
}
