//! Training facts: context sentences spoken in training mode
//! (e.g. "Star is my dog").

use rusqlite::params;

use crate::database::{now_iso, Database};
use crate::{PersistenceError, Result};

/// Max facts handed to the profile builder; oldest drop out first.
pub const TRAINING_FACTS_PROFILE_LIMIT: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainingFact {
    pub id: i64,
    pub text: String,
    pub created_at: String,
}

/// Read/write the `training_facts` table.
#[derive(Clone)]
pub struct TrainingRepo {
    db: Database,
}

impl TrainingRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert a fact; returns its id. Empty text after trimming is
    /// rejected.
    pub fn add(&self, text: &str) -> Result<i64> {
        let text = text.trim();
        if text.is_empty() {
            return Err(PersistenceError::InvalidInput(
                "training fact text cannot be empty".to_string(),
            ));
        }
        let conn = self.db.connect()?;
        conn.execute(
            "INSERT INTO training_facts (text, created_at) VALUES (?1, ?2)",
            params![text, now_iso()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// All facts, oldest first.
    pub fn list_all(&self) -> Result<Vec<TrainingFact>> {
        let conn = self.db.connect()?;
        let mut stmt = conn
            .prepare("SELECT id, text, created_at FROM training_facts ORDER BY created_at ASC")?;
        let rows = stmt.query_map([], |row| {
            Ok(TrainingFact {
                id: row.get(0)?,
                text: row.get(1)?,
                created_at: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn delete(&self, fact_id: i64) -> Result<()> {
        self.db
            .connect()?
            .execute("DELETE FROM training_facts WHERE id = ?1", [fact_id])?;
        Ok(())
    }

    /// The most recent `limit` fact texts, newest first.
    pub fn get_for_profile(&self, limit: usize) -> Result<Vec<String>> {
        let conn = self.db.connect()?;
        let mut stmt =
            conn.prepare("SELECT text FROM training_facts ORDER BY created_at DESC LIMIT ?1")?;
        let rows = stmt.query_map([limit as i64], |row| row.get(0))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> (tempfile::TempDir, TrainingRepo) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path().join("talkie.db")).unwrap();
        (dir, TrainingRepo::new(db))
    }

    #[test]
    fn add_trims_and_round_trips() {
        let (_dir, repo) = repo();
        let id = repo.add("  Star is my dog  ").unwrap();
        let facts = repo.list_all().unwrap();
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].id, id);
        assert_eq!(facts[0].text, "Star is my dog");
    }

    #[test]
    fn empty_fact_is_rejected() {
        let (_dir, repo) = repo();
        assert!(matches!(
            repo.add("   "),
            Err(PersistenceError::InvalidInput(_))
        ));
    }

    #[test]
    fn profile_listing_is_newest_first_and_capped() {
        let (_dir, repo) = repo();
        for i in 0..5 {
            repo.add(&format!("fact {i}")).unwrap();
            std::thread::sleep(std::time::Duration::from_millis(2));
        }
        let facts = repo.get_for_profile(3).unwrap();
        assert_eq!(facts, vec!["fact 4", "fact 3", "fact 2"]);
    }

    #[test]
    fn delete_removes_the_fact() {
        let (_dir, repo) = repo();
        let id = repo.add("gone soon").unwrap();
        repo.delete(id).unwrap();
        assert!(repo.list_all().unwrap().is_empty());
    }
}
