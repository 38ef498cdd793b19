//! One curation pass: pattern recognition and weight assignment.

use std::collections::HashMap;

use chrono::{Duration as ChronoDuration, SecondsFormat, Utc};
use tracing::{debug, info};

use talkie_core::text::pattern_key;
use talkie_persistence::HistoryRepo;

use crate::Result;

#[derive(Debug, Clone)]
pub struct CuratorConfig {
    pub min_weight: f64,
    pub max_weight: f64,
    /// Added when the row carries a correction.
    pub correction_weight_bump: f64,
    /// Added per extra occurrence of the row's response/transcription
    /// pattern.
    pub pattern_count_weight_scale: f64,
    /// Mark rows with a blank transcription as excluded from the profile.
    pub exclude_empty_transcription: bool,
    /// When set and positive, delete rows older than this many days.
    pub delete_older_than_days: Option<u32>,
    pub max_interactions_to_curate: usize,
}

impl Default for CuratorConfig {
    fn default() -> Self {
        Self {
            min_weight: 0.0,
            max_weight: 10.0,
            correction_weight_bump: 1.5,
            pattern_count_weight_scale: 0.5,
            exclude_empty_transcription: true,
            delete_older_than_days: None,
            max_interactions_to_curate: 10_000,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CurationCounts {
    pub weights_updated: usize,
    pub excluded: usize,
    pub deleted: usize,
}

/// Run one pass: compute weights from recurrence, commit updates in
/// batches, optionally exclude and delete. Returns the counts.
pub fn run_curation(history: &HistoryRepo, config: &CuratorConfig) -> Result<CurationCounts> {
    let mut counts = CurationCounts::default();

    let rows = history.list_for_curation(config.max_interactions_to_curate)?;
    if rows.is_empty() {
        debug!("curator: no interactions to curate");
        return Ok(counts);
    }

    // Recurrence over the text the profile cares about: correction when
    // present, else the raw response; and the transcription.
    let mut response_counts: HashMap<String, usize> = HashMap::new();
    let mut transcription_counts: HashMap<String, usize> = HashMap::new();
    for row in &rows {
        let response = row.preferred_response().trim();
        if !response.is_empty() {
            *response_counts.entry(pattern_key(response)).or_default() += 1;
        }
        let original = row.original_transcription.trim();
        if !original.is_empty() {
            *transcription_counts.entry(pattern_key(original)).or_default() += 1;
        }
    }

    let mut weight_updates: Vec<(i64, f64)> = Vec::new();
    let mut to_exclude: Vec<i64> = Vec::new();

    for row in &rows {
        let original = row.original_transcription.trim();
        if config.exclude_empty_transcription && original.is_empty() {
            to_exclude.push(row.id);
            continue;
        }

        let mut weight = 1.0;
        if row
            .corrected_response
            .as_deref()
            .is_some_and(|c| !c.trim().is_empty())
        {
            weight += config.correction_weight_bump;
        }
        let response_count = response_counts
            .get(&pattern_key(row.preferred_response().trim()))
            .copied()
            .unwrap_or(0);
        let transcription_count = transcription_counts
            .get(&pattern_key(original))
            .copied()
            .unwrap_or(0);
        weight += response_count.saturating_sub(1) as f64 * config.pattern_count_weight_scale;
        weight += transcription_count.saturating_sub(1) as f64 * config.pattern_count_weight_scale;
        weight = weight.clamp(config.min_weight, config.max_weight);

        weight_updates.push((row.id, weight));
    }

    if !weight_updates.is_empty() {
        history.update_weights_batch(&weight_updates)?;
        counts.weights_updated = weight_updates.len();
    }
    if !to_exclude.is_empty() {
        history.set_exclude_batch(&to_exclude, true)?;
        counts.excluded = to_exclude.len();
    }

    if let Some(days) = config.delete_older_than_days.filter(|d| *d > 0) {
        let cutoff = (Utc::now() - ChronoDuration::days(i64::from(days)))
            .to_rfc3339_opts(SecondsFormat::Micros, true);
        let old_ids = history.list_ids_older_than(&cutoff)?;
        if !old_ids.is_empty() {
            counts.deleted = history.delete_interactions(&old_ids)?;
            info!(deleted = counts.deleted, days, "curator removed old interactions");
        }
    }

    info!(
        weights_updated = counts.weights_updated,
        excluded = counts.excluded,
        deleted = counts.deleted,
        "curation pass finished"
    );
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use talkie_persistence::Database;

    fn repo() -> (tempfile::TempDir, HistoryRepo) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path().join("talkie.db")).unwrap();
        (dir, HistoryRepo::new(db))
    }

    #[test]
    fn empty_history_returns_zero_counts() {
        let (_dir, history) = repo();
        let counts = run_curation(&history, &CuratorConfig::default()).unwrap();
        assert_eq!(counts, CurationCounts::default());
    }

    #[test]
    fn base_weight_is_one() {
        let (_dir, history) = repo();
        history.insert_interaction("water", "I want water.", None, None).unwrap();
        run_curation(&history, &CuratorConfig::default()).unwrap();
        let row = &history.list_recent(1).unwrap()[0];
        assert_eq!(row.weight, Some(1.0));
    }

    #[test]
    fn corrections_bump_the_weight() {
        let (_dir, history) = repo();
        let id = history.insert_interaction("cold", "I'm called.", None, None).unwrap();
        history.update_correction(id, "I'm cold.").unwrap();
        run_curation(&history, &CuratorConfig::default()).unwrap();
        let row = &history.list_recent(1).unwrap()[0];
        assert_eq!(row.weight, Some(2.5));
    }

    #[test]
    fn recurring_phrases_weigh_more() {
        let (_dir, history) = repo();
        // Same phrase three times; pattern keys ignore case and trailing
        // punctuation.
        for response in ["I want water.", "i want water", "I want  water."] {
            history.insert_interaction("water", response, None, None).unwrap();
            std::thread::sleep(std::time::Duration::from_millis(2));
        }
        history.insert_interaction("tea", "I want tea.", None, None).unwrap();
        run_curation(&history, &CuratorConfig::default()).unwrap();
        let rows = history.list_for_curation(10).unwrap();
        // 1.0 + (3-1)*0.5 (response) + (3-1)*0.5 (transcription) = 3.0
        assert_eq!(rows[0].weight, Some(3.0));
        assert_eq!(rows[3].weight, Some(1.0));
    }

    #[test]
    fn weights_are_clamped_to_the_configured_range() {
        let (_dir, history) = repo();
        for _ in 0..40 {
            history.insert_interaction("water", "I want water.", None, None).unwrap();
        }
        let config = CuratorConfig {
            max_weight: 5.0,
            ..CuratorConfig::default()
        };
        run_curation(&history, &config).unwrap();
        for row in history.list_for_curation(100).unwrap() {
            let w = row.weight.unwrap();
            assert!((config.min_weight..=config.max_weight).contains(&w));
        }
    }

    #[test]
    fn empty_transcriptions_are_excluded_not_weighted() {
        let (_dir, history) = repo();
        history.insert_interaction("", "orphan response", None, None).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        history.insert_interaction("real", "kept", None, None).unwrap();
        let counts = run_curation(&history, &CuratorConfig::default()).unwrap();
        assert_eq!(counts.excluded, 1);
        assert_eq!(counts.weights_updated, 1);
        let rows = history.list_for_curation(10).unwrap();
        assert!(rows[0].exclude_from_profile);
        assert_eq!(rows[0].weight, None);
    }

    #[test]
    fn retention_deletes_old_rows() {
        let (_dir, history) = repo();
        history.insert_interaction("recent", "kept", None, None).unwrap();
        let config = CuratorConfig {
            delete_older_than_days: Some(30),
            ..CuratorConfig::default()
        };
        let counts = run_curation(&history, &config).unwrap();
        // Nothing is 30 days old in this store.
        assert_eq!(counts.deleted, 0);
        assert_eq!(history.list_recent(10).unwrap().len(), 1);
    }

    #[test]
    fn rerunning_is_stable() {
        let (_dir, history) = repo();
        history.insert_interaction("water", "I want water.", None, None).unwrap();
        run_curation(&history, &CuratorConfig::default()).unwrap();
        let first: Vec<_> = history
            .list_for_curation(10)
            .unwrap()
            .into_iter()
            .map(|r| r.weight)
            .collect();
        run_curation(&history, &CuratorConfig::default()).unwrap();
        let second: Vec<_> = history
            .list_for_curation(10)
            .unwrap()
            .into_iter()
            .map(|r| r.weight)
            .collect();
        assert_eq!(first, second);
    }
}
