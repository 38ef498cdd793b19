//! Export interactions to JSONL for external fine-tuning (e.g. `ollama
//! create`, Unsloth, LLaMA-Factory). Corrected and high-weight pairs come
//! first so small exports carry the best examples.

use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tracing::info;

use talkie_llm::prompts::DEFAULT_EXPORT_INSTRUCTION;
use talkie_persistence::{HistoryRepo, InteractionRecord};

use crate::Result;

/// One instruction-tuning record, the shape most tooling expects.
#[derive(Debug, Serialize)]
struct ExportRecord<'a> {
    instruction: &'a str,
    input: &'a str,
    output: &'a str,
}

#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub limit: usize,
    /// Keep only rows at or above this weight.
    pub min_weight: Option<f64>,
    /// Instruction attached to every record; defaults to the built-in one.
    pub system_instruction: Option<String>,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            limit: 5000,
            min_weight: None,
            system_instruction: None,
        }
    }
}

fn sort_key(row: &InteractionRecord) -> (i32, f64, String) {
    let has_correction = row
        .corrected_response
        .as_deref()
        .is_some_and(|c| !c.trim().is_empty());
    (
        if has_correction { 0 } else { 1 },
        -row.weight.unwrap_or(0.0),
        row.created_at.clone(),
    )
}

/// Write interactions to `out_path` as JSONL. Each line has `instruction`,
/// `input`, `output`; corrections are preferred as the output. Returns the
/// number of lines written.
pub fn export_for_finetuning(
    history: &HistoryRepo,
    out_path: &Path,
    options: &ExportOptions,
) -> Result<usize> {
    let mut rows = history.list_for_curation(options.limit)?;
    rows.sort_by(|a, b| {
        let (ka, wa, ca) = sort_key(a);
        let (kb, wb, cb) = sort_key(b);
        ka.cmp(&kb)
            .then(wa.partial_cmp(&wb).unwrap_or(std::cmp::Ordering::Equal))
            .then(ca.cmp(&cb))
    });
    if let Some(min_weight) = options.min_weight {
        rows.retain(|r| r.weight.unwrap_or(0.0) >= min_weight);
    }

    let instruction = options
        .system_instruction
        .as_deref()
        .unwrap_or(DEFAULT_EXPORT_INSTRUCTION);

    if let Some(parent) = out_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let mut file = std::fs::File::create(out_path)?;
    let mut written = 0;
    for row in &rows {
        let output = row.preferred_response().trim();
        if output.is_empty() {
            continue;
        }
        let record = ExportRecord {
            instruction,
            input: row.original_transcription.trim(),
            output,
        };
        serde_json::to_writer(&mut file, &record)?;
        file.write_all(b"\n")?;
        written += 1;
    }
    info!(written, path = %out_path.display(), "exported fine-tuning records");
    Ok(written)
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

    fn read_lines(path: &Path) -> Vec<serde_json::Value> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn corrected_rows_come_first_and_use_the_correction() {
        let (dir, history) = repo();
        history.insert_interaction("water", "I want water.", None, None).unwrap();
        let id = history.insert_interaction("cold", "I'm called.", None, None).unwrap();
        history.update_correction(id, "I'm cold.").unwrap();

        let out = dir.path().join("export.jsonl");
        let written =
            export_for_finetuning(&history, &out, &ExportOptions::default()).unwrap();
        assert_eq!(written, 2);
        let lines = read_lines(&out);
        assert_eq!(lines[0]["input"], "cold");
        assert_eq!(lines[0]["output"], "I'm cold.");
        assert_eq!(lines[1]["output"], "I want water.");
        assert!(lines[0]["instruction"]
            .as_str()
            .unwrap()
            .contains("speech-impaired"));
    }

    #[test]
    fn min_weight_filters_rows() {
        let (dir, history) = repo();
        let light = history.insert_interaction("a", "ra", None, None).unwrap();
        let heavy = history.insert_interaction("b", "rb", None, None).unwrap();
        history.update_weights_batch(&[(light, 0.5), (heavy, 3.0)]).unwrap();

        let out = dir.path().join("export.jsonl");
        let options = ExportOptions {
            min_weight: Some(2.0),
            ..ExportOptions::default()
        };
        assert_eq!(export_for_finetuning(&history, &out, &options).unwrap(), 1);
        assert_eq!(read_lines(&out)[0]["input"], "b");
    }

    #[test]
    fn empty_outputs_are_skipped() {
        let (dir, history) = repo();
        history.insert_interaction("quiet", "   ", None, None).unwrap();
        let out = dir.path().join("export.jsonl");
        assert_eq!(
            export_for_finetuning(&history, &out, &ExportOptions::default()).unwrap(),
            0
        );
    }

    #[test]
    fn custom_instruction_replaces_the_default() {
        let (dir, history) = repo();
        history.insert_interaction("x", "y", None, None).unwrap();
        let out = dir.path().join("export.jsonl");
        let options = ExportOptions {
            system_instruction: Some("Custom instruction.".to_string()),
            ..ExportOptions::default()
        };
        export_for_finetuning(&history, &out, &options).unwrap();
        assert_eq!(read_lines(&out)[0]["instruction"], "Custom instruction.");
    }
}
