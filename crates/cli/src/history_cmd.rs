//! History subcommands: clear, list, view, edit.

use std::io::Write;

use talkie_persistence::{HistoryRepo, InteractionRecord};

use crate::CmdError;

pub const LIST_DEFAULT_LIMIT: usize = 2000;
const LIST_PREVIEW_LEN: usize = 60;

type CmdResult = Result<(), CmdError>;

fn preview(text: &str) -> String {
    let text = text.trim();
    let mut chars: Vec<char> = text.chars().collect();
    if chars.len() > LIST_PREVIEW_LEN {
        chars.truncate(LIST_PREVIEW_LEN - 1);
        let mut out: String = chars.into_iter().collect();
        out.push('\u{2026}');
        out
    } else {
        text.to_string()
    }
}

/// Record at a 1-based, newest-first index.
fn item_at_index(history: &HistoryRepo, index: usize) -> Result<InteractionRecord, CmdError> {
    if index < 1 {
        return Err(CmdError::validation(format!("No history item at index {index}.")));
    }
    let items = history
        .list_recent(index)
        .map_err(|e| CmdError::validation(e.to_string()))?;
    items
        .into_iter()
        .nth(index - 1)
        .ok_or_else(|| CmdError::validation(format!("No history item at index {index}.")))
}

pub fn clear(history: &HistoryRepo, out: &mut impl Write) -> CmdResult {
    let n = history
        .delete_all()
        .map_err(|e| CmdError::validation(e.to_string()))?;
    writeln!(out, "Cleared {n} interaction(s).").ok();
    Ok(())
}

pub fn list(history: &HistoryRepo, limit: usize, out: &mut impl Write) -> CmdResult {
    let items = history
        .list_recent(limit)
        .map_err(|e| CmdError::validation(e.to_string()))?;
    for (i, record) in items.iter().enumerate() {
        let created = record.created_at.chars().take(19).collect::<String>();
        writeln!(
            out,
            "{:5}  {}  {}",
            i + 1,
            created,
            preview(&record.original_transcription)
        )
        .ok();
        writeln!(out, "       {}", preview(&record.llm_response)).ok();
    }
    Ok(())
}

pub fn view(history: &HistoryRepo, index: usize, out: &mut impl Write) -> CmdResult {
    let record = item_at_index(history, index)?;
    writeln!(out, "id: {}", record.id).ok();
    writeln!(out, "created_at: {}", record.created_at).ok();
    writeln!(out, "original_transcription: {}", record.original_transcription).ok();
    writeln!(out, "llm_response: {}", record.llm_response).ok();
    writeln!(
        out,
        "corrected_response: {}",
        record.corrected_response.as_deref().unwrap_or("(none)")
    )
    .ok();
    writeln!(out, "exclude_from_profile: {}", record.exclude_from_profile as i64).ok();
    Ok(())
}

pub fn edit(
    history: &HistoryRepo,
    index: usize,
    editor: &str,
    out: &mut impl Write,
) -> CmdResult {
    let record = item_at_index(history, index)?;
    let current = record.preferred_response().trim().to_string();

    let mut file = tempfile::Builder::new()
        .suffix(".txt")
        .tempfile()
        .map_err(|e| CmdError::external(format!("could not create temp file: {e}")))?;
    file.write_all(current.as_bytes())
        .map_err(|e| CmdError::external(format!("could not write temp file: {e}")))?;
    file.flush().ok();

    let status = std::process::Command::new(editor)
        .arg(file.path())
        .status()
        .map_err(|e| CmdError::external(format!("could not launch editor {editor}: {e}")))?;
    if !status.success() {
        return Err(CmdError::external(format!("editor {editor} exited with {status}")));
    }

    let new_content = std::fs::read_to_string(file.path())
        .map_err(|e| CmdError::external(format!("could not read edited file: {e}")))?
        .trim()
        .to_string();
    history
        .update_correction(record.id, &new_content)
        .map_err(|e| CmdError::validation(e.to_string()))?;
    writeln!(out, "Updated correction for interaction id={}.", record.id).ok();
    Ok(())
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

    fn output(buffer: &[u8]) -> String {
        String::from_utf8_lossy(buffer).to_string()
    }

    #[test]
    fn list_is_numbered_newest_first_with_previews() {
        let (_dir, history) = repo();
        history.insert_interaction("older", "first response", None, None).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let long = "x".repeat(100);
        history.insert_interaction(&long, "second response", None, None).unwrap();

        let mut buffer = Vec::new();
        list(&history, 10, &mut buffer).unwrap();
        let text = output(&buffer);
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].trim_start().starts_with("1  "));
        assert!(lines[0].contains('\u{2026}'));
        assert!(lines[2].contains("older"));
    }

    #[test]
    fn view_shows_the_record_by_index() {
        let (_dir, history) = repo();
        history.insert_interaction("water", "I want water.", None, None).unwrap();
        let mut buffer = Vec::new();
        view(&history, 1, &mut buffer).unwrap();
        let text = output(&buffer);
        assert!(text.contains("original_transcription: water"));
        assert!(text.contains("corrected_response: (none)"));
    }

    #[test]
    fn view_out_of_range_is_a_validation_error() {
        let (_dir, history) = repo();
        let mut buffer = Vec::new();
        let err = view(&history, 3, &mut buffer).unwrap_err();
        assert_eq!(err.code, 1);
        assert!(err.message.contains("index 3"));
    }

    #[test]
    fn clear_reports_the_count() {
        let (_dir, history) = repo();
        history.insert_interaction("a", "r", None, None).unwrap();
        history.insert_interaction("b", "r", None, None).unwrap();
        let mut buffer = Vec::new();
        clear(&history, &mut buffer).unwrap();
        assert!(output(&buffer).contains("Cleared 2 interaction(s)."));
    }

    #[test]
    fn edit_with_a_scripted_editor_updates_the_correction() {
        let (_dir, history) = repo();
        history.insert_interaction("cold", "I'm called.", None, None).unwrap();
        // `true` leaves the temp file unchanged; the correction becomes
        // the current response text.
        let mut buffer = Vec::new();
        edit(&history, 1, "true", &mut buffer).unwrap();
        let rows = history.list_recent(1).unwrap();
        assert_eq!(rows[0].corrected_response.as_deref(), Some("I'm called."));
    }

    #[test]
    fn edit_with_a_missing_editor_is_an_external_failure() {
        let (_dir, history) = repo();
        history.insert_interaction("a", "r", None, None).unwrap();
        let mut buffer = Vec::new();
        let err = edit(&history, 1, "definitely-not-an-editor-xyz", &mut buffer).unwrap_err();
        assert_eq!(err.code, 2);
    }
}
