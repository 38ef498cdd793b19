//! Curation subcommand: one pass, optional JSONL export.

use std::io::Write;
use std::path::Path;

use talkie_config::Settings;
use talkie_curation::{export_for_finetuning, run_curation, CuratorConfig, ExportOptions};
use talkie_persistence::HistoryRepo;

use crate::CmdError;

fn curator_config(settings: &Settings, limit: Option<usize>) -> CuratorConfig {
    let c = &settings.curation;
    CuratorConfig {
        min_weight: c.min_weight,
        max_weight: c.max_weight,
        correction_weight_bump: c.correction_weight_bump,
        pattern_count_weight_scale: c.pattern_count_weight_scale,
        exclude_empty_transcription: c.exclude_empty_transcription,
        delete_older_than_days: c.delete_older_than_days,
        max_interactions_to_curate: limit.unwrap_or(c.max_interactions_to_curate),
    }
}

pub fn run(
    history: &HistoryRepo,
    settings: &Settings,
    export: Option<&Path>,
    limit: Option<usize>,
    out: &mut impl Write,
) -> Result<(), CmdError> {
    let counts = run_curation(history, &curator_config(settings, limit))
        .map_err(|e| CmdError::validation(e.to_string()))?;
    writeln!(
        out,
        "Curation: weights_updated={} excluded={} deleted={}",
        counts.weights_updated, counts.excluded, counts.deleted
    )
    .ok();

    if let Some(path) = export {
        let options = ExportOptions {
            limit: limit.unwrap_or(5000),
            ..ExportOptions::default()
        };
        let written = export_for_finetuning(history, path, &options)
            .map_err(|e| CmdError::external(format!("export failed: {e}")))?;
        writeln!(out, "Exported {written} record(s) to {}.", path.display()).ok();
    }
    Ok(())
}
