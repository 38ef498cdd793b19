//! `talkie` maintenance CLI: interaction history and curation.
//!
//! Exit codes: 0 success, 1 usage/validation, 2 external-tool failure.
//! Normal output on stdout, errors on stderr.

mod curation_cmd;
mod history_cmd;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use talkie_config::Settings;
use talkie_persistence::{Database, HistoryRepo};

#[derive(Parser)]
#[command(name = "talkie", about = "Talkie voice assistant maintenance")]
struct Cli {
    /// Configuration file; defaults to $TALKIE_CONFIG when set.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Inspect and edit the interaction history.
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },
    /// Run one curation pass; optionally export fine-tuning data.
    Curation {
        /// Write instruction/input/output JSONL to this file.
        #[arg(long, value_name = "FILE")]
        export: Option<PathBuf>,

        /// Max interactions to process.
        #[arg(long, value_name = "N")]
        limit: Option<usize>,
    },
}

#[derive(Subcommand)]
enum HistoryAction {
    /// Delete the whole history.
    Clear,
    /// List interactions, newest first (1 = most recent).
    List {
        #[arg(long, default_value_t = history_cmd::LIST_DEFAULT_LIMIT)]
        limit: usize,
    },
    /// Show one interaction by list index.
    View { index: usize },
    /// Edit the correction for one interaction in $EDITOR.
    Edit { index: usize },
}

fn load_settings(config: Option<&PathBuf>) -> Result<Settings, ExitCode> {
    let path = config
        .cloned()
        .or_else(|| std::env::var_os("TALKIE_CONFIG").map(PathBuf::from));
    let settings = match Settings::load(path.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{e}");
            return Err(ExitCode::from(1));
        }
    };
    if let Err(e) = settings.validate() {
        eprintln!("{e}");
        return Err(ExitCode::from(1));
    }
    Ok(settings)
}

fn open_history(settings: &Settings) -> Result<HistoryRepo, ExitCode> {
    match Database::open(&settings.persistence.db_path) {
        Ok(db) => Ok(HistoryRepo::new(db)),
        Err(e) => {
            eprintln!("could not open database: {e}");
            Err(ExitCode::from(1))
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let settings = match load_settings(cli.config.as_ref()) {
        Ok(settings) => settings,
        Err(code) => return code,
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&settings.logging.level)),
        )
        .with_writer(std::io::stderr)
        .init();
    let history = match open_history(&settings) {
        Ok(history) => history,
        Err(code) => return code,
    };

    let outcome = match cli.command {
        Command::History { action } => match action {
            HistoryAction::Clear => history_cmd::clear(&history, &mut std::io::stdout()),
            HistoryAction::List { limit } => {
                history_cmd::list(&history, limit, &mut std::io::stdout())
            }
            HistoryAction::View { index } => {
                history_cmd::view(&history, index, &mut std::io::stdout())
            }
            HistoryAction::Edit { index } => history_cmd::edit(
                &history,
                index,
                &std::env::var("EDITOR").unwrap_or_else(|_| "vi".to_string()),
                &mut std::io::stdout(),
            ),
        },
        Command::Curation { export, limit } => curation_cmd::run(
            &history,
            &settings,
            export.as_deref(),
            limit,
            &mut std::io::stdout(),
        ),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.message);
            ExitCode::from(e.code)
        }
    }
}

/// Failure with the exit code it maps to.
#[derive(Debug)]
pub(crate) struct CmdError {
    pub code: u8,
    pub message: String,
}

impl CmdError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self {
            code: 1,
            message: message.into(),
        }
    }

    pub fn external(message: impl Into<String>) -> Self {
        Self {
            code: 2,
            message: message.into(),
        }
    }
}
