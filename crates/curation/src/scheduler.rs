//! Background curation loop.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{error, info};

use talkie_persistence::HistoryRepo;

use crate::curator::{run_curation, CuratorConfig};

/// Spawn a task that runs curation every `interval_hours`, forever.
///
/// The first run is pulled forward to at most one minute so a fresh start
/// gets weights quickly; the steady interval never drops below one minute.
/// Returns `None` when `interval_hours` is not positive. Pass failures are
/// logged and the loop keeps going.
pub fn spawn_scheduler(
    history: HistoryRepo,
    config: CuratorConfig,
    interval_hours: f64,
) -> Option<JoinHandle<()>> {
    if interval_hours <= 0.0 {
        return None;
    }
    let interval = Duration::from_secs_f64((interval_hours * 3600.0).max(60.0));
    let first_delay = interval.min(Duration::from_secs(60));
    info!(?interval, "curation scheduler started");

    Some(tokio::spawn(async move {
        tokio::time::sleep(first_delay).await;
        loop {
            let history = history.clone();
            let config = config.clone();
            let outcome =
                tokio::task::spawn_blocking(move || run_curation(&history, &config)).await;
            match outcome {
                Ok(Ok(counts)) => info!(
                    weights_updated = counts.weights_updated,
                    excluded = counts.excluded,
                    deleted = counts.deleted,
                    "scheduled curation pass finished"
                ),
                Ok(Err(e)) => error!(error = %e, "scheduled curation pass failed"),
                Err(e) => error!(error = %e, "curation task panicked"),
            }
            tokio::time::sleep(interval).await;
        }
    }))
}
