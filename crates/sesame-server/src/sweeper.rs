use crate::state::AppState;
use anyhow::Result;
use chrono::{Duration as ChronoDuration, Utc};
use sesame_db::SessionRepo;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Spawn the session sweeper background task.
///
/// Periodically deletes sessions that were revoked or expired longer ago
/// than the configured retention. Active sessions are never touched.
pub fn start(state: AppState, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        run_loop(state, cancel).await;
    })
}

async fn run_loop(state: AppState, cancel: CancellationToken) {
    let interval = Duration::from_secs(state.config.sweeper.interval_secs);
    tracing::info!(
        "Session sweeper started (interval={:?}, retention={}h)",
        interval,
        state.config.sweeper.retention_hours
    );

    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {},
            _ = cancel.cancelled() => {
                tracing::info!("Session sweeper shutting down");
                return;
            }
        }

        if let Err(e) = sweep_once(&state).await {
            tracing::error!("Session sweep error: {:#}", e);
        }
    }
}

/// Run a single sweep and return how many rows were deleted.
pub async fn sweep_once(state: &AppState) -> Result<u64> {
    let retention = ChronoDuration::hours(state.config.sweeper.retention_hours as i64);
    let cutoff = Utc::now() - retention;

    let purged = SessionRepo::purge_dead(&state.pool, cutoff).await?;
    if purged > 0 {
        tracing::info!("Purged {} dead session(s) older than {}", purged, cutoff);
    }
    Ok(purged)
}
