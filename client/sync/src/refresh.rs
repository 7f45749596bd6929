//! Long-running background task that periodically re-syncs the connected
//! account's projects.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::context::ConnectionContext;
use crate::state::SyncStatus;
use crate::sync::ProjectSyncEngine;

pub struct RefreshState {
    pub engine: ProjectSyncEngine,
    pub ctx: ConnectionContext,
    pub interval: Duration,
}

/// Spawn the refresh loop as a background [`tokio`] task.
///
/// A failed pass is left in the engine's error state and retried on the
/// next tick.
pub async fn run(state: Arc<RefreshState>) {
    info!(
        "Refreshing projects for {} every {}s",
        state.ctx.scope(),
        state.interval.as_secs()
    );

    let mut ticker = tokio::time::interval(state.interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        refresh_once(&state).await;
    }
}

async fn refresh_once(state: &RefreshState) -> SyncStatus {
    let status = state.engine.load_projects(&state.ctx, true).await;
    if status == SyncStatus::Error {
        warn!("Project refresh failed for {}", state.ctx.scope());
    }
    status
}
