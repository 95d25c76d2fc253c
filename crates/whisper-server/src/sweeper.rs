//! Background sweepers — TTL enforcement for the durable stores.
//!
//! Each sweep is a single statement; a failed tick logs and retries on the
//! next interval. Sweepers never touch live-path state.

use std::sync::Arc;
use std::time::Duration;

use whisper_common::config::LimitsConfig;
use whisper_common::ratelimit::RateLimiter;
use whisper_db::{Database, repository, sessions::SessionStore};
use whisper_gateway::calls::CallRouter;

const SWEEP_INTERVAL: Duration = Duration::from_secs(3600);

/// Spawn all periodic sweeps. Handles are detached; the tasks live as long
/// as the process.
pub fn spawn_sweepers(
    db: Database,
    sessions: Arc<SessionStore>,
    calls: Arc<CallRouter>,
    limiter: Arc<RateLimiter>,
    limits: LimitsConfig,
) {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(SWEEP_INTERVAL);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tick.tick().await;

            match repository::pending::expire(&db.pg, limits.pending_ttl_days).await {
                Ok(0) => {}
                Ok(n) => tracing::info!(rows = n, "pending-queue TTL sweep"),
                Err(e) => tracing::error!(error = %e, "pending-queue sweep failed"),
            }

            match repository::attachments::expire(&db.pg).await {
                Ok(0) => {}
                Ok(n) => tracing::info!(rows = n, "attachment TTL sweep"),
                Err(e) => tracing::error!(error = %e, "attachment sweep failed"),
            }

            sessions.gc().await;
            calls.prune_stale().await;
            limiter.prune();
        }
    });
}
