//! Background presence expiry.
//!
//! Staff portals send heartbeats; when they stop (tab closed, device lost)
//! nothing calls `set_staff_offline`. This task flips such members offline
//! once their last heartbeat is older than the configured TTL.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::db::DbState;
use crate::staff::expire_stale_presence;

pub fn spawn_presence_sweeper(
    db: Arc<DbState>,
    ttl_secs: i64,
    every: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(ttl_secs, every_secs = every.as_secs(), "Presence sweeper started");
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {}
            }

            let db = db.clone();
            let swept = tokio::task::spawn_blocking(move || {
                expire_stale_presence(&db, ttl_secs, Utc::now())
            })
            .await;

            match swept {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => warn!(error = %e, "Presence sweep failed"),
                Err(e) => warn!(error = %e, "Presence sweep task panicked"),
            }
        }

        info!("Presence sweeper stopped");
    })
}
