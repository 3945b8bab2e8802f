//! Periodic maintenance job
//!
//! One background task on a fixed interval: expires stale searches, purges
//! stale games and abandoned input flows, sweeps long-inactive users, and
//! refreshes the state gauges. Each step takes at most one structure's
//! lock at a time. The job has its own shutdown channel instead of being a
//! fire-and-forget spawn.

use crate::directory::UserDirectory;
use crate::games::GameManager;
use crate::gateway::Gateway;
use crate::matching::MatchEngine;
use crate::metrics::MetricsCollector;
use crate::storage::Storage;
use crate::types::UserStatus;
use crate::utils::current_timestamp;
use chrono::Duration as ChronoDuration;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Abandoned input flows older than this are dropped
const STALE_FLOW_MINUTES: i64 = 30;

/// Everything the maintenance tick needs
pub struct MaintenanceDeps {
    pub storage: Arc<dyn Storage>,
    pub engine: Arc<MatchEngine>,
    pub games: Arc<GameManager>,
    pub gateway: Arc<Gateway>,
    pub directory: Arc<UserDirectory>,
    pub metrics: Arc<MetricsCollector>,
    /// Searches older than this are expired
    pub stale_search: ChronoDuration,
}

/// Handle to the running maintenance task
pub struct Maintenance {
    shutdown_tx: watch::Sender<bool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Maintenance {
    /// Spawn the periodic task
    pub fn start(interval: Duration, deps: MaintenanceDeps) -> Self {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick fires immediately; skip it so startup stays quiet
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        run_once(&deps).await;
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            debug!("maintenance task stopped");
        });

        info!("maintenance task started (interval {:?})", interval);
        Self {
            shutdown_tx,
            handle: Mutex::new(Some(handle)),
        }
    }

    /// Signal the task to stop and wait for it
    pub async fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
        let handle = self.handle.lock().ok().and_then(|mut guard| guard.take());
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                error!("maintenance task join failed: {}", err);
            }
        }
    }
}

/// One maintenance sweep; also used directly by tests
pub async fn run_once(deps: &MaintenanceDeps) {
    let now = current_timestamp();

    match deps.engine.expire_stale_searches(now - deps.stale_search).await {
        Ok(expired) if !expired.is_empty() => {
            debug!("maintenance expired {} searches", expired.len());
        }
        Ok(_) => {}
        Err(err) => error!("stale search expiry failed: {}", err),
    }

    if let Err(err) = deps.games.cleanup_stale() {
        error!("stale game cleanup failed: {}", err);
    }

    match deps
        .gateway
        .flows()
        .purge_stale(ChronoDuration::minutes(STALE_FLOW_MINUTES))
    {
        Ok(purged) if purged > 0 => debug!("maintenance purged {} stale flows", purged),
        Ok(_) => {}
        Err(err) => error!("stale flow purge failed: {}", err),
    }

    if let Err(err) = deps.directory.sweep_inactive() {
        error!("inactivity sweep failed: {}", err);
    }

    refresh_gauges(deps);
}

fn refresh_gauges(deps: &MaintenanceDeps) {
    if let Ok(waiting) = deps.storage.list_waiting(None) {
        deps.metrics.pool_size.set(waiting.len() as i64);
    }
    if let Ok(users) = deps.storage.list_users() {
        let chatting = users
            .iter()
            .filter(|profile| profile.status == UserStatus::Chatting)
            .count();
        deps.metrics.active_sessions.set((chatting / 2) as i64);
    }
    let games = deps.games.active_board_games().unwrap_or(0)
        + deps.games.active_guess_games().unwrap_or(0);
    deps.metrics.active_games.set(games as i64);
}
