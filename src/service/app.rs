//! Main application state and service coordination
//!
//! `AppState` wires the storage, engines, gateway, metrics, and background
//! tasks together and owns their lifecycle. The outbound transport is
//! injected by the platform glue; the core never talks to the chat
//! platform directly.

use crate::config::AppConfig;
use crate::directory::UserDirectory;
use crate::economy::{Ledger, VipDesk};
use crate::error::{DuetError, Result};
use crate::games::GameManager;
use crate::gateway::Gateway;
use crate::maintenance::{Maintenance, MaintenanceDeps};
use crate::matching::MatchEngine;
use crate::metrics::{CoreStats, HealthServer, HealthServerConfig, MetricsCollector, StatsSource};
use crate::storage::{MemoryStorage, Storage};
use crate::transport::Outbound;
use crate::types::UserStatus;
use chrono::Duration as ChronoDuration;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Snapshot provider backed by the live core structures
struct LiveStats {
    storage: Arc<dyn Storage>,
    games: Arc<GameManager>,
    started_at: Instant,
}

impl StatsSource for LiveStats {
    fn snapshot(&self) -> Result<CoreStats> {
        let users = self.storage.list_users()?;
        let chatting = users
            .iter()
            .filter(|profile| profile.status == UserStatus::Chatting)
            .count();

        Ok(CoreStats {
            users_total: users.len(),
            pool_size: self.storage.list_waiting(None)?.len(),
            active_sessions: chatting / 2,
            active_board_games: self.games.active_board_games()?,
            active_guess_games: self.games.active_guess_games()?,
            uptime_seconds: self.started_at.elapsed().as_secs(),
        })
    }
}

/// The assembled service
pub struct AppState {
    pub config: AppConfig,
    pub storage: Arc<dyn Storage>,
    pub metrics: Arc<MetricsCollector>,
    pub ledger: Arc<Ledger>,
    pub vip: Arc<VipDesk>,
    pub directory: Arc<UserDirectory>,
    pub engine: Arc<MatchEngine>,
    pub games: Arc<GameManager>,
    pub gateway: Arc<Gateway>,
    stats: Arc<dyn StatsSource>,
    health_server: Arc<HealthServer>,
    health_task: Option<JoinHandle<()>>,
    maintenance: Option<Maintenance>,
}

impl AppState {
    /// Wire all components. The platform token is a required secret:
    /// without it the service refuses to start.
    pub fn new(config: AppConfig, outbound: Arc<dyn Outbound>) -> Result<Self> {
        if config.service.platform_token.is_empty() {
            return Err(DuetError::Configuration {
                message: "platform token is missing (set PLATFORM_TOKEN)".to_string(),
            }
            .into());
        }
        crate::config::validate_config(&config)?;

        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let metrics = Arc::new(MetricsCollector::new()?);
        let ledger = Arc::new(Ledger::new(storage.clone(), config.economy.clone()));
        let vip = Arc::new(VipDesk::new(
            storage.clone(),
            ledger.clone(),
            config.vip.clone(),
        ));
        let directory = Arc::new(UserDirectory::new(
            storage.clone(),
            ledger.clone(),
            config.economy.clone(),
        ));
        let engine = Arc::new(MatchEngine::new(
            storage.clone(),
            ledger.clone(),
            outbound.clone(),
            metrics.clone(),
            config.matching.clone(),
        ));
        let relay = Arc::new(crate::relay::SessionRelay::new(
            storage.clone(),
            ledger.clone(),
            outbound.clone(),
            engine.clone(),
            metrics.clone(),
            &config.relay,
        ));
        let games = Arc::new(GameManager::new(
            storage.clone(),
            ledger.clone(),
            metrics.clone(),
            config.games.clone(),
        ));
        let gateway = Arc::new(Gateway::new(
            directory.clone(),
            engine.clone(),
            relay,
            games.clone(),
            ledger.clone(),
            outbound,
            config.matching.gender_search_cost,
        ));

        let stats: Arc<dyn StatsSource> = Arc::new(LiveStats {
            storage: storage.clone(),
            games: games.clone(),
            started_at: Instant::now(),
        });
        let health_server = Arc::new(HealthServer::new(
            HealthServerConfig {
                port: config.service.health_port,
                host: "0.0.0.0".to_string(),
            },
            metrics.clone(),
            stats.clone(),
        ));

        Ok(Self {
            config,
            storage,
            metrics,
            ledger,
            vip,
            directory,
            engine,
            games,
            gateway,
            stats,
            health_server,
            health_task: None,
            maintenance: None,
        })
    }

    /// Start background tasks: health endpoint and maintenance
    pub fn start(&mut self) -> Result<()> {
        let server = self.health_server.clone();
        self.health_task = Some(tokio::spawn(async move {
            if let Err(err) = server.start().await {
                error!("health server failed: {}", err);
            }
        }));

        let deps = MaintenanceDeps {
            storage: self.storage.clone(),
            engine: self.engine.clone(),
            games: self.games.clone(),
            gateway: self.gateway.clone(),
            directory: self.directory.clone(),
            metrics: self.metrics.clone(),
            stale_search: ChronoDuration::seconds(
                self.config.matching.stale_search_seconds as i64,
            ),
        };
        self.maintenance = Some(Maintenance::start(
            self.config.maintenance_interval(),
            deps,
        ));

        info!("service components started");
        Ok(())
    }

    /// Stop background tasks gracefully
    pub async fn stop(&mut self) {
        if let Some(maintenance) = self.maintenance.take() {
            maintenance.stop().await;
        }
        self.health_server.stop();
        if let Some(task) = self.health_task.take() {
            if let Err(err) = task.await {
                error!("health task join failed: {}", err);
            }
        }
        info!("service components stopped");
    }

    pub fn stats_source(&self) -> Arc<dyn StatsSource> {
        self.stats.clone()
    }

    /// Run a health check against the live core state
    pub fn health(&self) -> Result<crate::service::HealthReport> {
        crate::service::HealthCheck::check(&self.stats)
    }
}
