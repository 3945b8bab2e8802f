//! Shared fixtures for integration tests

use duet::config::AppConfig;
use duet::directory::UserDirectory;
use duet::economy::{Ledger, VipDesk};
use duet::games::GameManager;
use duet::gateway::Gateway;
use duet::matching::MatchEngine;
use duet::metrics::MetricsCollector;
use duet::relay::SessionRelay;
use duet::storage::{MemoryStorage, Storage};
use duet::transport::MockOutbound;
use duet::types::{Gender, UserId, UserUpdate};
use std::sync::Arc;

/// A complete wired system over in-memory storage and a mock transport
pub struct TestSystem {
    pub config: AppConfig,
    pub storage: Arc<MemoryStorage>,
    pub ledger: Arc<Ledger>,
    pub vip: Arc<VipDesk>,
    pub directory: Arc<UserDirectory>,
    pub engine: Arc<MatchEngine>,
    pub relay: Arc<SessionRelay>,
    pub games: Arc<GameManager>,
    pub gateway: Arc<Gateway>,
    pub outbound: Arc<MockOutbound>,
}

impl TestSystem {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: AppConfig) -> Self {
        let storage = Arc::new(MemoryStorage::new());
        let outbound = Arc::new(MockOutbound::new());
        let metrics = Arc::new(MetricsCollector::new().unwrap());
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
        let relay = Arc::new(SessionRelay::new(
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
            metrics,
            config.games.clone(),
        ));
        let gateway = Arc::new(Gateway::new(
            directory.clone(),
            engine.clone(),
            relay.clone(),
            games.clone(),
            ledger.clone(),
            outbound.clone(),
            config.matching.gender_search_cost,
        ));

        Self {
            config,
            storage,
            ledger,
            vip,
            directory,
            engine,
            relay,
            games,
            gateway,
            outbound,
        }
    }

    /// Register a user with a gender and starting balance
    pub fn add_user(&self, id: UserId, gender: Gender, points: u64) {
        self.directory
            .ensure_user(id, &format!("user{}", id))
            .unwrap();
        self.storage
            .upsert_user(
                id,
                UserUpdate {
                    gender: Some(gender),
                    ..Default::default()
                },
            )
            .unwrap();
        if points > 0 {
            self.ledger.add_points(id, points).unwrap();
        }
    }

    pub fn points(&self, id: UserId) -> u64 {
        self.storage.get_user(id).unwrap().unwrap().points
    }
}

/// Default config plus the required platform token
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.service.platform_token = "test-token".to_string();
    config.relay.filtered_words = vec!["spam".to_string()];
    config
}
