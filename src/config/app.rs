//! Main application configuration
//!
//! This module defines the primary configuration structures for the duet
//! matchmaking core, including environment variable loading, TOML file
//! loading, and validation.

use crate::config::vip::VipSettings;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub service: ServiceSettings,
    pub matching: MatchingSettings,
    pub relay: RelaySettings,
    pub games: GameSettings,
    pub economy: EconomySettings,
    pub vip: VipSettings,
}

/// Service-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Service name for logging and metrics
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Chat-platform API token; required, the process refuses to start
    /// without it
    pub platform_token: String,
    /// Port for the health/metrics endpoint
    pub health_port: u16,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,
    /// Interval between maintenance sweeps in seconds
    pub maintenance_interval_seconds: u64,
}

/// Partner-matching settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingSettings {
    /// Points charged for a gender-filtered search
    pub gender_search_cost: u64,
    /// Searches older than this are expired by maintenance (seconds)
    pub stale_search_seconds: u64,
}

/// Message relay settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelaySettings {
    /// Blocked terms; each match in a relayed text costs `word_penalty`
    pub filtered_words: Vec<String>,
    /// Points deducted per matched blocked term (floored at zero balance)
    pub word_penalty: u64,
}

/// Mini-game settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GameSettings {
    /// Points moved from loser to winner of a board game
    pub board_stake: u64,
    /// Points credited for a correct guess
    pub guess_reward: u64,
    /// Points deducted when guess attempts run out (skipped if balance is short)
    pub guess_penalty: u64,
    /// Maximum guess attempts per game
    pub guess_attempts: u32,
    /// Bounded wait for a random board opponent (seconds)
    pub opponent_timeout_seconds: u64,
    /// Poll interval while waiting for an opponent (milliseconds)
    pub opponent_poll_ms: u64,
    /// Games untouched for longer than this are purged (seconds)
    pub stale_game_seconds: u64,
}

/// Points/stars economy settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EconomySettings {
    /// Points credited by the periodic bonus claim
    pub bonus_points: u64,
    /// Cooldown between bonus claims (seconds)
    pub bonus_cooldown_seconds: u64,
    /// Points credited to an inviter per confirmed referral
    pub referral_points: u64,
    /// Points charged to change an already-set gender
    pub gender_change_cost: u64,
    /// Users idle for longer than this are removed by the sweep (days)
    pub inactive_sweep_days: u32,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            name: "duet".to_string(),
            log_level: "info".to_string(),
            platform_token: String::new(),
            health_port: 8080,
            shutdown_timeout_seconds: 30,
            maintenance_interval_seconds: 300,
        }
    }
}

impl Default for MatchingSettings {
    fn default() -> Self {
        Self {
            gender_search_cost: 5,
            stale_search_seconds: 300, // 5 minutes
        }
    }
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            filtered_words: Vec::new(),
            word_penalty: 5,
        }
    }
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            board_stake: 5,
            guess_reward: 5,
            guess_penalty: 2,
            guess_attempts: 10,
            opponent_timeout_seconds: 60,
            opponent_poll_ms: 1000,
            stale_game_seconds: 3600, // 1 hour
        }
    }
}

impl Default for EconomySettings {
    fn default() -> Self {
        Self {
            bonus_points: 3,
            bonus_cooldown_seconds: 3600, // 1 hour
            referral_points: 3,
            gender_change_cost: 10,
            inactive_sweep_days: 180,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables with fallback to defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        // Service settings
        if let Ok(name) = env::var("SERVICE_NAME") {
            config.service.name = name;
        }
        if let Ok(log_level) = env::var("LOG_LEVEL") {
            config.service.log_level = log_level;
        }
        if let Ok(token) = env::var("PLATFORM_TOKEN") {
            config.service.platform_token = token;
        }
        if let Ok(port) = env::var("HEALTH_PORT") {
            config.service.health_port = port
                .parse()
                .map_err(|_| anyhow!("Invalid HEALTH_PORT value: {}", port))?;
        }
        if let Ok(timeout) = env::var("SHUTDOWN_TIMEOUT_SECONDS") {
            config.service.shutdown_timeout_seconds = timeout
                .parse()
                .map_err(|_| anyhow!("Invalid SHUTDOWN_TIMEOUT_SECONDS value: {}", timeout))?;
        }
        if let Ok(interval) = env::var("MAINTENANCE_INTERVAL_SECONDS") {
            config.service.maintenance_interval_seconds = interval
                .parse()
                .map_err(|_| anyhow!("Invalid MAINTENANCE_INTERVAL_SECONDS value: {}", interval))?;
        }

        // Matching settings
        if let Ok(cost) = env::var("GENDER_SEARCH_COST") {
            config.matching.gender_search_cost = cost
                .parse()
                .map_err(|_| anyhow!("Invalid GENDER_SEARCH_COST value: {}", cost))?;
        }
        if let Ok(stale) = env::var("STALE_SEARCH_SECONDS") {
            config.matching.stale_search_seconds = stale
                .parse()
                .map_err(|_| anyhow!("Invalid STALE_SEARCH_SECONDS value: {}", stale))?;
        }

        // Relay settings
        if let Ok(words) = env::var("FILTERED_WORDS") {
            config.relay.filtered_words = words
                .split(',')
                .map(|w| w.trim().to_string())
                .filter(|w| !w.is_empty())
                .collect();
        }
        if let Ok(penalty) = env::var("WORD_PENALTY") {
            config.relay.word_penalty = penalty
                .parse()
                .map_err(|_| anyhow!("Invalid WORD_PENALTY value: {}", penalty))?;
        }

        // Game settings
        if let Ok(stake) = env::var("BOARD_STAKE") {
            config.games.board_stake = stake
                .parse()
                .map_err(|_| anyhow!("Invalid BOARD_STAKE value: {}", stake))?;
        }
        if let Ok(timeout) = env::var("OPPONENT_TIMEOUT_SECONDS") {
            config.games.opponent_timeout_seconds = timeout
                .parse()
                .map_err(|_| anyhow!("Invalid OPPONENT_TIMEOUT_SECONDS value: {}", timeout))?;
        }

        // Economy settings
        if let Ok(bonus) = env::var("BONUS_POINTS") {
            config.economy.bonus_points = bonus
                .parse()
                .map_err(|_| anyhow!("Invalid BONUS_POINTS value: {}", bonus))?;
        }
        if let Ok(cost) = env::var("GENDER_CHANGE_COST") {
            config.economy.gender_change_cost = cost
                .parse()
                .map_err(|_| anyhow!("Invalid GENDER_CHANGE_COST value: {}", cost))?;
        }

        validate_config(&config)?;
        Ok(config)
    }

    /// Load configuration from a TOML file; missing keys fall back to the
    /// defaults via serde
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: AppConfig = toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        validate_config(&config)?;
        Ok(config)
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.service.shutdown_timeout_seconds)
    }

    /// Get maintenance interval as Duration
    pub fn maintenance_interval(&self) -> Duration {
        Duration::from_secs(self.service.maintenance_interval_seconds)
    }

    /// Get opponent search timeout as Duration
    pub fn opponent_timeout(&self) -> Duration {
        Duration::from_secs(self.games.opponent_timeout_seconds)
    }

    /// Get opponent search poll interval as Duration
    pub fn opponent_poll(&self) -> Duration {
        Duration::from_millis(self.games.opponent_poll_ms)
    }

    /// Log every configured option with its effect, one line per option
    pub fn log_options(&self) {
        info!(
            "option gender_search_cost={}: points charged for a filtered search",
            self.matching.gender_search_cost
        );
        info!(
            "option gender_change_cost={}: points charged to change gender",
            self.economy.gender_change_cost
        );
        info!(
            "option word_penalty={}: points deducted per blocked term",
            self.relay.word_penalty
        );
        info!(
            "option filtered_words={}: blocked terms scanned in relayed text",
            self.relay.filtered_words.len()
        );
        info!(
            "option board_stake={}: points moved loser -> winner per board game",
            self.games.board_stake
        );
        info!(
            "option guess_reward=+{} guess_penalty=-{}: guess game settlement",
            self.games.guess_reward, self.games.guess_penalty
        );
        info!(
            "option opponent_timeout={}s: bounded wait for a random opponent",
            self.games.opponent_timeout_seconds
        );
        info!(
            "option bonus_points={} every {}s: periodic bonus claim",
            self.economy.bonus_points, self.economy.bonus_cooldown_seconds
        );
        info!(
            "option maintenance_interval={}s: stale search/game/flow purge",
            self.service.maintenance_interval_seconds
        );
        for package in &self.vip.packages {
            info!(
                "option vip {}d: {} stars or {} points",
                package.days, package.stars_price, package.points_price
            );
        }
    }
}

/// Validate configuration values
pub fn validate_config(config: &AppConfig) -> Result<()> {
    // Validate log level
    match config.service.log_level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        _ => return Err(anyhow!("Invalid log level: {}", config.service.log_level)),
    }

    if config.service.health_port == 0 {
        return Err(anyhow!("Health port cannot be 0"));
    }
    if config.service.shutdown_timeout_seconds == 0 {
        return Err(anyhow!("Shutdown timeout must be greater than 0"));
    }
    if config.service.maintenance_interval_seconds == 0 {
        return Err(anyhow!("Maintenance interval must be greater than 0"));
    }

    if config.games.guess_attempts == 0 {
        return Err(anyhow!("Guess attempt limit must be greater than 0"));
    }
    if config.games.opponent_timeout_seconds == 0 {
        return Err(anyhow!("Opponent search timeout must be greater than 0"));
    }
    if config.games.opponent_poll_ms == 0 {
        return Err(anyhow!("Opponent search poll interval must be greater than 0"));
    }

    if config.matching.stale_search_seconds == 0 {
        return Err(anyhow!("Stale search threshold must be greater than 0"));
    }

    config.vip.validate()?;

    Ok(())
}
