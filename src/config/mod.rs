//! Configuration management for the duet service
//!
//! This module handles all configuration loading from environment variables
//! and TOML files, validation, and default values for the matchmaking core.

pub mod app;
pub mod vip;

// Re-export commonly used types
pub use app::{
    validate_config, AppConfig, EconomySettings, GameSettings, MatchingSettings, RelaySettings,
    ServiceSettings,
};
pub use vip::{VipPackage, VipSettings};
