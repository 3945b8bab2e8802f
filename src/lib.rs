//! Duet - anonymous 1:1 chat matchmaking core
//!
//! This crate pairs anonymous users for one-on-one conversation, relays
//! their messages, runs two mini-games, and tracks a points/stars economy
//! with a VIP tier. The chat platform, payment provider, and persistence
//! backend are collaborators behind traits.

pub mod config;
pub mod directory;
pub mod economy;
pub mod error;
pub mod games;
pub mod gateway;
pub mod maintenance;
pub mod matching;
pub mod metrics;
pub mod relay;
pub mod service;
pub mod storage;
pub mod transport;
pub mod types;
pub mod utils;

// Re-export commonly used types and traits
pub use error::{DuetError, Result};
pub use types::*;

// Re-export key components
pub use gateway::Gateway;
pub use matching::MatchEngine;
pub use service::AppState;
pub use storage::{MemoryStorage, Storage};
pub use transport::{MockOutbound, Outbound};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
