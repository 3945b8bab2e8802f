//! Error types for the matchmaking core
//!
//! User-facing failures, partner-delivery failures, and persistence failures
//! are separate variants so callers can decide between a polite reply, a
//! session teardown, and a retry hint.

use crate::types::{GameId, UserId};
use chrono::{DateTime, Utc};

/// Result type alias for convenience
pub type Result<T> = anyhow::Result<T>;

/// Custom error types for specific matchmaking scenarios
#[derive(Debug, thiserror::Error)]
pub enum DuetError {
    #[error("insufficient balance: need {needed}, have {available}")]
    InsufficientBalance { needed: u64, available: u64 },

    #[error("user {user_id} is banned until {until}")]
    Banned { user_id: UserId, until: DateTime<Utc> },

    #[error("user {user_id} is already in an active chat")]
    AlreadyInChat { user_id: UserId },

    #[error("user {user_id} is already in an active game")]
    AlreadyInGame { user_id: UserId },

    #[error("invalid move: {reason}")]
    InvalidMove { reason: String },

    #[error("unknown or finished game: {game_id}")]
    UnknownGame { game_id: GameId },

    #[error("no active session for user {user_id}")]
    NoActiveSession { user_id: UserId },

    #[error("unknown user: {user_id}")]
    UnknownUser { user_id: UserId },

    #[error("invalid request: {reason}")]
    InvalidRequest { reason: String },

    #[error("partner {partner} unreachable")]
    PartnerUnreachable { partner: UserId },

    #[error("persistence error: {message}")]
    Persistence { message: String },

    #[error("configuration error: {message}")]
    Configuration { message: String },

    #[error("internal error: {message}")]
    Internal { message: String },
}

impl DuetError {
    /// Whether this error is recoverable with a user-facing message and has
    /// no system impact (balance too low, bad move, stale reference, ...).
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            DuetError::InsufficientBalance { .. }
                | DuetError::Banned { .. }
                | DuetError::AlreadyInChat { .. }
                | DuetError::AlreadyInGame { .. }
                | DuetError::InvalidMove { .. }
                | DuetError::UnknownGame { .. }
                | DuetError::NoActiveSession { .. }
                | DuetError::UnknownUser { .. }
                | DuetError::InvalidRequest { .. }
        )
    }
}
