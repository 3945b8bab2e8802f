//! Multi-step conversation flows
//!
//! Each flow is a tagged variant carrying only the fields relevant to its
//! step, so an invalid transition is unrepresentable instead of being a
//! string comparison that can drift.

use crate::error::{DuetError, Result};
use crate::types::{Gender, UserId};
use crate::utils::current_timestamp;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::RwLock;

/// Where a user currently is inside a multi-step interaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flow {
    /// Gender-filtered search: waiting for the target gender
    ChoosingSearchGender,
    /// Gender-filtered search: waiting for the fee confirmation
    ConfirmingSearch { wanted: Gender },
    /// Settings: waiting for the new gender
    UpdatingGender,
    /// Settings: waiting for the new age
    UpdatingAge,
    /// Settings: waiting for the new country
    UpdatingCountry,
    /// Guess game: free-text guesses route here
    Guessing,
    /// Gift: waiting for "<user id> <amount>"
    GiftingPoints,
}

#[derive(Debug, Clone)]
struct FlowState {
    flow: Flow,
    entered_at: DateTime<Utc>,
}

/// Guarded per-user flow table
#[derive(Debug, Default)]
pub struct FlowTable {
    inner: RwLock<HashMap<UserId, FlowState>>,
}

impl FlowTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_err() -> DuetError {
        DuetError::Internal {
            message: "failed to acquire flow table lock".to_string(),
        }
    }

    pub fn set(&self, user: UserId, flow: Flow) -> Result<()> {
        let mut inner = self.inner.write().map_err(|_| Self::lock_err())?;
        inner.insert(
            user,
            FlowState {
                flow,
                entered_at: current_timestamp(),
            },
        );
        Ok(())
    }

    pub fn get(&self, user: UserId) -> Result<Option<Flow>> {
        let inner = self.inner.read().map_err(|_| Self::lock_err())?;
        Ok(inner.get(&user).map(|state| state.flow.clone()))
    }

    pub fn clear(&self, user: UserId) -> Result<()> {
        let mut inner = self.inner.write().map_err(|_| Self::lock_err())?;
        inner.remove(&user);
        Ok(())
    }

    /// Drop flows idle for longer than `max_age`; returns how many
    pub fn purge_stale(&self, max_age: Duration) -> Result<usize> {
        let cutoff = current_timestamp() - max_age;
        let mut inner = self.inner.write().map_err(|_| Self::lock_err())?;
        let before = inner.len();
        inner.retain(|_, state| state.entered_at >= cutoff);
        Ok(before - inner.len())
    }

    pub fn len(&self) -> Result<usize> {
        let inner = self.inner.read().map_err(|_| Self::lock_err())?;
        Ok(inner.len())
    }
}
