//! User directory: canonical participant records and profile mutation
//!
//! Creation happens on first contact; the inactivity sweep is the only
//! deletion path. Fee-charged profile changes route through the ledger.

use crate::config::EconomySettings;
use crate::economy::Ledger;
use crate::error::{DuetError, Result};
use crate::storage::Storage;
use crate::types::{Gender, UserId, UserProfile, UserStatus, UserUpdate};
use crate::utils::current_timestamp;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info};

/// Result of a gender change request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenderChangeOutcome {
    /// First-time set, free of charge
    Set,
    /// Change of an already-set gender, fee charged
    Changed { fee: u64 },
}

/// Directory of participants
pub struct UserDirectory {
    storage: Arc<dyn Storage>,
    ledger: Arc<Ledger>,
    settings: EconomySettings,
}

impl UserDirectory {
    pub fn new(storage: Arc<dyn Storage>, ledger: Arc<Ledger>, settings: EconomySettings) -> Self {
        Self {
            storage,
            ledger,
            settings,
        }
    }

    /// Create on first contact, refresh name and last-seen otherwise
    pub fn ensure_user(&self, id: UserId, display_name: &str) -> Result<UserProfile> {
        self.storage.ensure_user(id, display_name)
    }

    pub fn profile(&self, id: UserId) -> Result<UserProfile> {
        self.storage
            .get_user(id)?
            .ok_or_else(|| DuetError::UnknownUser { user_id: id }.into())
    }

    /// Set or change gender. The first set is free; changing an already-set
    /// gender costs the configured fee, charged through the guarded ledger.
    pub fn set_gender(&self, id: UserId, gender: Gender) -> Result<GenderChangeOutcome> {
        if gender == Gender::Unset {
            return Err(DuetError::InvalidRequest {
                reason: "gender cannot be reset to unset".to_string(),
            }
            .into());
        }

        let profile = self.profile(id)?;
        let outcome = if profile.gender == Gender::Unset {
            GenderChangeOutcome::Set
        } else if profile.gender == gender {
            return Err(DuetError::InvalidRequest {
                reason: format!("gender is already {}", gender),
            }
            .into());
        } else {
            let fee = self.settings.gender_change_cost;
            if !self.ledger.consume_points(id, fee)? {
                return Err(DuetError::InsufficientBalance {
                    needed: fee,
                    available: profile.points,
                }
                .into());
            }
            GenderChangeOutcome::Changed { fee }
        };

        self.storage.upsert_user(
            id,
            UserUpdate {
                gender: Some(gender),
                ..Default::default()
            },
        )?;
        debug!("user {} gender set to {}", id, gender);

        Ok(outcome)
    }

    pub fn set_age(&self, id: UserId, age: u8) -> Result<()> {
        if !(13..=99).contains(&age) {
            return Err(DuetError::InvalidRequest {
                reason: format!("age {} out of the accepted 13..=99 range", age),
            }
            .into());
        }
        self.storage.upsert_user(
            id,
            UserUpdate {
                age: Some(age),
                ..Default::default()
            },
        )?;
        Ok(())
    }

    pub fn set_country(&self, id: UserId, country: &str) -> Result<()> {
        let country = country.trim();
        if country.is_empty() {
            return Err(DuetError::InvalidRequest {
                reason: "country cannot be empty".to_string(),
            }
            .into());
        }
        self.storage.upsert_user(
            id,
            UserUpdate {
                country: Some(country.to_string()),
                ..Default::default()
            },
        )?;
        Ok(())
    }

    /// Rate the current (or most recent) chat partner, 1..=5 stars
    pub fn rate_partner(&self, rater: UserId, rated: UserId, score: u8) -> Result<()> {
        if !(1..=5).contains(&score) {
            return Err(DuetError::InvalidRequest {
                reason: format!("rating {} out of the 1..=5 range", score),
            }
            .into());
        }
        if self.storage.last_partner_of(rater)? != Some(rated) {
            return Err(DuetError::InvalidRequest {
                reason: "only the current or most recent partner can be rated".to_string(),
            }
            .into());
        }

        self.storage.upsert_user(
            rated,
            UserUpdate {
                add_rating: Some(score),
                ..Default::default()
            },
        )?;
        Ok(())
    }

    /// Credit an inviter for a confirmed referral
    pub fn record_referral(&self, inviter: UserId) -> Result<u64> {
        self.storage.upsert_user(
            inviter,
            UserUpdate {
                add_referral: true,
                ..Default::default()
            },
        )?;
        self.ledger.add_points(inviter, self.settings.referral_points)
    }

    pub fn ban(&self, id: UserId, until: DateTime<Utc>) -> Result<()> {
        self.storage.upsert_user(
            id,
            UserUpdate {
                banned_until: Some(Some(until)),
                ..Default::default()
            },
        )?;
        info!("user {} banned until {}", id, until);
        Ok(())
    }

    pub fn lift_ban(&self, id: UserId) -> Result<()> {
        self.storage.upsert_user(
            id,
            UserUpdate {
                banned_until: Some(None),
                ..Default::default()
            },
        )?;
        Ok(())
    }

    /// Remove idle users not seen for the configured number of days.
    /// Returns how many were removed.
    pub fn sweep_inactive(&self) -> Result<usize> {
        let cutoff =
            current_timestamp() - Duration::days(i64::from(self.settings.inactive_sweep_days));
        let mut removed = 0;

        for profile in self.storage.list_users()? {
            if profile.status == UserStatus::Idle && profile.last_seen < cutoff {
                if self.storage.remove_user(profile.id)? {
                    removed += 1;
                }
            }
        }

        if removed > 0 {
            info!("inactivity sweep removed {} users", removed);
        }
        Ok(removed)
    }
}
