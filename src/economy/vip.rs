//! VIP subscription grants and purchases
//!
//! A grant extends the current expiry rather than overwriting it; the tier
//! label is derived from cumulative days ever purchased.

use crate::config::VipSettings;
use crate::economy::ledger::Ledger;
use crate::error::{DuetError, Result};
use crate::storage::Storage;
use crate::types::{UserId, UserUpdate, VipTier};
use crate::utils::current_timestamp;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::info;

/// Current subscription state of a user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VipStatus {
    pub active: bool,
    pub until: Option<DateTime<Utc>>,
    pub days_left: i64,
    pub tier: VipTier,
}

/// Result of a successful grant or purchase
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VipGrant {
    pub until: DateTime<Utc>,
    pub tier: VipTier,
}

/// VIP subscription management on top of the ledger
pub struct VipDesk {
    storage: Arc<dyn Storage>,
    ledger: Arc<Ledger>,
    prices: VipSettings,
}

impl VipDesk {
    pub fn new(storage: Arc<dyn Storage>, ledger: Arc<Ledger>, prices: VipSettings) -> Self {
        Self {
            storage,
            ledger,
            prices,
        }
    }

    pub fn status(&self, user: UserId) -> Result<VipStatus> {
        let now = current_timestamp();
        let profile = self
            .storage
            .get_user(user)?
            .ok_or(DuetError::UnknownUser { user_id: user })?;

        let active = profile.is_vip(now);
        let days_left = profile
            .vip_until
            .filter(|until| *until > now)
            .map(|until| (until - now).num_days())
            .unwrap_or(0);

        Ok(VipStatus {
            active,
            until: profile.vip_until,
            days_left,
            tier: profile.vip_tier(),
        })
    }

    /// Extend the subscription: expiry moves to
    /// `max(now, current_expiry) + days`, so an active subscription is
    /// extended and an expired one restarts from now
    pub fn grant(&self, user: UserId, days: u32) -> Result<VipGrant> {
        let now = current_timestamp();
        let profile = self
            .storage
            .get_user(user)?
            .ok_or(DuetError::UnknownUser { user_id: user })?;

        let base = profile.vip_until.filter(|until| *until > now).unwrap_or(now);
        let until = base + Duration::seconds(i64::from(days) * 86_400);
        let total = profile.vip_days_total + days;

        self.storage.upsert_user(
            user,
            UserUpdate {
                vip_until: Some(until),
                vip_days_total: Some(total),
                ..Default::default()
            },
        )?;

        let tier = VipTier::from_cumulative_days(total);
        info!("granted {}d VIP to {} (until {}, tier {})", days, user, until, tier);

        Ok(VipGrant { until, tier })
    }

    /// Purchase with stars at the configured price
    pub fn purchase_with_stars(&self, user: UserId, days: u32) -> Result<VipGrant> {
        let package = self
            .prices
            .package_for(days)
            .ok_or_else(|| DuetError::InvalidRequest {
                reason: format!("no {}-day VIP package", days),
            })?;

        if !self.ledger.consume_stars(user, package.stars_price)? {
            let available = self
                .storage
                .get_user(user)?
                .map(|p| p.stars)
                .unwrap_or(0);
            return Err(DuetError::InsufficientBalance {
                needed: package.stars_price,
                available,
            }
            .into());
        }
        self.grant(user, days)
    }

    /// Purchase with points at the configured price
    pub fn purchase_with_points(&self, user: UserId, days: u32) -> Result<VipGrant> {
        let package = self
            .prices
            .package_for(days)
            .ok_or_else(|| DuetError::InvalidRequest {
                reason: format!("no {}-day VIP package", days),
            })?;

        if !self.ledger.consume_points(user, package.points_price)? {
            let available = self
                .storage
                .get_user(user)?
                .map(|p| p.points)
                .unwrap_or(0);
            return Err(DuetError::InsufficientBalance {
                needed: package.points_price,
                available,
            }
            .into());
        }
        self.grant(user, days)
    }
}
