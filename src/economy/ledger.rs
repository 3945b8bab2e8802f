//! Guarded add/consume operations on the two virtual currencies
//!
//! Every point-consuming feature (search fees, gender change, word
//! penalties, game losses, gifts) routes through this ledger; nothing else
//! mutates balances directly.

use crate::config::EconomySettings;
use crate::error::{DuetError, Result};
use crate::storage::{BalanceField, Storage};
use crate::types::UserId;
use crate::utils::{current_timestamp, level_for_points};
use chrono::Duration;
use std::sync::Arc;
use tracing::debug;

/// Result of a periodic bonus claim
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BonusOutcome {
    Granted { points: u64 },
    Cooldown { remaining_seconds: i64 },
}

/// Atomic economy operations over the persistence collaborator
pub struct Ledger {
    storage: Arc<dyn Storage>,
    settings: EconomySettings,
}

impl Ledger {
    pub fn new(storage: Arc<dyn Storage>, settings: EconomySettings) -> Self {
        Self { storage, settings }
    }

    /// Unconditional credit; recomputes the cosmetic level
    pub fn add_points(&self, user: UserId, amount: u64) -> Result<u64> {
        let new_balance = self
            .storage
            .atomic_incr(user, BalanceField::Points, amount as i64)?;
        self.storage.upsert_user(
            user,
            crate::types::UserUpdate {
                level: Some(level_for_points(new_balance)),
                ..Default::default()
            },
        )?;

        debug!("credited {} points to {} (now {})", amount, user, new_balance);
        Ok(new_balance)
    }

    /// Guarded deduction: succeeds only if the balance covers the full
    /// amount, otherwise fails without side effects
    pub fn consume_points(&self, user: UserId, amount: u64) -> Result<bool> {
        match self
            .storage
            .atomic_incr(user, BalanceField::Points, -(amount as i64))
        {
            Ok(_) => Ok(true),
            Err(err) => {
                if matches!(
                    err.downcast_ref::<DuetError>(),
                    Some(DuetError::InsufficientBalance { .. })
                ) {
                    Ok(false)
                } else {
                    Err(err)
                }
            }
        }
    }

    /// Clamped deduction used where the balance floors at zero instead of
    /// failing (word penalties, board-game stakes). Returns the amount
    /// actually removed.
    pub fn penalize_points(&self, user: UserId, amount: u64) -> Result<u64> {
        self.storage.consume_up_to(user, BalanceField::Points, amount)
    }

    pub fn add_stars(&self, user: UserId, amount: u64) -> Result<u64> {
        self.storage
            .atomic_incr(user, BalanceField::Stars, amount as i64)
    }

    pub fn consume_stars(&self, user: UserId, amount: u64) -> Result<bool> {
        match self
            .storage
            .atomic_incr(user, BalanceField::Stars, -(amount as i64))
        {
            Ok(_) => Ok(true),
            Err(err) => {
                if matches!(
                    err.downcast_ref::<DuetError>(),
                    Some(DuetError::InsufficientBalance { .. })
                ) {
                    Ok(false)
                } else {
                    Err(err)
                }
            }
        }
    }

    /// Zero-sum transfer clamped to the sender's balance; returns the
    /// amount actually moved
    pub fn transfer_points_clamped(&self, from: UserId, to: UserId, amount: u64) -> Result<u64> {
        let moved = self.penalize_points(from, amount)?;
        if moved > 0 {
            self.add_points(to, moved)?;
        }
        Ok(moved)
    }

    /// Strict zero-sum transfer: the full amount or a `UserError`
    pub fn gift_points(&self, from: UserId, to: UserId, amount: u64) -> Result<()> {
        if amount == 0 {
            return Err(DuetError::InvalidRequest {
                reason: "gift amount must be greater than zero".to_string(),
            }
            .into());
        }
        if self.storage.get_user(to)?.is_none() {
            return Err(DuetError::UnknownUser { user_id: to }.into());
        }

        let sender = self
            .storage
            .get_user(from)?
            .ok_or(DuetError::UnknownUser { user_id: from })?;
        if !self.consume_points(from, amount)? {
            return Err(DuetError::InsufficientBalance {
                needed: amount,
                available: sender.points,
            }
            .into());
        }
        self.add_points(to, amount)?;

        debug!("gift of {} points: {} -> {}", amount, from, to);
        Ok(())
    }

    /// Periodic bonus claim, rate-limited by the configured cooldown
    pub fn claim_bonus(&self, user: UserId) -> Result<BonusOutcome> {
        let now = current_timestamp();
        let profile = self
            .storage
            .get_user(user)?
            .ok_or(DuetError::UnknownUser { user_id: user })?;

        let cooldown = Duration::seconds(self.settings.bonus_cooldown_seconds as i64);
        if let Some(last) = profile.last_bonus_at {
            let elapsed = now - last;
            if elapsed < cooldown {
                return Ok(BonusOutcome::Cooldown {
                    remaining_seconds: (cooldown - elapsed).num_seconds(),
                });
            }
        }

        self.add_points(user, self.settings.bonus_points)?;
        self.storage.upsert_user(
            user,
            crate::types::UserUpdate {
                last_bonus_at: Some(now),
                ..Default::default()
            },
        )?;

        Ok(BonusOutcome::Granted {
            points: self.settings.bonus_points,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn ledger_with_user(points: u64) -> (Ledger, Arc<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::new());
        storage.ensure_user(1, "alice").unwrap();
        storage.ensure_user(2, "bob").unwrap();
        let ledger = Ledger::new(storage.clone(), EconomySettings::default());
        if points > 0 {
            ledger.add_points(1, points).unwrap();
        }
        (ledger, storage)
    }

    #[test]
    fn test_add_points_recomputes_level() {
        let (ledger, storage) = ledger_with_user(0);
        ledger.add_points(1, 250).unwrap();

        let profile = storage.get_user(1).unwrap().unwrap();
        assert_eq!(profile.points, 250);
        assert_eq!(profile.level, 3);
    }

    #[test]
    fn test_consume_points_guarded() {
        let (ledger, storage) = ledger_with_user(10);

        assert!(ledger.consume_points(1, 10).unwrap());
        assert!(!ledger.consume_points(1, 1).unwrap());
        assert_eq!(storage.get_user(1).unwrap().unwrap().points, 0);
    }

    #[test]
    fn test_penalize_points_floors_at_zero() {
        let (ledger, storage) = ledger_with_user(3);

        assert_eq!(ledger.penalize_points(1, 5).unwrap(), 3);
        assert_eq!(storage.get_user(1).unwrap().unwrap().points, 0);
    }

    #[test]
    fn test_gift_points_requires_full_balance() {
        let (ledger, storage) = ledger_with_user(4);

        let err = ledger.gift_points(1, 2, 5).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DuetError>(),
            Some(DuetError::InsufficientBalance { needed: 5, available: 4 })
        ));
        assert_eq!(storage.get_user(1).unwrap().unwrap().points, 4);
        assert_eq!(storage.get_user(2).unwrap().unwrap().points, 0);

        ledger.gift_points(1, 2, 4).unwrap();
        assert_eq!(storage.get_user(1).unwrap().unwrap().points, 0);
        assert_eq!(storage.get_user(2).unwrap().unwrap().points, 4);
    }

    #[test]
    fn test_stars_balance_is_independent() {
        let (ledger, storage) = ledger_with_user(0);

        ledger.add_stars(1, 7).unwrap();
        assert!(!ledger.consume_points(1, 1).unwrap());
        assert!(ledger.consume_stars(1, 7).unwrap());

        let profile = storage.get_user(1).unwrap().unwrap();
        assert_eq!(profile.stars, 0);
        assert_eq!(profile.points, 0);
    }

    #[test]
    fn test_bonus_claim_respects_cooldown() {
        let (ledger, storage) = ledger_with_user(0);

        assert_eq!(
            ledger.claim_bonus(1).unwrap(),
            BonusOutcome::Granted { points: 3 }
        );
        assert!(matches!(
            ledger.claim_bonus(1).unwrap(),
            BonusOutcome::Cooldown { .. }
        ));
        assert_eq!(storage.get_user(1).unwrap().unwrap().points, 3);
    }
}
