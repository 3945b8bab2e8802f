//! In-memory storage implementation
//!
//! One lock per shared structure; every compound read-then-write runs
//! entirely inside a single lock scope. Lock ordering where two structures
//! are touched: pool before users, sessions before users.

use crate::error::{DuetError, Result};
use crate::storage::{BalanceField, MatchCriteria, Storage};
use crate::types::{
    ChatSession, GameRecord, Gender, SessionId, UserId, UserProfile, UserStatus, UserUpdate,
};
use crate::utils::{current_timestamp, generate_session_id};
use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

#[derive(Debug, Clone)]
struct WaitingEntry {
    filter: Option<Gender>,
    joined_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct SessionTable {
    by_id: HashMap<SessionId, ChatSession>,
    active_by_user: HashMap<UserId, SessionId>,
}

/// Guarded in-memory implementation of the `Storage` trait
#[derive(Default)]
pub struct MemoryStorage {
    users: RwLock<HashMap<UserId, UserProfile>>,
    pool: Mutex<HashMap<UserId, WaitingEntry>>,
    sessions: Mutex<SessionTable>,
    games: Mutex<Vec<GameRecord>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_err(what: &str) -> DuetError {
        DuetError::Persistence {
            message: format!("failed to acquire {} lock", what),
        }
    }

    fn balance_of(profile: &UserProfile, field: BalanceField) -> u64 {
        match field {
            BalanceField::Points => profile.points,
            BalanceField::Stars => profile.stars,
        }
    }

    fn set_balance(profile: &mut UserProfile, field: BalanceField, value: u64) {
        match field {
            BalanceField::Points => profile.points = value,
            BalanceField::Stars => profile.stars = value,
        }
    }

    fn apply_update(profile: &mut UserProfile, update: UserUpdate, now: DateTime<Utc>) {
        if let Some(name) = update.display_name {
            profile.display_name = name;
        }
        if let Some(gender) = update.gender {
            profile.gender = gender;
        }
        if let Some(age) = update.age {
            profile.age = Some(age);
        }
        if let Some(country) = update.country {
            profile.country = Some(country);
        }
        if let Some(level) = update.level {
            profile.level = level;
        }
        if let Some(vip_until) = update.vip_until {
            profile.vip_until = Some(vip_until);
        }
        if let Some(total) = update.vip_days_total {
            profile.vip_days_total = total;
        }
        if let Some(banned_until) = update.banned_until {
            profile.banned_until = banned_until;
        }
        if let Some(score) = update.add_rating {
            profile.rating_sum += u64::from(score);
            profile.rating_count += 1;
        }
        if update.add_referral {
            profile.referrals += 1;
        }
        if let Some(at) = update.last_bonus_at {
            profile.last_bonus_at = Some(at);
        }
        if update.touch_last_seen {
            profile.last_seen = now;
        }
    }
}

impl Storage for MemoryStorage {
    fn ensure_user(&self, id: UserId, display_name: &str) -> Result<UserProfile> {
        let now = current_timestamp();
        let mut users = self.users.write().map_err(|_| Self::lock_err("users"))?;

        let profile = users
            .entry(id)
            .or_insert_with(|| UserProfile::new(id, display_name, now));
        if !display_name.is_empty() {
            profile.display_name = display_name.to_string();
        }
        profile.last_seen = now;

        Ok(profile.clone())
    }

    fn get_user(&self, id: UserId) -> Result<Option<UserProfile>> {
        let users = self.users.read().map_err(|_| Self::lock_err("users"))?;
        Ok(users.get(&id).cloned())
    }

    fn upsert_user(&self, id: UserId, update: UserUpdate) -> Result<UserProfile> {
        let now = current_timestamp();
        let mut users = self.users.write().map_err(|_| Self::lock_err("users"))?;

        let profile = users
            .get_mut(&id)
            .ok_or(DuetError::UnknownUser { user_id: id })?;
        Self::apply_update(profile, update, now);

        Ok(profile.clone())
    }

    fn set_status(&self, id: UserId, status: UserStatus, partner: Option<UserId>) -> Result<()> {
        let mut users = self.users.write().map_err(|_| Self::lock_err("users"))?;

        let profile = users
            .get_mut(&id)
            .ok_or(DuetError::UnknownUser { user_id: id })?;
        profile.status = status;
        profile.partner = partner;

        Ok(())
    }

    fn atomic_incr(&self, id: UserId, field: BalanceField, delta: i64) -> Result<u64> {
        let mut users = self.users.write().map_err(|_| Self::lock_err("users"))?;

        let profile = users
            .get_mut(&id)
            .ok_or(DuetError::UnknownUser { user_id: id })?;
        let current = Self::balance_of(profile, field);

        let new_value = if delta >= 0 {
            current.saturating_add(delta as u64)
        } else {
            let debit = delta.unsigned_abs();
            if current < debit {
                return Err(DuetError::InsufficientBalance {
                    needed: debit,
                    available: current,
                }
                .into());
            }
            current - debit
        };

        Self::set_balance(profile, field, new_value);
        Ok(new_value)
    }

    fn consume_up_to(&self, id: UserId, field: BalanceField, amount: u64) -> Result<u64> {
        let mut users = self.users.write().map_err(|_| Self::lock_err("users"))?;

        let profile = users
            .get_mut(&id)
            .ok_or(DuetError::UnknownUser { user_id: id })?;
        let current = Self::balance_of(profile, field);
        let deducted = current.min(amount);

        Self::set_balance(profile, field, current - deducted);
        Ok(deducted)
    }

    fn remove_user(&self, id: UserId) -> Result<bool> {
        let mut users = self.users.write().map_err(|_| Self::lock_err("users"))?;
        Ok(users.remove(&id).is_some())
    }

    fn list_users(&self) -> Result<Vec<UserProfile>> {
        let users = self.users.read().map_err(|_| Self::lock_err("users"))?;
        Ok(users.values().cloned().collect())
    }

    fn add_waiting(&self, id: UserId, filter: Option<Gender>) -> Result<()> {
        let mut pool = self.pool.lock().map_err(|_| Self::lock_err("pool"))?;
        pool.insert(
            id,
            WaitingEntry {
                filter,
                joined_at: current_timestamp(),
            },
        );
        Ok(())
    }

    fn remove_waiting(&self, id: UserId) -> Result<bool> {
        let mut pool = self.pool.lock().map_err(|_| Self::lock_err("pool"))?;
        Ok(pool.remove(&id).is_some())
    }

    fn take_waiting(&self, criteria: &MatchCriteria) -> Result<Option<UserId>> {
        // Pool lock first, users lock second; held together so the pop and
        // the eligibility check cannot race a concurrent take
        let mut pool = self.pool.lock().map_err(|_| Self::lock_err("pool"))?;
        let users = self.users.read().map_err(|_| Self::lock_err("users"))?;

        let eligible: Vec<UserId> = pool
            .iter()
            .filter(|(candidate, entry)| {
                if **candidate == criteria.seeker {
                    return false;
                }
                let profile = match users.get(*candidate) {
                    Some(profile) => profile,
                    None => return false,
                };
                if profile.is_banned(criteria.now) || profile.status != UserStatus::Searching {
                    return false;
                }
                // An unset gender never satisfies a filtered lookup
                if let Some(wanted) = criteria.wanted {
                    if profile.gender != wanted {
                        return false;
                    }
                }
                // The candidate's own filter must accept the seeker too
                if let Some(required) = entry.filter {
                    if criteria.seeker_gender != required {
                        return false;
                    }
                }
                true
            })
            .map(|(candidate, _)| *candidate)
            .collect();

        let chosen = eligible.choose(&mut rand::thread_rng()).copied();
        if let Some(id) = chosen {
            pool.remove(&id);
        }
        Ok(chosen)
    }

    fn list_waiting(&self, filter: Option<Gender>) -> Result<Vec<UserId>> {
        let pool = self.pool.lock().map_err(|_| Self::lock_err("pool"))?;
        Ok(pool
            .iter()
            .filter(|(_, entry)| filter.is_none() || entry.filter == filter)
            .map(|(id, _)| *id)
            .collect())
    }

    fn purge_stale_waiting(&self, older_than: DateTime<Utc>) -> Result<Vec<UserId>> {
        let mut pool = self.pool.lock().map_err(|_| Self::lock_err("pool"))?;

        let stale: Vec<UserId> = pool
            .iter()
            .filter(|(_, entry)| entry.joined_at < older_than)
            .map(|(id, _)| *id)
            .collect();
        for id in &stale {
            pool.remove(id);
        }
        Ok(stale)
    }

    fn create_session(&self, a: UserId, b: UserId) -> Result<ChatSession> {
        let mut sessions = self.sessions.lock().map_err(|_| Self::lock_err("sessions"))?;

        if sessions.active_by_user.contains_key(&a) {
            return Err(DuetError::AlreadyInChat { user_id: a }.into());
        }
        if sessions.active_by_user.contains_key(&b) {
            return Err(DuetError::AlreadyInChat { user_id: b }.into());
        }

        let session = ChatSession {
            id: generate_session_id(),
            a,
            b,
            started_at: current_timestamp(),
            active: true,
            messages: 0,
        };
        sessions.active_by_user.insert(a, session.id);
        sessions.active_by_user.insert(b, session.id);
        sessions.by_id.insert(session.id, session.clone());

        Ok(session)
    }

    fn close_session(&self, id: SessionId) -> Result<Option<ChatSession>> {
        let mut sessions = self.sessions.lock().map_err(|_| Self::lock_err("sessions"))?;

        let session = match sessions.by_id.get_mut(&id) {
            Some(session) if session.active => {
                session.active = false;
                session.clone()
            }
            _ => return Ok(None),
        };
        sessions.active_by_user.remove(&session.a);
        sessions.active_by_user.remove(&session.b);

        Ok(Some(session))
    }

    fn find_session_for(&self, user: UserId) -> Result<Option<ChatSession>> {
        let sessions = self.sessions.lock().map_err(|_| Self::lock_err("sessions"))?;
        Ok(sessions
            .active_by_user
            .get(&user)
            .and_then(|id| sessions.by_id.get(id))
            .cloned())
    }

    fn last_partner_of(&self, user: UserId) -> Result<Option<UserId>> {
        let sessions = self.sessions.lock().map_err(|_| Self::lock_err("sessions"))?;

        let mut latest: Option<&ChatSession> = None;
        for session in sessions.by_id.values() {
            if session.partner_of(user).is_none() {
                continue;
            }
            if session.active {
                return Ok(session.partner_of(user));
            }
            if latest
                .map(|best| session.started_at > best.started_at)
                .unwrap_or(true)
            {
                latest = Some(session);
            }
        }
        Ok(latest.and_then(|session| session.partner_of(user)))
    }

    fn bump_session_messages(&self, id: SessionId) -> Result<()> {
        let mut sessions = self.sessions.lock().map_err(|_| Self::lock_err("sessions"))?;
        if let Some(session) = sessions.by_id.get_mut(&id) {
            session.messages += 1;
        }
        Ok(())
    }

    fn record_game(&self, record: GameRecord) -> Result<()> {
        let mut games = self.games.lock().map_err(|_| Self::lock_err("games"))?;
        games.push(record);
        Ok(())
    }

    fn game_history(&self, user: UserId) -> Result<Vec<GameRecord>> {
        let games = self.games.lock().map_err(|_| Self::lock_err("games"))?;
        Ok(games
            .iter()
            .filter(|record| record.players.contains(&user))
            .cloned()
            .collect())
    }
}
