//! Persistence interface for users, the waiting pool, sessions, and games
//!
//! One trait, one implementation per target backend. The in-memory
//! implementation backs tests and embedded deployments; a networked store
//! implements the same trait without the engines noticing.

pub mod memory;

pub use memory::MemoryStorage;

use crate::error::Result;
use crate::types::{
    ChatSession, GameRecord, Gender, SessionId, UserId, UserProfile, UserStatus, UserUpdate,
};
use chrono::{DateTime, Utc};

/// Which balance an atomic operation targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceField {
    Points,
    Stars,
}

/// Eligibility criteria for taking a candidate out of the waiting pool.
///
/// A candidate is eligible when it is not the seeker, not banned, still in
/// `Searching` status, satisfies `wanted` (candidate gender equals the
/// requested one; `Unset` never satisfies a filter), and — if the candidate
/// itself waits with a filter — the seeker's gender satisfies it in turn.
#[derive(Debug, Clone)]
pub struct MatchCriteria {
    pub seeker: UserId,
    pub seeker_gender: Gender,
    pub wanted: Option<Gender>,
    pub now: DateTime<Utc>,
}

/// Persistence collaborator used by every engine.
///
/// Compound read-then-write operations (`take_waiting`, `atomic_incr`,
/// `consume_up_to`, `create_session`) are critical sections: implementations
/// must guarantee that no two concurrent callers pop the same waiting user,
/// double-spend the same balance, or create overlapping sessions.
pub trait Storage: Send + Sync {
    // -- users --

    /// Create the user on first contact, or refresh name and last-seen
    fn ensure_user(&self, id: UserId, display_name: &str) -> Result<UserProfile>;

    fn get_user(&self, id: UserId) -> Result<Option<UserProfile>>;

    /// Apply a field-mask update and return the new profile
    fn upsert_user(&self, id: UserId, update: UserUpdate) -> Result<UserProfile>;

    fn set_status(&self, id: UserId, status: UserStatus, partner: Option<UserId>) -> Result<()>;

    /// Guarded balance adjustment; fails with `InsufficientBalance` instead
    /// of ever producing a negative balance. Returns the new value.
    fn atomic_incr(&self, id: UserId, field: BalanceField, delta: i64) -> Result<u64>;

    /// Clamped deduction: removes `min(amount, balance)` and returns the
    /// amount actually removed
    fn consume_up_to(&self, id: UserId, field: BalanceField, amount: u64) -> Result<u64>;

    fn remove_user(&self, id: UserId) -> Result<bool>;

    fn list_users(&self) -> Result<Vec<UserProfile>>;

    // -- waiting pool --

    /// Insert or refresh a pool entry
    fn add_waiting(&self, id: UserId, filter: Option<Gender>) -> Result<()>;

    fn remove_waiting(&self, id: UserId) -> Result<bool>;

    /// Atomically pop one eligible candidate, chosen uniformly at random
    /// among all eligible entries
    fn take_waiting(&self, criteria: &MatchCriteria) -> Result<Option<UserId>>;

    fn list_waiting(&self, filter: Option<Gender>) -> Result<Vec<UserId>>;

    /// Remove entries older than the cutoff and return them
    fn purge_stale_waiting(&self, older_than: DateTime<Utc>) -> Result<Vec<UserId>>;

    // -- chat sessions --

    /// Atomically create an active session; fails if either side already
    /// has one
    fn create_session(&self, a: UserId, b: UserId) -> Result<ChatSession>;

    /// Mark a session inactive; `None` if it was already closed or unknown,
    /// keeping callers idempotent
    fn close_session(&self, id: SessionId) -> Result<Option<ChatSession>>;

    fn find_session_for(&self, user: UserId) -> Result<Option<ChatSession>>;

    /// Most recent partner of `user`, active session first, then closed ones
    fn last_partner_of(&self, user: UserId) -> Result<Option<UserId>>;

    fn bump_session_messages(&self, id: SessionId) -> Result<()>;

    // -- games --

    fn record_game(&self, record: GameRecord) -> Result<()>;

    fn game_history(&self, user: UserId) -> Result<Vec<GameRecord>>;
}
