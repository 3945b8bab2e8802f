//! Common types used throughout the matchmaking core

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for users, assigned by the chat platform
pub type UserId = i64;

/// Unique identifier for chat sessions
pub type SessionId = Uuid;

/// Unique identifier for game sessions
pub type GameId = Uuid;

/// Opaque handle to a rendered chat message, used to edit live game boards
pub type MessageRef = i64;

/// Self-declared gender of a participant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Gender {
    Unset,
    Male,
    Female,
}

impl std::fmt::Display for Gender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Gender::Unset => write!(f, "unset"),
            Gender::Male => write!(f, "male"),
            Gender::Female => write!(f, "female"),
        }
    }
}

/// Activity status of a participant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserStatus {
    Idle,
    Searching,
    Chatting,
}

/// VIP tier derived from cumulative purchased days
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum VipTier {
    Member,
    Pro,
    Diamond,
}

impl VipTier {
    /// Tier thresholds are cumulative days ever purchased, not the current
    /// subscription length.
    pub fn from_cumulative_days(days: u32) -> Self {
        if days >= 30 {
            VipTier::Diamond
        } else if days >= 7 {
            VipTier::Pro
        } else {
            VipTier::Member
        }
    }
}

impl std::fmt::Display for VipTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VipTier::Member => write!(f, "Member"),
            VipTier::Pro => write!(f, "Pro"),
            VipTier::Diamond => write!(f, "Diamond"),
        }
    }
}

/// Canonical record of a participant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub display_name: String,
    pub gender: Gender,
    pub age: Option<u8>,
    pub country: Option<String>,
    pub points: u64,
    pub stars: u64,
    /// Cosmetic level derived from points, recomputed on every credit
    pub level: u32,
    pub vip_until: Option<DateTime<Utc>>,
    /// Cumulative VIP days ever purchased, drives the tier label
    pub vip_days_total: u32,
    pub status: UserStatus,
    pub partner: Option<UserId>,
    pub rating_sum: u64,
    pub rating_count: u64,
    pub banned_until: Option<DateTime<Utc>>,
    pub referrals: u32,
    pub last_bonus_at: Option<DateTime<Utc>>,
    pub last_seen: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl UserProfile {
    /// Fresh profile created on first contact
    pub fn new(id: UserId, display_name: &str, now: DateTime<Utc>) -> Self {
        Self {
            id,
            display_name: display_name.to_string(),
            gender: Gender::Unset,
            age: None,
            country: None,
            points: 0,
            stars: 0,
            level: 1,
            vip_until: None,
            vip_days_total: 0,
            status: UserStatus::Idle,
            partner: None,
            rating_sum: 0,
            rating_count: 0,
            banned_until: None,
            referrals: 0,
            last_bonus_at: None,
            last_seen: now,
            created_at: now,
        }
    }

    pub fn is_banned(&self, now: DateTime<Utc>) -> bool {
        self.banned_until.map(|until| until > now).unwrap_or(false)
    }

    pub fn is_vip(&self, now: DateTime<Utc>) -> bool {
        self.vip_until.map(|until| until > now).unwrap_or(false)
    }

    /// Average partner rating, or None before the first rating
    pub fn rating(&self) -> Option<f64> {
        if self.rating_count == 0 {
            None
        } else {
            Some(self.rating_sum as f64 / self.rating_count as f64)
        }
    }

    pub fn vip_tier(&self) -> VipTier {
        VipTier::from_cumulative_days(self.vip_days_total)
    }
}

/// Field-mask update applied through `Storage::upsert_user`.
///
/// `banned_until` is doubly optional so a ban can be lifted (outer Some,
/// inner None) without touching it on unrelated updates (outer None).
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub display_name: Option<String>,
    pub gender: Option<Gender>,
    pub age: Option<u8>,
    pub country: Option<String>,
    pub level: Option<u32>,
    pub vip_until: Option<DateTime<Utc>>,
    pub vip_days_total: Option<u32>,
    pub banned_until: Option<Option<DateTime<Utc>>>,
    pub add_rating: Option<u8>,
    pub add_referral: bool,
    pub last_bonus_at: Option<DateTime<Utc>>,
    pub touch_last_seen: bool,
}

/// An active (or closed) paired conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: SessionId,
    pub a: UserId,
    pub b: UserId,
    pub started_at: DateTime<Utc>,
    pub active: bool,
    pub messages: u64,
}

impl ChatSession {
    /// The other side of the pair, or None if `user` is not a participant
    pub fn partner_of(&self, user: UserId) -> Option<UserId> {
        if user == self.a {
            Some(self.b)
        } else if user == self.b {
            Some(self.a)
        } else {
            None
        }
    }
}

/// Media kinds the relay knows how to forward
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaKind {
    Photo,
    Video,
    Voice,
    Document,
    Sticker,
    Audio,
    /// Anything else the platform may deliver; dropped by the relay
    Unsupported,
}

/// Content of a relayed or outbound message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageContent {
    Text(String),
    /// Media is forwarded by platform file reference, never re-uploaded
    Media { kind: MediaKind, file: String },
}

/// Hints for the transport layer about which controls to attach
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlHint {
    MainMenu,
    ChatControls,
    SearchControls,
    /// Render the 3x3 board keyboard for this game
    Board { game_id: GameId },
    /// Show a typing indicator instead of content
    Typing,
}

/// A message emitted toward a user through the `Outbound` trait
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub content: MessageContent,
    pub control: Option<ControlHint>,
}

impl OutboundMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: MessageContent::Text(text.into()),
            control: None,
        }
    }

    pub fn with_control(mut self, control: ControlHint) -> Self {
        self.control = Some(control);
        self
    }

    /// Forward relayed content unmodified
    pub fn forward(content: MessageContent) -> Self {
        Self {
            content,
            control: None,
        }
    }

    pub fn typing() -> Self {
        Self {
            content: MessageContent::Text(String::new()),
            control: Some(ControlHint::Typing),
        }
    }
}

/// Button actions arriving from a game keyboard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameAction {
    /// Claim a board cell (0..=8)
    Move(u8),
    Restart,
    Exit,
    /// Start searching for a random board-game opponent
    RandomOpponent,
    CancelRandom,
    NewGuess,
}

/// Result of a search request: pairing or pool insertion
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    Matched {
        session_id: SessionId,
        partner: UserId,
    },
    Waiting,
}

/// Result of a stop-search request; all three are informational
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopSearchOutcome {
    Stopped,
    InChat,
    NotSearching,
}

/// Result of an end-chat request; `NotInChat` keeps the call idempotent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndChatOutcome {
    Ended { partner: UserId },
    NotInChat,
}

/// What the relay did with one inbound message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Forwarded to the partner; `penalty` points were deducted for
    /// filtered words (0 for clean messages)
    Forwarded { penalty: u64 },
    /// Sender has no active session or the content kind is unsupported
    Dropped,
}

/// Kind of a recorded game
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameKind {
    Board,
    Guess,
}

impl std::fmt::Display for GameKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GameKind::Board => write!(f, "board"),
            GameKind::Guess => write!(f, "guess"),
        }
    }
}

/// Settled game appended to the persistence collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameRecord {
    pub game_id: GameId,
    pub kind: GameKind,
    pub players: Vec<UserId>,
    pub winner: Option<UserId>,
    /// Net points moved to the winner (or lost by the owner for guess games)
    pub points_delta: i64,
    pub finished_at: DateTime<Utc>,
}
