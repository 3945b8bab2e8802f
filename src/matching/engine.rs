//! Matching engine implementation
//!
//! Pairs users wanting a conversation partner, with an optional gender
//! filter, and owns the chat-session lifecycle. Candidate selection is an
//! unconditional random choice among eligible pool entries so the earliest
//! joiner is not matched every time. A failed partner notification rolls
//! the whole match back: no residual session, both sides idle, neither
//! left in the pool.

use crate::config::MatchingSettings;
use crate::economy::Ledger;
use crate::error::{DuetError, Result};
use crate::metrics::MetricsCollector;
use crate::storage::{MatchCriteria, Storage};
use crate::transport::Outbound;
use crate::types::{
    ChatSession, ControlHint, EndChatOutcome, Gender, OutboundMessage, SearchOutcome,
    StopSearchOutcome, UserId, UserProfile, UserStatus,
};
use crate::utils::current_timestamp;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The matching engine
pub struct MatchEngine {
    storage: Arc<dyn Storage>,
    ledger: Arc<Ledger>,
    outbound: Arc<dyn Outbound>,
    metrics: Arc<MetricsCollector>,
    settings: MatchingSettings,
}

impl MatchEngine {
    pub fn new(
        storage: Arc<dyn Storage>,
        ledger: Arc<Ledger>,
        outbound: Arc<dyn Outbound>,
        metrics: Arc<MetricsCollector>,
        settings: MatchingSettings,
    ) -> Self {
        Self {
            storage,
            ledger,
            outbound,
            metrics,
            settings,
        }
    }

    /// Start a search. Returns `Matched` with an established session when an
    /// eligible candidate was waiting, `Waiting` after pool insertion
    /// otherwise.
    ///
    /// A filtered search charges the configured fee up front; an
    /// insufficient balance rejects the request with no state change and no
    /// pool insertion.
    pub async fn start_search(
        &self,
        user: UserId,
        filter: Option<Gender>,
    ) -> Result<SearchOutcome> {
        let now = current_timestamp();
        let profile = self
            .storage
            .get_user(user)?
            .ok_or(DuetError::UnknownUser { user_id: user })?;

        if profile.is_banned(now) {
            return Err(DuetError::Banned {
                user_id: user,
                until: profile.banned_until.unwrap_or(now),
            }
            .into());
        }
        if self.storage.find_session_for(user)?.is_some() {
            return Err(DuetError::AlreadyInChat { user_id: user }.into());
        }

        if filter.is_some() {
            let fee = self.settings.gender_search_cost;
            if fee > 0 && !self.ledger.consume_points(user, fee)? {
                return Err(DuetError::InsufficientBalance {
                    needed: fee,
                    available: profile.points,
                }
                .into());
            }
        }

        self.metrics.record_search(filter.is_some());

        let criteria = MatchCriteria {
            seeker: user,
            seeker_gender: profile.gender,
            wanted: filter,
            now,
        };
        match self.storage.take_waiting(&criteria)? {
            Some(partner) => {
                debug!("search by {} matched waiting user {}", user, partner);
                let session_id = self.establish(user, partner).await?;
                Ok(SearchOutcome::Matched {
                    session_id,
                    partner,
                })
            }
            None => {
                // Status first, then pool entry: a concurrent taker only
                // sees the entry once the status already says searching
                self.storage.set_status(user, UserStatus::Searching, None)?;
                self.storage.add_waiting(user, filter)?;
                debug!("no candidate for {}, inserted into pool", user);
                Ok(SearchOutcome::Waiting)
            }
        }
    }

    /// Remove the user from the pool. All outcomes are informational.
    pub fn stop_search(&self, user: UserId) -> Result<StopSearchOutcome> {
        if self.storage.remove_waiting(user)? {
            self.storage.set_status(user, UserStatus::Idle, None)?;
            info!("user {} stopped searching", user);
            return Ok(StopSearchOutcome::Stopped);
        }
        if self.storage.find_session_for(user)?.is_some() {
            return Ok(StopSearchOutcome::InChat);
        }
        Ok(StopSearchOutcome::NotSearching)
    }

    /// End the caller's active chat. Idempotent: a second call finds no
    /// session and reports `NotInChat` without error.
    pub async fn end_chat(&self, user: UserId) -> Result<EndChatOutcome> {
        let session = match self.storage.find_session_for(user)? {
            Some(session) => session,
            None => return Ok(EndChatOutcome::NotInChat),
        };
        let partner = session
            .partner_of(user)
            .ok_or_else(|| DuetError::Internal {
                message: format!("session {} does not contain {}", session.id, user),
            })?;

        self.teardown(&session)?;

        let farewell = OutboundMessage::text("Your partner ended the chat.")
            .with_control(ControlHint::MainMenu);
        if let Err(err) = self.outbound.send(partner, farewell).await {
            debug!("could not notify {} about chat end: {}", partner, err);
        }

        info!("chat {} ended by {}", session.id, user);
        Ok(EndChatOutcome::Ended { partner })
    }

    /// Tear a session down: close it and return both participants to idle.
    /// Safe to call concurrently; only the call that actually closes the
    /// session touches the statuses.
    pub fn teardown(&self, session: &ChatSession) -> Result<()> {
        if self.storage.close_session(session.id)?.is_some() {
            self.storage.set_status(session.a, UserStatus::Idle, None)?;
            self.storage.set_status(session.b, UserStatus::Idle, None)?;
            self.metrics.record_session_ended();
        }
        Ok(())
    }

    /// Expire pool entries older than the cutoff: the stale searchers are
    /// returned to idle and notified best-effort.
    pub async fn expire_stale_searches(&self, older_than: DateTime<Utc>) -> Result<Vec<UserId>> {
        let expired = self.storage.purge_stale_waiting(older_than)?;
        for &user in &expired {
            self.storage.set_status(user, UserStatus::Idle, None)?;
            let notice = OutboundMessage::text(
                "Your search expired without finding a partner. Start a new one any time.",
            )
            .with_control(ControlHint::MainMenu);
            if let Err(err) = self.outbound.send(user, notice).await {
                debug!("could not notify {} about expired search: {}", user, err);
            }
        }
        if !expired.is_empty() {
            info!("expired {} stale searches", expired.len());
        }
        Ok(expired)
    }

    /// Create the session and notify both sides; any notification failure
    /// rolls everything back and surfaces `PartnerUnreachable`.
    async fn establish(&self, seeker: UserId, partner: UserId) -> Result<crate::types::SessionId> {
        let session = match self.storage.create_session(seeker, partner) {
            Ok(session) => session,
            Err(err) => {
                // The popped candidate must never be left in limbo
                self.storage.set_status(partner, UserStatus::Idle, None)?;
                return Err(err);
            }
        };

        self.storage
            .set_status(seeker, UserStatus::Chatting, Some(partner))?;
        self.storage
            .set_status(partner, UserStatus::Chatting, Some(seeker))?;

        let now = current_timestamp();
        let seeker_profile = self
            .storage
            .get_user(seeker)?
            .ok_or(DuetError::UnknownUser { user_id: seeker })?;
        let partner_profile = self
            .storage
            .get_user(partner)?
            .ok_or(DuetError::UnknownUser { user_id: partner })?;

        let to_partner = OutboundMessage::text(partner_card(&seeker_profile, now))
            .with_control(ControlHint::ChatControls);
        if let Err(err) = self.outbound.send(partner, to_partner).await {
            warn!(
                "partner {} unreachable after match with {}, rolling back: {}",
                partner, seeker, err
            );
            self.rollback(&session)?;
            return Err(DuetError::PartnerUnreachable { partner }.into());
        }

        let to_seeker = OutboundMessage::text(partner_card(&partner_profile, now))
            .with_control(ControlHint::ChatControls);
        if let Err(err) = self.outbound.send(seeker, to_seeker).await {
            warn!(
                "seeker {} unreachable after match with {}, rolling back: {}",
                seeker, partner, err
            );
            self.rollback(&session)?;
            let notice = OutboundMessage::text("The match fell through. Please search again.")
                .with_control(ControlHint::MainMenu);
            if let Err(err) = self.outbound.send(partner, notice).await {
                debug!("could not notify {} about rollback: {}", partner, err);
            }
            return Err(DuetError::PartnerUnreachable { partner: seeker }.into());
        }

        self.metrics.record_match();
        info!("matched {} with {} (session {})", seeker, partner, session.id);
        Ok(session.id)
    }

    /// Undo a half-established match: no residual session, both idle,
    /// neither in the pool
    fn rollback(&self, session: &ChatSession) -> Result<()> {
        self.storage.close_session(session.id)?;
        self.storage.set_status(session.a, UserStatus::Idle, None)?;
        self.storage.set_status(session.b, UserStatus::Idle, None)?;
        self.storage.remove_waiting(session.a)?;
        self.storage.remove_waiting(session.b)?;
        Ok(())
    }
}

/// The card shown to each side when a match is made, describing the other
/// side
fn partner_card(profile: &UserProfile, now: DateTime<Utc>) -> String {
    let rating = profile
        .rating()
        .map(|r| format!("{:.1}/5", r))
        .unwrap_or_else(|| "new".to_string());
    let membership = if profile.is_vip(now) {
        format!("VIP ({})", profile.vip_tier())
    } else {
        "regular".to_string()
    };
    let age = profile
        .age
        .map(|a| a.to_string())
        .unwrap_or_else(|| "-".to_string());
    let country = profile.country.clone().unwrap_or_else(|| "-".to_string());

    format!(
        "Partner found!\n\
         Name: {}\n\
         Gender: {}\n\
         Age: {}\n\
         Country: {}\n\
         Points: {}\n\
         Rating: {}\n\
         Membership: {}\n\n\
         You can chat now. Use /stop to end the conversation.",
        profile.display_name, profile.gender, age, country, profile.points, rating, membership
    )
}
