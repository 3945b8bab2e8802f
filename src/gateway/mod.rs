//! Chat-facing surface of the core
//!
//! Three inbound entry points (`on_text`, `on_media`, `on_game_button`)
//! plus command-shaped helpers for the thin platform glue. Multi-step
//! input (gender search, guesses, gifts, settings) runs through the tagged
//! flow table; everything else in an active chat is relayed.

pub mod flow;

pub use flow::{Flow, FlowTable};

use crate::directory::{GenderChangeOutcome, UserDirectory};
use crate::economy::Ledger;
use crate::error::{DuetError, Result};
use crate::games::{BoardGame, CancelSearchOutcome, GameManager, GuessOutcome, MoveOutcome};
use crate::matching::MatchEngine;
use crate::relay::SessionRelay;
use crate::transport::Outbound;
use crate::types::{
    ControlHint, EndChatOutcome, GameAction, GameId, Gender, MediaKind, MessageContent,
    OutboundMessage, RelayOutcome, SearchOutcome, StopSearchOutcome, UserId,
};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// The gateway
pub struct Gateway {
    directory: Arc<UserDirectory>,
    engine: Arc<MatchEngine>,
    relay: Arc<SessionRelay>,
    games: Arc<GameManager>,
    ledger: Arc<Ledger>,
    outbound: Arc<dyn Outbound>,
    flows: FlowTable,
    gender_search_cost: u64,
}

impl Gateway {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        directory: Arc<UserDirectory>,
        engine: Arc<MatchEngine>,
        relay: Arc<SessionRelay>,
        games: Arc<GameManager>,
        ledger: Arc<Ledger>,
        outbound: Arc<dyn Outbound>,
        gender_search_cost: u64,
    ) -> Self {
        Self {
            directory,
            engine,
            relay,
            games,
            ledger,
            outbound,
            flows: FlowTable::new(),
            gender_search_cost,
        }
    }

    pub fn flows(&self) -> &FlowTable {
        &self.flows
    }

    async fn say(&self, user: UserId, text: impl Into<String>) {
        if let Err(err) = self.outbound.send(user, OutboundMessage::text(text)).await {
            debug!("could not message {}: {}", user, err);
        }
    }

    /// Turn an operation error into a user-facing message where possible
    async fn report(&self, user: UserId, err: anyhow::Error) -> Result<()> {
        let text = match err.downcast_ref::<DuetError>() {
            Some(inner) if inner.is_user_error() => Some(user_message(inner)),
            Some(DuetError::PartnerUnreachable { .. }) => {
                Some("Your partner could not be reached, so the chat was closed.".to_string())
            }
            Some(DuetError::Persistence { .. }) => {
                error!("persistence failure for user {}: {}", user, err);
                Some("A storage problem occurred. Please try again.".to_string())
            }
            _ => None,
        };

        match text {
            Some(text) => {
                self.say(user, text).await;
                Ok(())
            }
            None => Err(err),
        }
    }

    // ------------------------------------------------------------------
    // Inbound entry points
    // ------------------------------------------------------------------

    /// Free text: multi-step flows first, then chat relay
    pub async fn on_text(&self, user: UserId, text: &str) -> Result<()> {
        self.directory.ensure_user(user, "")?;

        if let Some(flow) = self.flows.get(user)? {
            return self.handle_flow(user, flow, text.trim()).await;
        }

        match self
            .relay
            .relay(user, MessageContent::Text(text.to_string()))
            .await
        {
            Ok(RelayOutcome::Forwarded { .. }) | Ok(RelayOutcome::Dropped) => Ok(()),
            Err(err) => self.report(user, err).await,
        }
    }

    /// Media: relayed when in a chat, dropped otherwise
    pub async fn on_media(&self, user: UserId, kind: MediaKind, file: &str) -> Result<()> {
        self.directory.ensure_user(user, "")?;

        match self
            .relay
            .relay(
                user,
                MessageContent::Media {
                    kind,
                    file: file.to_string(),
                },
            )
            .await
        {
            Ok(_) => Ok(()),
            Err(err) => self.report(user, err).await,
        }
    }

    /// Game keyboard buttons
    pub async fn on_game_button(
        &self,
        user: UserId,
        action: GameAction,
        game_id: Option<GameId>,
    ) -> Result<()> {
        self.directory.ensure_user(user, "")?;

        let result = match action {
            GameAction::Move(cell) => {
                let game_id = require_game_id(game_id)?;
                self.handle_move(user, game_id, cell).await
            }
            GameAction::Restart => {
                let game_id = require_game_id(game_id)?;
                self.handle_restart(user, game_id).await
            }
            GameAction::Exit => {
                let game_id = require_game_id(game_id)?;
                self.handle_exit(user, game_id).await
            }
            GameAction::RandomOpponent => self.play_random_board(user).await,
            GameAction::CancelRandom => self.cancel_random_board(user).await,
            GameAction::NewGuess => self.begin_guess(user).await,
        };

        match result {
            Ok(()) => Ok(()),
            Err(err) => self.report(user, err).await,
        }
    }

    // ------------------------------------------------------------------
    // Command-shaped helpers for the platform glue
    // ------------------------------------------------------------------

    /// Unfiltered partner search
    pub async fn start_random_chat(&self, user: UserId) -> Result<()> {
        match self.engine.start_search(user, None).await {
            // Both sides already received their partner cards
            Ok(SearchOutcome::Matched { .. }) => Ok(()),
            Ok(SearchOutcome::Waiting) => {
                let notice = OutboundMessage::text(
                    "Searching for a partner... Use /stop_search to cancel.",
                )
                .with_control(ControlHint::SearchControls);
                self.outbound.send(user, notice).await.ok();
                Ok(())
            }
            Err(err) => self.report(user, err).await,
        }
    }

    /// Entry point of the gender-filtered search flow
    pub async fn begin_filtered_search(&self, user: UserId) -> Result<()> {
        let profile = self.directory.profile(user)?;
        if profile.points < self.gender_search_cost {
            self.say(
                user,
                format!(
                    "A filtered search costs {} points and you have {}.",
                    self.gender_search_cost, profile.points
                ),
            )
            .await;
            return Ok(());
        }

        self.flows.set(user, Flow::ChoosingSearchGender)?;
        self.say(
            user,
            format!(
                "Filtered search costs {} points (balance: {}). \
                 Which gender are you looking for? Reply 'male', 'female' or 'cancel'.",
                self.gender_search_cost, profile.points
            ),
        )
        .await;
        Ok(())
    }

    /// Stop a pending search or explain why there is nothing to stop
    pub async fn stop_search(&self, user: UserId) -> Result<()> {
        match self.engine.stop_search(user)? {
            StopSearchOutcome::Stopped => {
                self.say(user, "Search stopped.").await;
            }
            StopSearchOutcome::InChat => {
                self.say(user, "You are in a chat. Use /stop to end it.").await;
            }
            StopSearchOutcome::NotSearching => {
                self.say(user, "There is no active search to stop.").await;
            }
        }
        Ok(())
    }

    /// End the active chat
    pub async fn stop_chat(&self, user: UserId) -> Result<()> {
        match self.engine.end_chat(user).await? {
            EndChatOutcome::Ended { .. } => {
                self.say(user, "Chat ended. Rate your partner any time with /rate.")
                    .await;
            }
            EndChatOutcome::NotInChat => {
                self.say(user, "There is no active chat.").await;
            }
        }
        Ok(())
    }

    /// Settings entry points
    pub async fn begin_gender_update(&self, user: UserId) -> Result<()> {
        self.flows.set(user, Flow::UpdatingGender)?;
        self.say(user, "Reply 'male' or 'female' to set your gender.")
            .await;
        Ok(())
    }

    pub async fn begin_age_update(&self, user: UserId) -> Result<()> {
        self.flows.set(user, Flow::UpdatingAge)?;
        self.say(user, "Reply with your age (13-99).").await;
        Ok(())
    }

    pub async fn begin_country_update(&self, user: UserId) -> Result<()> {
        self.flows.set(user, Flow::UpdatingCountry)?;
        self.say(user, "Reply with your country.").await;
        Ok(())
    }

    /// Gift entry point
    pub async fn begin_gift(&self, user: UserId) -> Result<()> {
        self.flows.set(user, Flow::GiftingPoints)?;
        self.say(user, "Reply with '<user id> <points>' to send a gift.")
            .await;
        Ok(())
    }

    /// Start a guess game and route further text into it
    pub async fn begin_guess(&self, user: UserId) -> Result<()> {
        let game = self.games.start_guess_game(user)?;
        self.flows.set(user, Flow::Guessing)?;
        self.say(
            user,
            format!(
                "I picked a number between 1 and 100. You have {} attempts - go!",
                game.limit
            ),
        )
        .await;
        Ok(())
    }

    /// Search for a random board-game opponent (bounded wait)
    pub async fn play_random_board(&self, user: UserId) -> Result<()> {
        self.say(
            user,
            "Looking for an opponent... this can take up to a minute.",
        )
        .await;

        match self.games.find_random_opponent(user).await? {
            Some(pairing) => {
                let board = self.games.board(pairing.game_id)?;
                self.push_board(&board, None).await;
                Ok(())
            }
            None => {
                self.say(user, "No opponent found. Try again later.").await;
                Ok(())
            }
        }
    }

    pub async fn cancel_random_board(&self, user: UserId) -> Result<()> {
        match self.games.cancel_opponent_search(user)? {
            CancelSearchOutcome::Cancelled => {
                self.say(user, "Opponent search cancelled.").await;
            }
            CancelSearchOutcome::AlreadyMatched => {
                self.say(user, "Too late - an opponent was already found!").await;
            }
            CancelSearchOutcome::NotSearching => {
                self.say(user, "There is no opponent search to cancel.").await;
            }
        }
        Ok(())
    }

    /// Challenge a specific friend to a board game
    pub async fn challenge_friend(&self, host: UserId, friend: UserId) -> Result<()> {
        let game_id = match self.games.start_board_game(host, Some(friend)) {
            Ok(game_id) => game_id,
            Err(err) => return self.report(host, err).await,
        };
        let board = self.games.board(game_id)?;
        self.push_board(&board, None).await;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Flow handling
    // ------------------------------------------------------------------

    async fn handle_flow(&self, user: UserId, flow: Flow, text: &str) -> Result<()> {
        if text.eq_ignore_ascii_case("cancel") {
            self.flows.clear(user)?;
            self.say(user, "Cancelled.").await;
            return Ok(());
        }

        match flow {
            Flow::ChoosingSearchGender => match parse_gender(text) {
                Some(wanted) => {
                    let profile = self.directory.profile(user)?;
                    self.flows.set(user, Flow::ConfirmingSearch { wanted })?;
                    self.say(
                        user,
                        format!(
                            "Search for a {} partner for {} points (balance: {})? \
                             Reply 'yes' or 'no'.",
                            wanted, self.gender_search_cost, profile.points
                        ),
                    )
                    .await;
                    Ok(())
                }
                None => {
                    self.say(user, "Please reply 'male', 'female' or 'cancel'.").await;
                    Ok(())
                }
            },
            Flow::ConfirmingSearch { wanted } => {
                if text.eq_ignore_ascii_case("no") {
                    self.flows.clear(user)?;
                    self.say(user, "Search cancelled.").await;
                    return Ok(());
                }
                if !text.eq_ignore_ascii_case("yes") {
                    self.say(user, "Please reply 'yes', 'no' or 'cancel'.").await;
                    return Ok(());
                }

                self.flows.clear(user)?;
                match self.engine.start_search(user, Some(wanted)).await {
                    Ok(SearchOutcome::Matched { .. }) => Ok(()),
                    Ok(SearchOutcome::Waiting) => {
                        let notice = OutboundMessage::text(format!(
                            "Searching for a {} partner... Use /stop_search to cancel.",
                            wanted
                        ))
                        .with_control(ControlHint::SearchControls);
                        self.outbound.send(user, notice).await.ok();
                        Ok(())
                    }
                    Err(err) => self.report(user, err).await,
                }
            }
            Flow::UpdatingGender => match parse_gender(text) {
                Some(gender) => {
                    self.flows.clear(user)?;
                    match self.directory.set_gender(user, gender) {
                        Ok(GenderChangeOutcome::Set) => {
                            self.say(user, format!("Gender set to {}.", gender)).await;
                            Ok(())
                        }
                        Ok(GenderChangeOutcome::Changed { fee }) => {
                            self.say(
                                user,
                                format!("Gender changed to {} ({} points charged).", gender, fee),
                            )
                            .await;
                            Ok(())
                        }
                        Err(err) => self.report(user, err).await,
                    }
                }
                None => {
                    self.say(user, "Please reply 'male', 'female' or 'cancel'.").await;
                    Ok(())
                }
            },
            Flow::UpdatingAge => match text.parse::<u8>() {
                Ok(age) => {
                    self.flows.clear(user)?;
                    match self.directory.set_age(user, age) {
                        Ok(()) => {
                            self.say(user, format!("Age set to {}.", age)).await;
                            Ok(())
                        }
                        Err(err) => self.report(user, err).await,
                    }
                }
                Err(_) => {
                    self.say(user, "Please reply with a number between 13 and 99.")
                        .await;
                    Ok(())
                }
            },
            Flow::UpdatingCountry => {
                self.flows.clear(user)?;
                match self.directory.set_country(user, text) {
                    Ok(()) => {
                        self.say(user, format!("Country set to {}.", text)).await;
                        Ok(())
                    }
                    Err(err) => self.report(user, err).await,
                }
            }
            Flow::Guessing => self.handle_guess_text(user, text).await,
            Flow::GiftingPoints => self.handle_gift_text(user, text).await,
        }
    }

    async fn handle_guess_text(&self, user: UserId, text: &str) -> Result<()> {
        let value = match text.parse::<u8>() {
            Ok(value) if (1..=100).contains(&value) => value,
            _ => {
                self.say(user, "Enter a number between 1 and 100.").await;
                return Ok(());
            }
        };

        let report = match self.games.guess(user, value) {
            Ok(report) => report,
            Err(err) => {
                self.flows.clear(user)?;
                return self.report(user, err).await;
            }
        };

        match report.outcome {
            GuessOutcome::Correct { attempts } => {
                self.flows.clear(user)?;
                self.say(
                    user,
                    format!(
                        "Correct! The number was {}. You got it in {} attempts: +{} points.",
                        value, attempts, report.delta
                    ),
                )
                .await;
            }
            GuessOutcome::Exhausted { target } => {
                self.flows.clear(user)?;
                let settlement = if report.penalty_skipped {
                    "Your balance is too low for the penalty, so nothing was deducted."
                        .to_string()
                } else {
                    format!("{} points deducted.", -report.delta)
                };
                self.say(
                    user,
                    format!("Out of attempts! The number was {}. {}", target, settlement),
                )
                .await;
            }
            GuessOutcome::Hint { higher, remaining } => {
                let direction = if higher { "higher" } else { "lower" };
                self.say(
                    user,
                    format!("The number is {}. {} attempts left.", direction, remaining),
                )
                .await;
            }
        }
        Ok(())
    }

    async fn handle_gift_text(&self, user: UserId, text: &str) -> Result<()> {
        let mut parts = text.split_whitespace();
        let parsed = match (parts.next(), parts.next(), parts.next()) {
            (Some(id), Some(amount), None) => {
                match (id.parse::<UserId>(), amount.parse::<u64>()) {
                    (Ok(id), Ok(amount)) => Some((id, amount)),
                    _ => None,
                }
            }
            _ => None,
        };
        let (friend, amount) = match parsed {
            Some(parsed) => parsed,
            None => {
                self.say(user, "Use the format '<user id> <points>', e.g. '123456 50'.")
                    .await;
                return Ok(());
            }
        };

        self.flows.clear(user)?;
        match self.ledger.gift_points(user, friend, amount) {
            Ok(()) => {
                self.say(user, format!("Sent {} points to {}.", amount, friend))
                    .await;
                self.say(friend, format!("You received a gift of {} points!", amount))
                    .await;
                Ok(())
            }
            Err(err) => self.report(user, err).await,
        }
    }

    // ------------------------------------------------------------------
    // Board game plumbing
    // ------------------------------------------------------------------

    async fn handle_move(&self, user: UserId, game_id: GameId, cell: u8) -> Result<()> {
        let report = self.games.make_move(game_id, user, cell)?;

        match report.outcome {
            MoveOutcome::Continue => {
                self.push_board(&report.board, None).await;
            }
            MoveOutcome::Draw => {
                self.push_board(&report.board, Some("It's a draw - no points moved."))
                    .await;
            }
            MoveOutcome::Win(winner) => {
                let loser = report.board.opponent_of(winner).unwrap_or(winner);
                self.push_board(&report.board, None).await;
                self.say(
                    winner,
                    format!("You win! +{} points from your opponent.", report.points_moved),
                )
                .await;
                self.say(
                    loser,
                    format!("You lose: -{} points. Rematch with the restart button.",
                        report.points_moved
                    ),
                )
                .await;
            }
        }
        Ok(())
    }

    async fn handle_restart(&self, user: UserId, game_id: GameId) -> Result<()> {
        let board = self.games.restart_board(game_id, user)?;
        self.push_board(&board, Some("The board was reset - rematch!"))
            .await;
        Ok(())
    }

    async fn handle_exit(&self, user: UserId, game_id: GameId) -> Result<()> {
        let game = self.games.exit_board(game_id, user)?;
        for player in participants(&game) {
            if player == user {
                self.say(player, "You left the game.").await;
            } else {
                self.say(player, "Your opponent left the game.").await;
            }
        }
        Ok(())
    }

    /// Send the rendered board to both participants, marking whose turn it
    /// is; the transport may edit the stored message handle in place
    async fn push_board(&self, game: &BoardGame, note: Option<&str>) {
        for player in participants(game) {
            let turn_line = if game.status == crate::games::BoardStatus::Active {
                if game.turn == player {
                    "Your turn."
                } else {
                    "Opponent's turn."
                }
            } else {
                "Game over."
            };
            let text = match note {
                Some(note) => format!("{}\n{}\n{}", game.render(), turn_line, note),
                None => format!("{}\n{}", game.render(), turn_line),
            };
            let message = OutboundMessage::text(text)
                .with_control(ControlHint::Board { game_id: game.id });
            if let Err(err) = self.outbound.send(player, message).await {
                warn!("could not push board {} to {}: {}", game.id, player, err);
            }
        }
    }
}

fn participants(game: &BoardGame) -> Vec<UserId> {
    let mut players = vec![game.player_a];
    if let Some(b) = game.player_b {
        players.push(b);
    }
    players
}

fn require_game_id(game_id: Option<GameId>) -> Result<GameId> {
    game_id.ok_or_else(|| {
        DuetError::InvalidRequest {
            reason: "this action needs a game reference".to_string(),
        }
        .into()
    })
}

fn user_message(err: &DuetError) -> String {
    match err {
        DuetError::InsufficientBalance { needed, available } => format!(
            "Not enough points: this costs {} and you have {}.",
            needed, available
        ),
        DuetError::Banned { until, .. } => {
            format!("Your account is suspended until {}.", until)
        }
        DuetError::AlreadyInChat { .. } => {
            "You are already in a chat. Use /stop to end it first.".to_string()
        }
        DuetError::AlreadyInGame { .. } => {
            "You are already in a game. Finish or exit it first.".to_string()
        }
        DuetError::InvalidMove { reason } | DuetError::InvalidRequest { reason } => reason.clone(),
        DuetError::UnknownGame { .. } => "That game no longer exists.".to_string(),
        DuetError::NoActiveSession { .. } => "You are not in a chat right now.".to_string(),
        DuetError::UnknownUser { .. } => "Unknown user.".to_string(),
        _ => "Something went wrong.".to_string(),
    }
}

fn parse_gender(text: &str) -> Option<Gender> {
    match text.to_ascii_lowercase().as_str() {
        "male" | "m" => Some(Gender::Male),
        "female" | "f" => Some(Gender::Female),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppConfig, EconomySettings};
    use crate::economy::Ledger;
    use crate::metrics::MetricsCollector;
    use crate::storage::{MemoryStorage, Storage};
    use crate::transport::MockOutbound;

    struct Harness {
        gateway: Gateway,
        storage: Arc<MemoryStorage>,
        ledger: Arc<Ledger>,
        outbound: Arc<MockOutbound>,
    }

    fn harness() -> Harness {
        let config = AppConfig::default();
        let storage = Arc::new(MemoryStorage::new());
        let ledger = Arc::new(Ledger::new(storage.clone(), EconomySettings::default()));
        let outbound = Arc::new(MockOutbound::new());
        let metrics = Arc::new(MetricsCollector::new().unwrap());
        let engine = Arc::new(MatchEngine::new(
            storage.clone(),
            ledger.clone(),
            outbound.clone(),
            metrics.clone(),
            config.matching.clone(),
        ));
        let relay = Arc::new(SessionRelay::new(
            storage.clone(),
            ledger.clone(),
            outbound.clone(),
            engine.clone(),
            metrics.clone(),
            &config.relay,
        ));
        let games = Arc::new(GameManager::new(
            storage.clone(),
            ledger.clone(),
            metrics,
            config.games.clone(),
        ));
        let directory = Arc::new(UserDirectory::new(
            storage.clone(),
            ledger.clone(),
            config.economy.clone(),
        ));
        let gateway = Gateway::new(
            directory,
            engine,
            relay,
            games,
            ledger.clone(),
            outbound.clone(),
            config.matching.gender_search_cost,
        );
        Harness {
            gateway,
            storage,
            ledger,
            outbound,
        }
    }

    fn last_text(h: &Harness, user: UserId) -> String {
        let sent = h.outbound.sent_to(user);
        for message in sent.iter().rev() {
            if let MessageContent::Text(text) = &message.content {
                if message.control != Some(ControlHint::Typing) {
                    return text.clone();
                }
            }
        }
        String::new()
    }

    #[tokio::test]
    async fn test_on_text_creates_user_on_first_contact() {
        let h = harness();
        h.gateway.on_text(7, "hello").await.unwrap();
        assert!(h.storage.get_user(7).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_filtered_search_flow_happy_path() {
        let h = harness();
        h.storage.ensure_user(1, "alice").unwrap();
        h.ledger.add_points(1, 20).unwrap();

        h.gateway.begin_filtered_search(1).await.unwrap();
        h.gateway.on_text(1, "female").await.unwrap();
        assert!(last_text(&h, 1).contains("Reply 'yes'"));

        h.gateway.on_text(1, "yes").await.unwrap();
        // Fee charged, user waiting in pool
        assert_eq!(h.storage.get_user(1).unwrap().unwrap().points, 15);
        assert_eq!(h.storage.list_waiting(None).unwrap(), vec![1]);
        assert_eq!(h.gateway.flows().get(1).unwrap(), None);
    }

    #[tokio::test]
    async fn test_filtered_search_flow_broke_user_blocked_at_entry() {
        let h = harness();
        h.storage.ensure_user(1, "alice").unwrap();

        h.gateway.begin_filtered_search(1).await.unwrap();
        // No flow was opened; the refusal came immediately
        assert_eq!(h.gateway.flows().get(1).unwrap(), None);
        assert!(last_text(&h, 1).contains("costs 5 points"));
        assert!(h.storage.list_waiting(None).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_flow_cancel_word() {
        let h = harness();
        h.storage.ensure_user(1, "alice").unwrap();
        h.ledger.add_points(1, 20).unwrap();

        h.gateway.begin_filtered_search(1).await.unwrap();
        h.gateway.on_text(1, "cancel").await.unwrap();
        assert_eq!(h.gateway.flows().get(1).unwrap(), None);
        // No fee was charged
        assert_eq!(h.storage.get_user(1).unwrap().unwrap().points, 20);
    }

    #[tokio::test]
    async fn test_chat_text_is_relayed() {
        let h = harness();
        h.storage.ensure_user(1, "alice").unwrap();
        h.storage.ensure_user(2, "bob").unwrap();
        h.gateway.start_random_chat(1).await.unwrap();
        h.gateway.start_random_chat(2).await.unwrap();
        h.outbound.clear();

        h.gateway.on_text(1, "hey there").await.unwrap();
        let delivered = h.outbound.sent_to(2);
        assert!(delivered
            .iter()
            .any(|m| m.content == MessageContent::Text("hey there".to_string())));
    }

    #[tokio::test]
    async fn test_guess_flow_routes_numbers() {
        let h = harness();
        h.storage.ensure_user(1, "alice").unwrap();

        h.gateway
            .on_game_button(1, GameAction::NewGuess, None)
            .await
            .unwrap();
        assert_eq!(h.gateway.flows().get(1).unwrap(), Some(Flow::Guessing));

        h.gateway.on_text(1, "not a number").await.unwrap();
        assert!(last_text(&h, 1).contains("between 1 and 100"));

        h.gateway.on_text(1, "50").await.unwrap();
        let reply = last_text(&h, 1);
        assert!(
            reply.contains("higher")
                || reply.contains("lower")
                || reply.contains("Correct"),
            "unexpected reply: {}",
            reply
        );
    }

    #[tokio::test]
    async fn test_gift_flow() {
        let h = harness();
        h.storage.ensure_user(1, "alice").unwrap();
        h.storage.ensure_user(2, "bob").unwrap();
        h.ledger.add_points(1, 30).unwrap();

        h.gateway.begin_gift(1).await.unwrap();
        h.gateway.on_text(1, "2 10").await.unwrap();

        assert_eq!(h.storage.get_user(1).unwrap().unwrap().points, 20);
        assert_eq!(h.storage.get_user(2).unwrap().unwrap().points, 10);
        assert!(last_text(&h, 2).contains("gift"));
    }

    #[tokio::test]
    async fn test_board_buttons_drive_a_game() {
        let h = harness();
        h.storage.ensure_user(1, "alice").unwrap();
        h.storage.ensure_user(2, "bob").unwrap();
        h.ledger.add_points(1, 100).unwrap();
        h.ledger.add_points(2, 100).unwrap();

        h.gateway.challenge_friend(1, 2).await.unwrap();
        let history = h.outbound.sent_to(1);
        let game_id = history
            .iter()
            .find_map(|m| match m.control {
                Some(ControlHint::Board { game_id }) => Some(game_id),
                _ => None,
            })
            .expect("board pushed to host");

        for (player, cell) in [(1, 0), (2, 3), (1, 1), (2, 4)] {
            h.gateway
                .on_game_button(player, GameAction::Move(cell), Some(game_id))
                .await
                .unwrap();
        }
        h.gateway
            .on_game_button(1, GameAction::Move(2), Some(game_id))
            .await
            .unwrap();

        assert_eq!(h.storage.get_user(1).unwrap().unwrap().points, 105);
        assert_eq!(h.storage.get_user(2).unwrap().unwrap().points, 95);
        assert!(last_text(&h, 1).contains("You win"));
        assert!(last_text(&h, 2).contains("You lose"));
    }

    #[tokio::test]
    async fn test_wrong_turn_reported_not_fatal() {
        let h = harness();
        h.storage.ensure_user(1, "alice").unwrap();
        h.storage.ensure_user(2, "bob").unwrap();

        h.gateway.challenge_friend(1, 2).await.unwrap();
        let game_id = h
            .outbound
            .sent_to(2)
            .iter()
            .find_map(|m| match m.control {
                Some(ControlHint::Board { game_id }) => Some(game_id),
                _ => None,
            })
            .unwrap();

        h.gateway
            .on_game_button(2, GameAction::Move(0), Some(game_id))
            .await
            .unwrap();
        assert!(last_text(&h, 2).contains("not your turn"));
    }
}
