//! Game session management: creation, moves, settlement, opponent search,
//! and stale-game cleanup
//!
//! All live games are held in guarded maps; reward settlement goes through
//! the ledger after the board lock is released. The random-opponent search
//! is a bounded, cancellable wait coordinated through a single lock so a
//! cancel and a claim can never race into a half-pairing.

use crate::config::GameSettings;
use crate::economy::Ledger;
use crate::error::{DuetError, Result};
use crate::games::board::{BoardGame, BoardStatus, MoveOutcome};
use crate::games::guess::{GuessGame, GuessOutcome};
use crate::metrics::MetricsCollector;
use crate::storage::Storage;
use crate::types::{GameId, GameKind, GameRecord, MessageRef, UserId};
use crate::utils::{current_timestamp, generate_game_id};
use chrono::Duration;
use rand::seq::SliceRandom;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, info};

/// Rendezvous state for the random-opponent search
#[derive(Debug, Default)]
struct BoardWait {
    waiting: HashSet<UserId>,
    /// Waiter -> game created for them by the claiming side
    claims: HashMap<UserId, GameId>,
}

/// A successful random pairing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardPairing {
    pub game_id: GameId,
    pub opponent: UserId,
    /// Whether the caller moves first
    pub you_start: bool,
}

/// Result of cancelling a random-opponent search
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelSearchOutcome {
    Cancelled,
    /// A claim already landed; the pairing will still be delivered
    AlreadyMatched,
    NotSearching,
}

/// One accepted board move plus its settlement
#[derive(Debug, Clone)]
pub struct MoveReport {
    pub outcome: MoveOutcome,
    /// Snapshot of the board after the move
    pub board: BoardGame,
    /// Points actually moved from loser to winner (0 unless a win)
    pub points_moved: u64,
}

/// One settled or hinted guess
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuessReport {
    pub outcome: GuessOutcome,
    /// Net change applied to the player's balance
    pub delta: i64,
    /// The exhaustion penalty was skipped to keep the balance non-negative
    pub penalty_skipped: bool,
}

/// The game engine
pub struct GameManager {
    storage: Arc<dyn Storage>,
    ledger: Arc<Ledger>,
    metrics: Arc<MetricsCollector>,
    settings: GameSettings,
    boards: RwLock<HashMap<GameId, BoardGame>>,
    guesses: RwLock<HashMap<GameId, GuessGame>>,
    board_wait: Mutex<BoardWait>,
}

impl GameManager {
    pub fn new(
        storage: Arc<dyn Storage>,
        ledger: Arc<Ledger>,
        metrics: Arc<MetricsCollector>,
        settings: GameSettings,
    ) -> Self {
        Self {
            storage,
            ledger,
            metrics,
            settings,
            boards: RwLock::new(HashMap::new()),
            guesses: RwLock::new(HashMap::new()),
            board_wait: Mutex::new(BoardWait::default()),
        }
    }

    fn lock_err(what: &str) -> DuetError {
        DuetError::Internal {
            message: format!("failed to acquire {} lock", what),
        }
    }

    /// Chat sessions and board games are mutually exclusive
    fn ensure_free_for_board(&self, user: UserId) -> Result<()> {
        if self.storage.find_session_for(user)?.is_some() {
            return Err(DuetError::AlreadyInChat { user_id: user }.into());
        }
        let boards = self.boards.read().map_err(|_| Self::lock_err("boards"))?;
        let busy = boards.values().any(|game| {
            game.status != BoardStatus::Finished && game.is_participant(user)
        });
        if busy {
            return Err(DuetError::AlreadyInGame { user_id: user }.into());
        }
        Ok(())
    }

    /// Create a board game; pass `None` as opponent to leave the second
    /// seat open for a friend to join
    pub fn start_board_game(&self, host: UserId, opponent: Option<UserId>) -> Result<GameId> {
        self.ensure_free_for_board(host)?;
        if let Some(opponent) = opponent {
            self.ensure_free_for_board(opponent)?;
        }

        let game = BoardGame::new(generate_game_id(), host, opponent);
        let game_id = game.id;

        let mut boards = self.boards.write().map_err(|_| Self::lock_err("boards"))?;
        boards.insert(game_id, game);
        drop(boards);

        self.metrics.record_game_started("board");
        info!("board game {} started by {} vs {:?}", game_id, host, opponent);
        Ok(game_id)
    }

    /// Join a friend's waiting game
    pub fn join_board_game(&self, game_id: GameId, player: UserId) -> Result<()> {
        self.ensure_free_for_board(player)?;

        let mut boards = self.boards.write().map_err(|_| Self::lock_err("boards"))?;
        let game = boards
            .get_mut(&game_id)
            .ok_or(DuetError::UnknownGame { game_id })?;
        game.join(player)
    }

    /// Snapshot of a live game for rendering
    pub fn board(&self, game_id: GameId) -> Result<BoardGame> {
        let boards = self.boards.read().map_err(|_| Self::lock_err("boards"))?;
        boards
            .get(&game_id)
            .cloned()
            .ok_or_else(|| DuetError::UnknownGame { game_id }.into())
    }

    /// Remember the rendered board message for a player so later moves can
    /// update it in place
    pub fn set_board_message(
        &self,
        game_id: GameId,
        player: UserId,
        message: MessageRef,
    ) -> Result<()> {
        let mut boards = self.boards.write().map_err(|_| Self::lock_err("boards"))?;
        let game = boards
            .get_mut(&game_id)
            .ok_or(DuetError::UnknownGame { game_id })?;
        game.set_message_ref(player, message);
        Ok(())
    }

    /// Validate and apply a move, then settle rewards on a win.
    ///
    /// The stake moves loser -> winner as a zero-sum transfer, clamped to
    /// the loser's balance so no balance ever goes negative.
    pub fn make_move(&self, game_id: GameId, player: UserId, cell: u8) -> Result<MoveReport> {
        let (outcome, snapshot) = {
            let mut boards = self.boards.write().map_err(|_| Self::lock_err("boards"))?;
            let game = boards
                .get_mut(&game_id)
                .ok_or(DuetError::UnknownGame { game_id })?;
            let outcome = game.make_move(player, cell)?;
            (outcome, game.clone())
        };

        let mut points_moved = 0;
        match outcome {
            MoveOutcome::Win(winner) => {
                let loser = snapshot
                    .opponent_of(winner)
                    .ok_or_else(|| DuetError::Internal {
                        message: format!("finished game {} has no opponent", game_id),
                    })?;
                points_moved =
                    self.ledger
                        .transfer_points_clamped(loser, winner, self.settings.board_stake)?;
                self.metrics.record_game_finished("board", "win");
                self.storage.record_game(GameRecord {
                    game_id,
                    kind: GameKind::Board,
                    players: vec![winner, loser],
                    winner: Some(winner),
                    points_delta: points_moved as i64,
                    finished_at: current_timestamp(),
                })?;
                info!(
                    "board game {} won by {} ({} points from {})",
                    game_id, winner, points_moved, loser
                );
            }
            MoveOutcome::Draw => {
                self.metrics.record_game_finished("board", "draw");
                self.storage.record_game(GameRecord {
                    game_id,
                    kind: GameKind::Board,
                    players: vec![snapshot.player_a, snapshot.player_b.unwrap_or(player)],
                    winner: None,
                    points_delta: 0,
                    finished_at: current_timestamp(),
                })?;
                info!("board game {} ended in a draw", game_id);
            }
            MoveOutcome::Continue => {}
        }

        Ok(MoveReport {
            outcome,
            board: snapshot,
            points_moved,
        })
    }

    /// Clear the board for a rematch; either participant may ask
    pub fn restart_board(&self, game_id: GameId, requester: UserId) -> Result<BoardGame> {
        let mut boards = self.boards.write().map_err(|_| Self::lock_err("boards"))?;
        let game = boards
            .get_mut(&game_id)
            .ok_or(DuetError::UnknownGame { game_id })?;
        if !game.is_participant(requester) {
            return Err(DuetError::InvalidMove {
                reason: "you are not part of this game".to_string(),
            }
            .into());
        }
        game.restart();
        Ok(game.clone())
    }

    /// Drop a game immediately (a participant left)
    pub fn exit_board(&self, game_id: GameId, requester: UserId) -> Result<BoardGame> {
        let mut boards = self.boards.write().map_err(|_| Self::lock_err("boards"))?;
        let game = boards
            .get(&game_id)
            .ok_or(DuetError::UnknownGame { game_id })?;
        if !game.is_participant(requester) {
            return Err(DuetError::InvalidMove {
                reason: "you are not part of this game".to_string(),
            }
            .into());
        }
        let game = boards.remove(&game_id).ok_or(DuetError::UnknownGame { game_id })?;
        debug!("board game {} removed on exit by {}", game_id, requester);
        Ok(game)
    }

    /// Find a random board-game opponent within the configured bounded
    /// wait.
    ///
    /// If another user is already waiting, the pairing happens immediately
    /// and this side claims them (the waiter moves first, having waited
    /// longer). Otherwise the caller enters the waiting set and polls until
    /// claimed, cancelled, or timed out. Returns `None` on timeout or
    /// cancellation; the caller is then no longer in the waiting set.
    pub async fn find_random_opponent(&self, player: UserId) -> Result<Option<BoardPairing>> {
        self.ensure_free_for_board(player)?;

        // Immediate claim path
        {
            let mut wait = self
                .board_wait
                .lock()
                .map_err(|_| Self::lock_err("board wait"))?;

            let mut candidates: Vec<UserId> = wait
                .waiting
                .iter()
                .copied()
                .filter(|w| *w != player)
                .collect();
            candidates.shuffle(&mut rand::thread_rng());

            for opponent in candidates {
                if self.ensure_free_for_board(opponent).is_err() {
                    // Stale waiter, e.g. entered a chat while waiting
                    wait.waiting.remove(&opponent);
                    continue;
                }
                wait.waiting.remove(&opponent);

                let game = BoardGame::new(generate_game_id(), opponent, Some(player));
                let game_id = game.id;
                {
                    let mut boards =
                        self.boards.write().map_err(|_| Self::lock_err("boards"))?;
                    boards.insert(game_id, game);
                }
                wait.claims.insert(opponent, game_id);

                self.metrics.record_game_started("board");
                info!("random pairing: {} claimed waiting player {}", player, opponent);
                return Ok(Some(BoardPairing {
                    game_id,
                    opponent,
                    you_start: false,
                }));
            }

            wait.waiting.insert(player);
        }

        // Poll until claimed, cancelled, or timed out; never a busy spin
        let deadline =
            Instant::now() + std::time::Duration::from_secs(self.settings.opponent_timeout_seconds);
        let poll = std::time::Duration::from_millis(self.settings.opponent_poll_ms);

        loop {
            tokio::time::sleep(poll).await;

            let mut wait = self
                .board_wait
                .lock()
                .map_err(|_| Self::lock_err("board wait"))?;

            if let Some(game_id) = wait.claims.remove(&player) {
                drop(wait);
                let game = self.board(game_id)?;
                let opponent = game.opponent_of(player).ok_or_else(|| DuetError::Internal {
                    message: format!("claimed game {} is missing the claimer", game_id),
                })?;
                return Ok(Some(BoardPairing {
                    game_id,
                    opponent,
                    you_start: true,
                }));
            }
            if !wait.waiting.contains(&player) {
                debug!("random-opponent search by {} was cancelled", player);
                return Ok(None);
            }
            if Instant::now() >= deadline {
                wait.waiting.remove(&player);
                debug!("random-opponent search by {} timed out", player);
                return Ok(None);
            }
        }
    }

    /// Abort a pending random-opponent search
    pub fn cancel_opponent_search(&self, player: UserId) -> Result<CancelSearchOutcome> {
        let mut wait = self
            .board_wait
            .lock()
            .map_err(|_| Self::lock_err("board wait"))?;

        if wait.claims.contains_key(&player) {
            // The race was lost to a claim; the pairing is already made and
            // will be delivered by the waiting loop
            return Ok(CancelSearchOutcome::AlreadyMatched);
        }
        if wait.waiting.remove(&player) {
            Ok(CancelSearchOutcome::Cancelled)
        } else {
            Ok(CancelSearchOutcome::NotSearching)
        }
    }

    /// Start a guess game; one active game per player
    pub fn start_guess_game(&self, owner: UserId) -> Result<GuessGame> {
        let mut guesses = self.guesses.write().map_err(|_| Self::lock_err("guesses"))?;
        if guesses
            .values()
            .any(|game| game.owner == owner && !game.finished())
        {
            return Err(DuetError::InvalidRequest {
                reason: "you already have an active guess game".to_string(),
            }
            .into());
        }

        let game = GuessGame::new(generate_game_id(), owner, self.settings.guess_attempts);
        let snapshot = game.clone();
        guesses.insert(game.id, game);
        drop(guesses);

        self.metrics.record_game_started("guess");
        Ok(snapshot)
    }

    /// Apply one guess and settle the game if it finished.
    ///
    /// A correct guess credits the reward; exhaustion consumes the penalty
    /// through the guarded ledger, and is skipped entirely (zero net
    /// change) when the balance cannot cover it.
    pub fn guess(&self, owner: UserId, value: u8) -> Result<GuessReport> {
        let (game_id, outcome) = {
            let mut guesses = self.guesses.write().map_err(|_| Self::lock_err("guesses"))?;
            let game = guesses
                .values_mut()
                .find(|game| game.owner == owner && !game.finished())
                .ok_or_else(|| DuetError::InvalidRequest {
                    reason: "no active guess game".to_string(),
                })?;
            let outcome = game.guess(value);
            let game_id = game.id;
            if game.finished() {
                guesses.remove(&game_id);
            }
            (game_id, outcome)
        };

        let report = match outcome {
            GuessOutcome::Correct { .. } => {
                self.ledger.add_points(owner, self.settings.guess_reward)?;
                self.metrics.record_game_finished("guess", "win");
                self.storage.record_game(GameRecord {
                    game_id,
                    kind: GameKind::Guess,
                    players: vec![owner],
                    winner: Some(owner),
                    points_delta: self.settings.guess_reward as i64,
                    finished_at: current_timestamp(),
                })?;
                GuessReport {
                    outcome,
                    delta: self.settings.guess_reward as i64,
                    penalty_skipped: false,
                }
            }
            GuessOutcome::Exhausted { .. } => {
                let charged = self.ledger.consume_points(owner, self.settings.guess_penalty)?;
                let delta = if charged {
                    -(self.settings.guess_penalty as i64)
                } else {
                    0
                };
                self.metrics.record_game_finished("guess", "loss");
                self.storage.record_game(GameRecord {
                    game_id,
                    kind: GameKind::Guess,
                    players: vec![owner],
                    winner: None,
                    points_delta: delta,
                    finished_at: current_timestamp(),
                })?;
                GuessReport {
                    outcome,
                    delta,
                    penalty_skipped: !charged,
                }
            }
            GuessOutcome::Hint { .. } => GuessReport {
                outcome,
                delta: 0,
                penalty_skipped: false,
            },
        };

        Ok(report)
    }

    /// Purge games untouched for longer than the configured age; returns
    /// how many were removed
    pub fn cleanup_stale(&self) -> Result<usize> {
        let now = current_timestamp();
        let max_age = Duration::seconds(self.settings.stale_game_seconds as i64);
        let mut removed = 0;

        {
            let mut boards = self.boards.write().map_err(|_| Self::lock_err("boards"))?;
            let stale: Vec<GameId> = boards
                .iter()
                .filter(|(_, game)| game.is_stale(now, max_age))
                .map(|(id, _)| *id)
                .collect();
            for id in stale {
                boards.remove(&id);
                removed += 1;
            }
        }
        {
            let mut guesses = self.guesses.write().map_err(|_| Self::lock_err("guesses"))?;
            let stale: Vec<GameId> = guesses
                .iter()
                .filter(|(_, game)| game.is_stale(now, max_age))
                .map(|(id, _)| *id)
                .collect();
            for id in stale {
                guesses.remove(&id);
                removed += 1;
            }
        }

        if removed > 0 {
            info!("purged {} stale games", removed);
        }
        Ok(removed)
    }

    pub fn active_board_games(&self) -> Result<usize> {
        let boards = self.boards.read().map_err(|_| Self::lock_err("boards"))?;
        Ok(boards.len())
    }

    pub fn active_guess_games(&self) -> Result<usize> {
        let guesses = self.guesses.read().map_err(|_| Self::lock_err("guesses"))?;
        Ok(guesses.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EconomySettings;
    use crate::storage::MemoryStorage;

    struct Harness {
        manager: Arc<GameManager>,
        storage: Arc<MemoryStorage>,
        ledger: Arc<Ledger>,
    }

    fn harness_with(settings: GameSettings) -> Harness {
        let storage = Arc::new(MemoryStorage::new());
        let ledger = Arc::new(Ledger::new(storage.clone(), EconomySettings::default()));
        let metrics = Arc::new(MetricsCollector::new().unwrap());
        let manager = Arc::new(GameManager::new(
            storage.clone(),
            ledger.clone(),
            metrics,
            settings,
        ));
        for id in 1..=4 {
            storage.ensure_user(id, &format!("user{}", id)).unwrap();
        }
        Harness {
            manager,
            storage,
            ledger,
        }
    }

    fn harness() -> Harness {
        harness_with(GameSettings::default())
    }

    fn points(h: &Harness, user: UserId) -> u64 {
        h.storage.get_user(user).unwrap().unwrap().points
    }

    #[tokio::test]
    async fn test_win_moves_stake_from_loser_to_winner() {
        let h = harness();
        h.ledger.add_points(1, 100).unwrap();
        h.ledger.add_points(2, 100).unwrap();

        let game_id = h.manager.start_board_game(1, Some(2)).unwrap();
        h.manager.make_move(game_id, 1, 0).unwrap();
        h.manager.make_move(game_id, 2, 3).unwrap();
        h.manager.make_move(game_id, 1, 1).unwrap();
        h.manager.make_move(game_id, 2, 4).unwrap();
        let report = h.manager.make_move(game_id, 1, 2).unwrap();

        assert_eq!(report.outcome, MoveOutcome::Win(1));
        assert_eq!(report.points_moved, 5);
        assert_eq!(points(&h, 1), 105);
        assert_eq!(points(&h, 2), 95);

        let history = h.storage.game_history(1).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].winner, Some(1));
        assert_eq!(history[0].points_delta, 5);
    }

    #[tokio::test]
    async fn test_win_transfer_clamps_to_loser_balance() {
        let h = harness();
        h.ledger.add_points(2, 2).unwrap();

        let game_id = h.manager.start_board_game(1, Some(2)).unwrap();
        h.manager.make_move(game_id, 1, 0).unwrap();
        h.manager.make_move(game_id, 2, 3).unwrap();
        h.manager.make_move(game_id, 1, 1).unwrap();
        h.manager.make_move(game_id, 2, 4).unwrap();
        let report = h.manager.make_move(game_id, 1, 2).unwrap();

        // Zero-sum and non-negative: only 2 points existed to move
        assert_eq!(report.points_moved, 2);
        assert_eq!(points(&h, 1), 2);
        assert_eq!(points(&h, 2), 0);
    }

    #[tokio::test]
    async fn test_draw_moves_no_points() {
        let h = harness();
        h.ledger.add_points(1, 50).unwrap();
        h.ledger.add_points(2, 50).unwrap();

        let game_id = h.manager.start_board_game(1, Some(2)).unwrap();
        for (player, cell) in [
            (1, 0), (2, 2), (1, 1), (2, 3), (1, 5), (2, 4), (1, 6), (2, 7),
        ] {
            h.manager.make_move(game_id, player, cell).unwrap();
        }
        let report = h.manager.make_move(game_id, 1, 8).unwrap();

        assert_eq!(report.outcome, MoveOutcome::Draw);
        assert_eq!(report.points_moved, 0);
        assert_eq!(points(&h, 1), 50);
        assert_eq!(points(&h, 2), 50);
    }

    #[tokio::test]
    async fn test_board_chat_mutual_exclusion() {
        let h = harness();
        h.storage.create_session(1, 3).unwrap();

        let err = h.manager.start_board_game(1, Some(2)).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DuetError>(),
            Some(DuetError::AlreadyInChat { user_id: 1 })
        ));

        let game_id = h.manager.start_board_game(2, Some(4)).unwrap();
        let err = h.manager.start_board_game(2, None).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DuetError>(),
            Some(DuetError::AlreadyInGame { user_id: 2 })
        ));

        // A finished game frees the players again
        h.manager.make_move(game_id, 2, 0).unwrap();
        h.manager.make_move(game_id, 4, 3).unwrap();
        h.manager.make_move(game_id, 2, 1).unwrap();
        h.manager.make_move(game_id, 4, 4).unwrap();
        h.manager.make_move(game_id, 2, 2).unwrap();
        assert!(h.manager.start_board_game(2, None).is_ok());
    }

    #[tokio::test]
    async fn test_restart_allows_rematch() {
        let h = harness();
        let game_id = h.manager.start_board_game(1, Some(2)).unwrap();
        h.manager.make_move(game_id, 1, 0).unwrap();

        let board = h.manager.restart_board(game_id, 2).unwrap();
        assert_eq!(board.empty_cells(), 9);
        assert_eq!(board.turn, 1);

        assert!(h.manager.restart_board(game_id, 3).is_err());
    }

    #[tokio::test]
    async fn test_random_opponent_rendezvous() {
        let mut settings = GameSettings::default();
        settings.opponent_timeout_seconds = 2;
        settings.opponent_poll_ms = 20;
        let h = harness_with(settings);

        let waiter = {
            let manager = h.manager.clone();
            tokio::spawn(async move { manager.find_random_opponent(1).await.unwrap() })
        };
        // Give the waiter time to enter the waiting set
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let claimer = h.manager.find_random_opponent(2).await.unwrap().unwrap();
        assert_eq!(claimer.opponent, 1);
        assert!(!claimer.you_start);

        let waited = waiter.await.unwrap().unwrap();
        assert_eq!(waited.opponent, 2);
        assert!(waited.you_start);
        assert_eq!(waited.game_id, claimer.game_id);

        // The waiter moves first
        let board = h.manager.board(claimer.game_id).unwrap();
        assert_eq!(board.turn, 1);
    }

    #[tokio::test]
    async fn test_random_opponent_timeout() {
        let mut settings = GameSettings::default();
        settings.opponent_timeout_seconds = 1;
        settings.opponent_poll_ms = 20;
        let h = harness_with(settings);

        let pairing = h.manager.find_random_opponent(1).await.unwrap();
        assert_eq!(pairing, None);

        // Timed-out waiter is no longer claimable
        assert_eq!(
            h.manager.cancel_opponent_search(1).unwrap(),
            CancelSearchOutcome::NotSearching
        );
    }

    #[tokio::test]
    async fn test_cancel_releases_waiter() {
        let mut settings = GameSettings::default();
        settings.opponent_timeout_seconds = 5;
        settings.opponent_poll_ms = 20;
        let h = harness_with(settings);

        let waiter = {
            let manager = h.manager.clone();
            tokio::spawn(async move { manager.find_random_opponent(1).await.unwrap() })
        };
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        assert_eq!(
            h.manager.cancel_opponent_search(1).unwrap(),
            CancelSearchOutcome::Cancelled
        );
        // The wait aborts promptly instead of running to the timeout
        let outcome =
            tokio::time::timeout(std::time::Duration::from_millis(500), waiter).await;
        assert_eq!(outcome.unwrap().unwrap(), None);
    }

    #[tokio::test]
    async fn test_single_active_guess_game_per_player() {
        let h = harness();

        h.manager.start_guess_game(1).unwrap();
        assert!(h.manager.start_guess_game(1).is_err());
        assert!(h.manager.start_guess_game(2).is_ok());
    }

    #[tokio::test]
    async fn test_guess_win_credits_reward() {
        let h = harness();

        let game = h.manager.start_guess_game(1).unwrap();
        // Walk the hint gradient to the target within the attempt limit
        let mut low = 1u8;
        let mut high = 100u8;
        let mut report = None;
        for _ in 0..10 {
            let probe = low + (high - low) / 2;
            let step = h.manager.guess(1, probe).unwrap();
            match step.outcome {
                GuessOutcome::Correct { .. } => {
                    report = Some(step);
                    break;
                }
                GuessOutcome::Hint { higher, .. } => {
                    if higher {
                        low = probe + 1;
                    } else {
                        high = probe - 1;
                    }
                }
                GuessOutcome::Exhausted { .. } => panic!("binary search cannot exhaust 10 tries"),
            }
        }
        let report = report.expect("binary search over 1..=100 finds the target");
        assert_eq!(report.delta, 5);
        assert_eq!(points(&h, 1), 5);
        drop(game);
    }

    #[tokio::test]
    async fn test_guess_penalty_skipped_when_balance_short() {
        let h = harness();
        h.ledger.add_points(1, 1).unwrap();

        h.manager.start_guess_game(1).unwrap();
        let mut last = None;
        for _ in 0..10 {
            // 0 is never the target, so every attempt misses
            last = Some(h.manager.guess(1, 0).unwrap());
        }
        let last = last.unwrap();

        assert!(matches!(last.outcome, GuessOutcome::Exhausted { .. }));
        assert!(last.penalty_skipped);
        assert_eq!(last.delta, 0);
        assert_eq!(points(&h, 1), 1);

        // The session is gone; a new one can start
        assert!(h.manager.guess(1, 50).is_err());
        assert!(h.manager.start_guess_game(1).is_ok());
    }

    #[tokio::test]
    async fn test_guess_penalty_charged_when_covered() {
        let h = harness();
        h.ledger.add_points(1, 10).unwrap();

        h.manager.start_guess_game(1).unwrap();
        let mut last = None;
        for _ in 0..10 {
            last = Some(h.manager.guess(1, 0).unwrap());
        }
        let last = last.unwrap();

        assert_eq!(last.delta, -2);
        assert!(!last.penalty_skipped);
        assert_eq!(points(&h, 1), 8);
    }

    #[tokio::test]
    async fn test_cleanup_purges_stale_games() {
        let mut settings = GameSettings::default();
        settings.stale_game_seconds = 0;
        let h = harness_with(settings);

        h.manager.start_board_game(1, Some(2)).unwrap();
        h.manager.start_guess_game(3).unwrap();
        assert_eq!(h.manager.active_board_games().unwrap(), 1);

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let removed = h.manager.cleanup_stale().unwrap();
        assert_eq!(removed, 2);
        assert_eq!(h.manager.active_board_games().unwrap(), 0);
        assert_eq!(h.manager.active_guess_games().unwrap(), 0);
    }
}
