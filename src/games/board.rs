//! Two-player 3x3 board game
//!
//! State machine: `Waiting -> Active -> Finished`. `Waiting` only occurs
//! when a game is created for a friend who has not joined yet; the random
//! matchmaking path always creates games with both players known.

use crate::error::{DuetError, Result};
use crate::types::{GameId, MessageRef, UserId};
use crate::utils::current_timestamp;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

/// One cell of the board
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cell {
    Empty,
    A,
    B,
}

/// Lifecycle state of a board game
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardStatus {
    Waiting,
    Active,
    Finished,
}

/// Result of an accepted move
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    Continue,
    Draw,
    Win(UserId),
}

/// All 8 winning lines: 3 rows, 3 columns, 2 diagonals
const WIN_LINES: [[usize; 3]; 8] = [
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8],
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8],
    [0, 4, 8],
    [2, 4, 6],
];

/// A live board game
#[derive(Debug, Clone)]
pub struct BoardGame {
    pub id: GameId,
    pub player_a: UserId,
    pub player_b: Option<UserId>,
    board: [Cell; 9],
    pub turn: UserId,
    pub status: BoardStatus,
    pub winner: Option<UserId>,
    /// Message handles per player for live board updates
    message_refs: HashMap<UserId, MessageRef>,
    pub created_at: DateTime<Utc>,
    pub last_move_at: DateTime<Utc>,
}

impl BoardGame {
    pub fn new(id: GameId, player_a: UserId, player_b: Option<UserId>) -> Self {
        let now = current_timestamp();
        Self {
            id,
            player_a,
            player_b,
            board: [Cell::Empty; 9],
            turn: player_a,
            status: if player_b.is_some() {
                BoardStatus::Active
            } else {
                BoardStatus::Waiting
            },
            winner: None,
            message_refs: HashMap::new(),
            created_at: now,
            last_move_at: now,
        }
    }

    /// Fill the empty seat; fails once the game has started
    pub fn join(&mut self, player: UserId) -> Result<()> {
        if self.status != BoardStatus::Waiting || self.player_b.is_some() {
            return Err(DuetError::InvalidMove {
                reason: "this game already has two players".to_string(),
            }
            .into());
        }
        if player == self.player_a {
            return Err(DuetError::InvalidMove {
                reason: "cannot play against yourself".to_string(),
            }
            .into());
        }
        self.player_b = Some(player);
        self.status = BoardStatus::Active;
        self.last_move_at = current_timestamp();
        Ok(())
    }

    pub fn is_participant(&self, player: UserId) -> bool {
        player == self.player_a || self.player_b == Some(player)
    }

    pub fn opponent_of(&self, player: UserId) -> Option<UserId> {
        if player == self.player_a {
            self.player_b
        } else if self.player_b == Some(player) {
            Some(self.player_a)
        } else {
            None
        }
    }

    fn mark_of(&self, player: UserId) -> Cell {
        if player == self.player_a {
            Cell::A
        } else {
            Cell::B
        }
    }

    pub fn cell(&self, index: usize) -> Cell {
        self.board[index]
    }

    /// Validate and place a move, then evaluate the board.
    ///
    /// Rejections (wrong state, wrong turn, out-of-range cell, occupied
    /// cell) are `InvalidMove` user errors; the board is untouched.
    pub fn make_move(&mut self, player: UserId, cell_index: u8) -> Result<MoveOutcome> {
        if self.status != BoardStatus::Active {
            return Err(DuetError::InvalidMove {
                reason: "the game is not active".to_string(),
            }
            .into());
        }
        if !self.is_participant(player) {
            return Err(DuetError::InvalidMove {
                reason: "you are not part of this game".to_string(),
            }
            .into());
        }
        if self.turn != player {
            return Err(DuetError::InvalidMove {
                reason: "it is not your turn".to_string(),
            }
            .into());
        }
        if cell_index > 8 {
            return Err(DuetError::InvalidMove {
                reason: format!("cell {} is out of range", cell_index),
            }
            .into());
        }
        let index = cell_index as usize;
        if self.board[index] != Cell::Empty {
            return Err(DuetError::InvalidMove {
                reason: "that cell is already taken".to_string(),
            }
            .into());
        }

        let mark = self.mark_of(player);
        self.board[index] = mark;
        self.last_move_at = current_timestamp();

        if self.has_winning_line(mark) {
            self.status = BoardStatus::Finished;
            self.winner = Some(player);
            return Ok(MoveOutcome::Win(player));
        }
        if self.board.iter().all(|cell| *cell != Cell::Empty) {
            self.status = BoardStatus::Finished;
            return Ok(MoveOutcome::Draw);
        }

        self.turn = self
            .opponent_of(player)
            .unwrap_or(self.player_a);
        Ok(MoveOutcome::Continue)
    }

    fn has_winning_line(&self, mark: Cell) -> bool {
        WIN_LINES
            .iter()
            .any(|line| line.iter().all(|&i| self.board[i] == mark))
    }

    /// Number of winning lines fully owned by `player`'s mark
    pub fn winning_lines_of(&self, player: UserId) -> usize {
        let mark = self.mark_of(player);
        WIN_LINES
            .iter()
            .filter(|line| line.iter().all(|&i| self.board[i] == mark))
            .count()
    }

    pub fn empty_cells(&self) -> usize {
        self.board.iter().filter(|cell| **cell == Cell::Empty).count()
    }

    /// Clear the board and hand the turn back to the original first player
    pub fn restart(&mut self) {
        self.board = [Cell::Empty; 9];
        self.turn = self.player_a;
        self.status = BoardStatus::Active;
        self.winner = None;
        self.last_move_at = current_timestamp();
    }

    pub fn set_message_ref(&mut self, player: UserId, message: MessageRef) {
        self.message_refs.insert(player, message);
    }

    pub fn message_ref(&self, player: UserId) -> Option<MessageRef> {
        self.message_refs.get(&player).copied()
    }

    pub fn is_stale(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        now - self.last_move_at > max_age
    }

    /// Plain-text board rendering for transports without inline keyboards
    pub fn render(&self) -> String {
        let glyph = |cell: Cell| match cell {
            Cell::Empty => '.',
            Cell::A => 'X',
            Cell::B => 'O',
        };
        let b = &self.board;
        format!(
            "{}|{}|{}\n-----\n{}|{}|{}\n-----\n{}|{}|{}",
            glyph(b[0]),
            glyph(b[1]),
            glyph(b[2]),
            glyph(b[3]),
            glyph(b[4]),
            glyph(b[5]),
            glyph(b[6]),
            glyph(b[7]),
            glyph(b[8])
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn game() -> BoardGame {
        BoardGame::new(Uuid::new_v4(), 1, Some(2))
    }

    #[test]
    fn test_new_game_with_both_players_is_active() {
        let game = game();
        assert_eq!(game.status, BoardStatus::Active);
        assert_eq!(game.turn, 1);
        assert_eq!(game.empty_cells(), 9);
    }

    #[test]
    fn test_waiting_game_activates_on_join() {
        let mut game = BoardGame::new(Uuid::new_v4(), 1, None);
        assert_eq!(game.status, BoardStatus::Waiting);
        assert!(game.make_move(1, 0).is_err());

        assert!(game.join(1).is_err());
        game.join(2).unwrap();
        assert_eq!(game.status, BoardStatus::Active);
        assert!(game.join(3).is_err());
    }

    #[test]
    fn test_move_rejections() {
        let mut game = game();

        // Not player 2's turn
        assert!(game.make_move(2, 0).is_err());
        // Outsider
        assert!(game.make_move(3, 0).is_err());
        // Out of range
        assert!(game.make_move(1, 9).is_err());

        game.make_move(1, 4).unwrap();
        // Occupied
        assert!(game.make_move(2, 4).is_err());
        assert_eq!(game.empty_cells(), 8);
    }

    #[test]
    fn test_row_win() {
        let mut game = game();
        game.make_move(1, 0).unwrap();
        game.make_move(2, 3).unwrap();
        game.make_move(1, 1).unwrap();
        game.make_move(2, 4).unwrap();

        let outcome = game.make_move(1, 2).unwrap();
        assert_eq!(outcome, MoveOutcome::Win(1));
        assert_eq!(game.status, BoardStatus::Finished);
        assert_eq!(game.winner, Some(1));
        assert_eq!(game.winning_lines_of(1), 1);
        assert_eq!(game.winning_lines_of(2), 0);

        // No moves after the game is over
        assert!(game.make_move(2, 5).is_err());
    }

    #[test]
    fn test_diagonal_win() {
        let mut game = game();
        game.make_move(1, 0).unwrap();
        game.make_move(2, 1).unwrap();
        game.make_move(1, 4).unwrap();
        game.make_move(2, 2).unwrap();

        assert_eq!(game.make_move(1, 8).unwrap(), MoveOutcome::Win(1));
    }

    #[test]
    fn test_draw_fills_board_without_line() {
        let mut game = game();
        // X: 0 1 5 6 8 / O: 2 3 4 7 ends in a draw
        for (player, cell) in [(1, 0), (2, 2), (1, 1), (2, 3), (1, 5), (2, 4), (1, 6), (2, 7)] {
            assert_eq!(game.make_move(player, cell).unwrap(), MoveOutcome::Continue);
        }
        assert_eq!(game.make_move(1, 8).unwrap(), MoveOutcome::Draw);
        assert_eq!(game.status, BoardStatus::Finished);
        assert_eq!(game.winner, None);
        assert_eq!(game.empty_cells(), 0);
        assert_eq!(game.winning_lines_of(1), 0);
        assert_eq!(game.winning_lines_of(2), 0);
    }

    #[test]
    fn test_restart_resets_board_and_turn() {
        let mut game = game();
        game.make_move(1, 0).unwrap();
        game.make_move(2, 1).unwrap();
        game.restart();

        assert_eq!(game.status, BoardStatus::Active);
        assert_eq!(game.turn, 1);
        assert_eq!(game.empty_cells(), 9);
        assert_eq!(game.winner, None);
    }

    #[test]
    fn test_message_refs() {
        let mut game = game();
        game.set_message_ref(1, 1001);
        game.set_message_ref(2, 1002);
        assert_eq!(game.message_ref(1), Some(1001));
        assert_eq!(game.message_ref(2), Some(1002));
        assert_eq!(game.message_ref(3), None);
    }

    #[test]
    fn test_render_shows_marks() {
        let mut game = game();
        game.make_move(1, 0).unwrap();
        game.make_move(2, 4).unwrap();
        let rendered = game.render();
        assert!(rendered.starts_with("X|.|."));
        assert!(rendered.contains(".|O|."));
    }
}
