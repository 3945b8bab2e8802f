//! Property tests for the game rules
//!
//! Random move sequences must never produce two winners, more marks than
//! cells, or a finished-win board without exactly the winner's line(s);
//! guess games must never exceed their attempt limit.

use duet::games::{BoardGame, BoardStatus, GuessGame, MoveOutcome};
use duet::types::GameId;
use proptest::prelude::*;
use uuid::Uuid;

fn fresh_game_id() -> GameId {
    Uuid::new_v4()
}

proptest! {
    /// Apply an arbitrary stream of (player, cell) attempts; only legal
    /// moves are accepted, and the terminal state always satisfies the
    /// board invariants.
    #[test]
    fn board_invariants_hold_for_random_move_streams(
        moves in prop::collection::vec((prop::sample::select(vec![1i64, 2]), 0u8..12), 0..40)
    ) {
        let mut game = BoardGame::new(fresh_game_id(), 1, Some(2));
        let mut accepted = 0;
        let mut winner = None;

        for (player, cell) in moves {
            match game.make_move(player, cell) {
                Ok(outcome) => {
                    accepted += 1;
                    match outcome {
                        MoveOutcome::Win(w) => {
                            prop_assert!(winner.is_none(), "a second win was reported");
                            winner = Some(w);
                        }
                        MoveOutcome::Draw => {
                            prop_assert_eq!(game.empty_cells(), 0);
                        }
                        MoveOutcome::Continue => {}
                    }
                }
                Err(_) => {
                    // Rejected moves must leave the board untouched
                }
            }
            prop_assert!(accepted <= 9, "more accepted moves than cells");
        }

        match game.status {
            BoardStatus::Finished => {
                if let Some(w) = winner {
                    let loser = game.opponent_of(w).unwrap();
                    prop_assert!(game.winning_lines_of(w) >= 1);
                    prop_assert_eq!(game.winning_lines_of(loser), 0);
                } else {
                    // Draw: full board, no line for anyone
                    prop_assert_eq!(game.empty_cells(), 0);
                    prop_assert_eq!(game.winning_lines_of(1), 0);
                    prop_assert_eq!(game.winning_lines_of(2), 0);
                }
            }
            _ => prop_assert!(winner.is_none()),
        }
    }

    /// Guess sessions end at or before the attempt limit, and a correct
    /// guess always finishes the game.
    #[test]
    fn guess_attempts_bounded(target in 1u8..=100, guesses in prop::collection::vec(0u8..=110, 1..30)) {
        let mut game = GuessGame::with_target(fresh_game_id(), 1, 10, target);

        for value in guesses {
            if game.finished() {
                break;
            }
            game.guess(value);
            prop_assert!(game.attempts <= 10);
        }
    }

    /// A win-reported board has exactly one mover whose mark owns a line.
    #[test]
    fn winner_is_unique(seed in prop::collection::vec(0u8..9, 9)) {
        let mut game = BoardGame::new(fresh_game_id(), 1, Some(2));
        let mut current = 1i64;

        for cell in seed {
            if game.status == BoardStatus::Finished {
                break;
            }
            if game.make_move(current, cell).is_ok() {
                current = if current == 1 { 2 } else { 1 };
            }
        }

        let lines_a = game.winning_lines_of(1);
        let lines_b = game.winning_lines_of(2);
        prop_assert!(
            lines_a == 0 || lines_b == 0,
            "both players own winning lines"
        );
    }
}
