//! Single-player number guessing game
//!
//! The target is drawn uniformly from 1..=100 at creation. A correct guess
//! ends the game with a reward regardless of the attempt number; running
//! out of attempts ends it with a penalty that settlement may skip.

use crate::types::{GameId, UserId};
use crate::utils::current_timestamp;
use chrono::{DateTime, Duration, Utc};
use rand::Rng;

/// Lifecycle state of a guess game
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuessStatus {
    Active,
    Finished,
}

/// Result of one guess
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuessOutcome {
    /// Guessed the target; the game is over
    Correct { attempts: u32 },
    /// Attempts exhausted without success; the game is over
    Exhausted { target: u8 },
    /// Keep guessing; `higher` tells which direction the target lies
    Hint { higher: bool, remaining: u32 },
}

/// A live guess game
#[derive(Debug, Clone)]
pub struct GuessGame {
    pub id: GameId,
    pub owner: UserId,
    target: u8,
    pub attempts: u32,
    pub limit: u32,
    pub status: GuessStatus,
    pub created_at: DateTime<Utc>,
}

impl GuessGame {
    pub fn new(id: GameId, owner: UserId, limit: u32) -> Self {
        Self::with_target(id, owner, limit, rand::thread_rng().gen_range(1..=100))
    }

    /// Deterministic constructor for tests
    pub fn with_target(id: GameId, owner: UserId, limit: u32, target: u8) -> Self {
        Self {
            id,
            owner,
            target,
            attempts: 0,
            limit,
            status: GuessStatus::Active,
            created_at: current_timestamp(),
        }
    }

    pub fn finished(&self) -> bool {
        self.status == GuessStatus::Finished
    }

    /// Consume one attempt and evaluate the guess
    pub fn guess(&mut self, value: u8) -> GuessOutcome {
        self.attempts += 1;

        if value == self.target {
            self.status = GuessStatus::Finished;
            return GuessOutcome::Correct {
                attempts: self.attempts,
            };
        }
        if self.attempts >= self.limit {
            self.status = GuessStatus::Finished;
            return GuessOutcome::Exhausted {
                target: self.target,
            };
        }
        GuessOutcome::Hint {
            higher: value < self.target,
            remaining: self.limit - self.attempts,
        }
    }

    pub fn is_stale(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        now - self.created_at > max_age
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_target_is_in_range() {
        for _ in 0..100 {
            let game = GuessGame::new(Uuid::new_v4(), 1, 10);
            assert!((1..=100).contains(&game.target));
        }
    }

    #[test]
    fn test_hints_point_toward_target() {
        let mut game = GuessGame::with_target(Uuid::new_v4(), 1, 10, 42);

        assert_eq!(
            game.guess(10),
            GuessOutcome::Hint {
                higher: true,
                remaining: 9
            }
        );
        assert_eq!(
            game.guess(90),
            GuessOutcome::Hint {
                higher: false,
                remaining: 8
            }
        );
    }

    #[test]
    fn test_correct_guess_ends_game_at_any_attempt() {
        let mut game = GuessGame::with_target(Uuid::new_v4(), 1, 10, 42);
        for wrong in [1, 2, 3, 4, 5, 6, 7, 8, 9] {
            assert!(matches!(game.guess(wrong), GuessOutcome::Hint { .. }));
        }
        assert_eq!(game.guess(42), GuessOutcome::Correct { attempts: 10 });
        assert!(game.finished());
    }

    #[test]
    fn test_attempts_never_exceed_limit() {
        let mut game = GuessGame::with_target(Uuid::new_v4(), 1, 10, 42);
        for wrong in 1..=9 {
            game.guess(wrong);
        }
        assert_eq!(game.guess(10), GuessOutcome::Exhausted { target: 42 });
        assert!(game.finished());
        assert_eq!(game.attempts, 10);
    }
}
