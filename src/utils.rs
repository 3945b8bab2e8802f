//! Utility functions for the matchmaking core

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Generate a new unique chat session ID
pub fn generate_session_id() -> Uuid {
    Uuid::new_v4()
}

/// Generate a new unique game ID
pub fn generate_game_id() -> Uuid {
    Uuid::new_v4()
}

/// Get the current UTC timestamp
pub fn current_timestamp() -> DateTime<Utc> {
    Utc::now()
}

/// Cosmetic level derived from total points
pub fn level_for_points(points: u64) -> u32 {
    (points / 100) as u32 + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_unique_ids() {
        assert_ne!(generate_session_id(), generate_session_id());
        assert_ne!(generate_game_id(), generate_game_id());
    }

    #[test]
    fn test_level_for_points() {
        assert_eq!(level_for_points(0), 1);
        assert_eq!(level_for_points(99), 1);
        assert_eq!(level_for_points(100), 2);
        assert_eq!(level_for_points(250), 3);
    }
}
