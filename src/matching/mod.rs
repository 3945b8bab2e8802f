//! Partner matching: waiting pool, pairing, and session lifecycle

pub mod engine;

pub use engine::MatchEngine;
