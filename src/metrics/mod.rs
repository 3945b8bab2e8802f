//! Metrics and monitoring for the duet matchmaking core
//!
//! Prometheus counters/gauges for matching, relay, game, and economy
//! activity, plus an HTTP server exposing health and metrics endpoints.

pub mod collector;
pub mod health;

pub use collector::MetricsCollector;
pub use health::{CoreStats, HealthServer, HealthServerConfig, StatsSource};
