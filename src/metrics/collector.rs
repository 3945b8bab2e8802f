//! Prometheus metrics collection

use crate::error::Result;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

/// Collector owning the registry and every metric the core records
pub struct MetricsCollector {
    registry: Registry,

    pub searches_started: IntCounterVec,
    pub matches_made: IntCounter,
    pub sessions_ended: IntCounter,
    pub messages_relayed: IntCounterVec,
    pub word_penalties_total: IntCounter,
    pub games_started: IntCounterVec,
    pub games_finished: IntCounterVec,
    pub vip_grants: IntCounter,

    pub pool_size: IntGauge,
    pub active_sessions: IntGauge,
    pub active_games: IntGauge,
}

impl MetricsCollector {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let searches_started = IntCounterVec::new(
            Opts::new("duet_searches_started_total", "Partner searches started"),
            &["filtered"],
        )?;
        let matches_made = IntCounter::with_opts(Opts::new(
            "duet_matches_made_total",
            "Chat sessions established by the matching engine",
        ))?;
        let sessions_ended = IntCounter::with_opts(Opts::new(
            "duet_sessions_ended_total",
            "Chat sessions torn down",
        ))?;
        let messages_relayed = IntCounterVec::new(
            Opts::new("duet_messages_relayed_total", "Messages forwarded between partners"),
            &["kind"],
        )?;
        let word_penalties_total = IntCounter::with_opts(Opts::new(
            "duet_word_penalties_total",
            "Filtered-word penalties applied",
        ))?;
        let games_started = IntCounterVec::new(
            Opts::new("duet_games_started_total", "Mini-games started"),
            &["kind"],
        )?;
        let games_finished = IntCounterVec::new(
            Opts::new("duet_games_finished_total", "Mini-games finished"),
            &["kind", "outcome"],
        )?;
        let vip_grants = IntCounter::with_opts(Opts::new(
            "duet_vip_grants_total",
            "VIP subscriptions granted or extended",
        ))?;

        let pool_size = IntGauge::with_opts(Opts::new(
            "duet_pool_size",
            "Users currently in the waiting pool",
        ))?;
        let active_sessions = IntGauge::with_opts(Opts::new(
            "duet_active_sessions",
            "Currently active chat sessions",
        ))?;
        let active_games = IntGauge::with_opts(Opts::new(
            "duet_active_games",
            "Currently live mini-games",
        ))?;

        registry.register(Box::new(searches_started.clone()))?;
        registry.register(Box::new(matches_made.clone()))?;
        registry.register(Box::new(sessions_ended.clone()))?;
        registry.register(Box::new(messages_relayed.clone()))?;
        registry.register(Box::new(word_penalties_total.clone()))?;
        registry.register(Box::new(games_started.clone()))?;
        registry.register(Box::new(games_finished.clone()))?;
        registry.register(Box::new(vip_grants.clone()))?;
        registry.register(Box::new(pool_size.clone()))?;
        registry.register(Box::new(active_sessions.clone()))?;
        registry.register(Box::new(active_games.clone()))?;

        Ok(Self {
            registry,
            searches_started,
            matches_made,
            sessions_ended,
            messages_relayed,
            word_penalties_total,
            games_started,
            games_finished,
            vip_grants,
            pool_size,
            active_sessions,
            active_games,
        })
    }

    pub fn record_search(&self, filtered: bool) {
        let label = if filtered { "yes" } else { "no" };
        self.searches_started.with_label_values(&[label]).inc();
    }

    pub fn record_match(&self) {
        self.matches_made.inc();
    }

    pub fn record_session_ended(&self) {
        self.sessions_ended.inc();
    }

    pub fn record_relayed(&self, kind: &str) {
        self.messages_relayed.with_label_values(&[kind]).inc();
    }

    pub fn record_word_penalty(&self) {
        self.word_penalties_total.inc();
    }

    pub fn record_game_started(&self, kind: &str) {
        self.games_started.with_label_values(&[kind]).inc();
    }

    pub fn record_game_finished(&self, kind: &str, outcome: &str) {
        self.games_finished.with_label_values(&[kind, outcome]).inc();
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Encode the registry in the Prometheus text format
    pub fn export(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
