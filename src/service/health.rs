//! Health check logic for the duet service

use crate::error::Result;
use crate::metrics::{CoreStats, StatsSource};
use std::sync::Arc;

/// Overall health state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Degraded => write!(f, "degraded"),
        }
    }
}

/// One health check result
#[derive(Debug, Clone)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub stats: CoreStats,
}

/// Health check runner
pub struct HealthCheck;

impl HealthCheck {
    /// A service is healthy when its core state can be snapshotted; a
    /// failing snapshot means a poisoned lock or unreachable store
    pub fn check(source: &Arc<dyn StatsSource>) -> Result<HealthReport> {
        match source.snapshot() {
            Ok(stats) => Ok(HealthReport {
                status: HealthStatus::Healthy,
                stats,
            }),
            Err(_) => Ok(HealthReport {
                status: HealthStatus::Degraded,
                stats: CoreStats::default(),
            }),
        }
    }
}
