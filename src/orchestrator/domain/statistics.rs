//! Observability export.

use crate::resilience::{circuit_breaker::CircuitBreakerStats, retry::ErrorPattern};
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::LogSummary;

/// Point-in-time view of the orchestrator for monitoring.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatisticsSnapshot {
    /// When the snapshot was taken.
    pub generated_at: DateTime<Utc>,
    /// Per-dependency breaker state, one entry per registered worker or
    /// breaker, sorted by name.
    pub agents: Vec<AgentStatistics>,
    /// Session counts.
    pub sessions: SessionStatistics,
    /// Activity log summary.
    pub logs: LogSummary,
    /// Learned retry patterns, sorted by error type.
    pub retry_patterns: Vec<ErrorPattern>,
}

/// One worker's view in the snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentStatistics {
    /// Dependency name, the worker's agent id.
    pub agent: String,
    /// Whether a handler is registered.
    pub registered: bool,
    /// Breaker counters once the worker has been called.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub breaker: Option<CircuitBreakerStats>,
}

/// Session counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionStatistics {
    /// Live sessions in the backing tier.
    pub active: usize,
}
