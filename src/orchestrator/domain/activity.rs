//! Bounded summary of orchestrator activity for the statistics export.

use crate::protocol::domain::SessionId;
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::Serialize;
use std::collections::VecDeque;

/// Severity of an activity record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityLevel {
    /// Normal operation.
    Info,
    /// Degraded but answered.
    Warn,
    /// Not answered.
    Error,
}

/// One notable orchestrator event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivityRecord {
    /// Severity.
    pub level: ActivityLevel,
    /// Caller-safe description.
    pub message: String,
    /// Session the event belongs to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionId>,
    /// When it happened.
    pub timestamp: DateTime<Utc>,
}

/// Counts by level plus the most recent records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LogSummary {
    /// Records ever logged.
    pub total: u64,
    /// Info records ever logged.
    pub info: u64,
    /// Warn records ever logged.
    pub warn: u64,
    /// Error records ever logged.
    pub error: u64,
    /// Retained records, oldest first.
    pub recent: Vec<ActivityRecord>,
}

/// Ring buffer of activity records with lifetime counters.
#[derive(Debug, Clone)]
pub struct ActivityLog {
    capacity: usize,
    records: VecDeque<ActivityRecord>,
    summary: LogSummary,
}

impl ActivityLog {
    /// Creates a log keeping at most `capacity` records.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            records: VecDeque::with_capacity(capacity),
            summary: LogSummary::default(),
        }
    }

    /// Appends a record, evicting the oldest once full.
    pub fn record(
        &mut self,
        level: ActivityLevel,
        message: impl Into<String>,
        session: Option<&SessionId>,
        clock: &impl Clock,
    ) {
        let counter = match level {
            ActivityLevel::Info => &mut self.summary.info,
            ActivityLevel::Warn => &mut self.summary.warn,
            ActivityLevel::Error => &mut self.summary.error,
        };
        *counter = counter.saturating_add(1);
        self.summary.total = self.summary.total.saturating_add(1);

        if self.capacity == 0 {
            return;
        }
        while self.records.len() >= self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(ActivityRecord {
            level,
            message: message.into(),
            session: session.cloned(),
            timestamp: clock.utc(),
        });
    }

    /// Returns the counters and retained records.
    #[must_use]
    pub fn summary(&self) -> LogSummary {
        LogSummary {
            recent: self.records.iter().cloned().collect(),
            ..self.summary.clone()
        }
    }

    /// Returns the number of retained records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` when no records are retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
