//! Orchestrator configuration, routing values and observability types.

mod activity;
mod config;
mod routing;
mod statistics;

pub use activity::{ActivityLevel, ActivityLog, ActivityRecord, LogSummary};
pub use config::{DEFAULT_ACTIVITY_CAPACITY, FallbackPolicy, GENERAL_INTENT, OrchestratorConfig};
pub use routing::{RouteRule, RoutedIntent};
pub use statistics::{AgentStatistics, SessionStatistics, StatisticsSnapshot};
