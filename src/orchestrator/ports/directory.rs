//! Caller preference lookup.

use crate::protocol::domain::AgentFault;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;

/// Source of per-caller preferences such as language or channel.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CallerDirectory: Send + Sync {
    /// Returns the preferences recorded for `caller_id`.
    ///
    /// # Errors
    ///
    /// Returns a fault when the directory is unavailable. Preferences are
    /// optional, so the orchestrator logs the fault and carries on.
    async fn preferences(&self, caller_id: &str) -> Result<BTreeMap<String, Value>, AgentFault>;
}
