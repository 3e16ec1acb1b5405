//! Caller directory adapters.

use crate::{orchestrator::ports::CallerDirectory, protocol::domain::AgentFault};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// Directory with no recorded preferences.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPreferences;

#[async_trait]
impl CallerDirectory for NoPreferences {
    async fn preferences(&self, _caller_id: &str) -> Result<BTreeMap<String, Value>, AgentFault> {
        Ok(BTreeMap::new())
    }
}

/// Fixed in-memory preferences keyed by caller id.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    callers: HashMap<String, BTreeMap<String, Value>>,
}

impl StaticDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one preference for `caller_id`.
    #[must_use]
    pub fn with_preference(
        mut self,
        caller_id: impl Into<String>,
        key: impl Into<String>,
        value: Value,
    ) -> Self {
        self.callers
            .entry(caller_id.into())
            .or_default()
            .insert(key.into(), value);
        self
    }
}

#[async_trait]
impl CallerDirectory for StaticDirectory {
    async fn preferences(&self, caller_id: &str) -> Result<BTreeMap<String, Value>, AgentFault> {
        Ok(self.callers.get(caller_id).cloned().unwrap_or_default())
    }
}
