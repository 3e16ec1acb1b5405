//! Intent routing values.

use crate::protocol::domain::AgentId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Routes caller text containing `keyword` to `agent` under `intent`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RouteRule {
    /// Case-insensitive substring to look for.
    pub keyword: String,
    /// Intent name given to matching text.
    pub intent: String,
    /// Worker that handles the intent.
    pub agent: AgentId,
}

impl RouteRule {
    /// Creates a rule.
    #[must_use]
    pub fn new(
        keyword: impl Into<String>,
        intent: impl Into<String>,
        agent: impl Into<AgentId>,
    ) -> Self {
        Self {
            keyword: keyword.into(),
            intent: intent.into(),
            agent: agent.into(),
        }
    }

    /// Returns `true` when `text` contains the keyword, ignoring case.
    #[must_use]
    pub fn matches(&self, text: &str) -> bool {
        let keyword = self.keyword.trim().to_lowercase();
        !keyword.is_empty() && text.to_lowercase().contains(&keyword)
    }
}

/// Where a caller utterance should go.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutedIntent {
    /// Intent name, also the cache and template key.
    pub intent: String,
    /// Worker that should answer.
    pub agent: AgentId,
    /// Entities extracted from the utterance.
    pub entities: BTreeMap<String, Value>,
}

impl RoutedIntent {
    /// Creates a routing decision without entities.
    #[must_use]
    pub fn new(intent: impl Into<String>, agent: impl Into<AgentId>) -> Self {
        Self {
            intent: intent.into(),
            agent: agent.into(),
            entities: BTreeMap::new(),
        }
    }

    /// Adds an extracted entity.
    #[must_use]
    pub fn with_entity(mut self, name: impl Into<String>, value: Value) -> Self {
        self.entities.insert(name.into(), value);
        self
    }
}
