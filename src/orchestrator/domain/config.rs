//! Orchestrator routing and degradation settings.

use crate::{
    config::serde_millis,
    protocol::domain::AgentId,
    resilience::fallback::FallbackStrategy,
};
use serde::Deserialize;
use std::{collections::BTreeMap, time::Duration};

use super::RouteRule;

/// Intent assigned when no routing rule matches.
pub const GENERAL_INTENT: &str = "general";

/// Records kept by the activity log unless configured otherwise.
pub const DEFAULT_ACTIVITY_CAPACITY: usize = 100;

/// Routing, formatting and degradation settings for the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Agent id the orchestrator sends requests as.
    pub coordinator_id: AgentId,
    /// Worker that receives requests no routing rule claims.
    pub default_agent: AgentId,
    /// Keyword routing rules, checked in order.
    pub routes: Vec<RouteRule>,
    /// Per-request wait. Falls back to the communication default when unset.
    #[serde(rename = "request_timeout_ms", with = "serde_millis::option")]
    pub request_timeout: Option<Duration>,
    /// Response templates keyed by intent.
    pub templates: BTreeMap<String, String>,
    /// Records kept in the activity log.
    pub activity_capacity: usize,
    /// What to do when the routed worker cannot answer.
    #[serde(flatten)]
    pub fallback: FallbackPolicy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            coordinator_id: AgentId::new("coordinator"),
            default_agent: AgentId::new("support"),
            routes: Vec::new(),
            request_timeout: None,
            templates: BTreeMap::new(),
            activity_capacity: DEFAULT_ACTIVITY_CAPACITY,
            fallback: FallbackPolicy::default(),
        }
    }
}

/// Degradation chain applied when the primary worker fails.
///
/// The chain is rebuilt for every request in the order given by
/// [`order`](Self::order); the first strategy that produces an answer wins.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FallbackPolicy {
    /// Strategies to try, in order.
    #[serde(rename = "fallback_order")]
    pub order: Vec<FallbackStrategy>,
    /// Alternate worker per primary worker.
    pub alternates: BTreeMap<AgentId, AgentId>,
    /// Reply given in degraded mode.
    pub degraded_text: String,
    /// Reply given when handing the caller to a human.
    pub escalation_text: String,
    /// Reply given when every strategy failed.
    pub apology_text: String,
}

impl Default for FallbackPolicy {
    fn default() -> Self {
        Self {
            order: vec![
                FallbackStrategy::CachedData,
                FallbackStrategy::AlternativeAgent,
                FallbackStrategy::DegradedMode,
                FallbackStrategy::HumanEscalation,
            ],
            alternates: BTreeMap::new(),
            degraded_text: "I can't reach that service right now, but I've noted your request. \
                            Is there anything else I can help with?"
                .to_owned(),
            escalation_text: "Let me connect you with a member of our team who can help."
                .to_owned(),
            apology_text: "I'm sorry, I can't help with that right now. \
                           Please try again in a few minutes."
                .to_owned(),
        }
    }
}

impl FallbackPolicy {
    /// Returns the alternate configured for `agent`.
    #[must_use]
    pub fn alternate_for(&self, agent: &AgentId) -> Option<&AgentId> {
        self.alternates.get(agent)
    }
}
