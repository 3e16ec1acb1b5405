//! Keyword routing.

use crate::{
    orchestrator::{
        domain::{GENERAL_INTENT, OrchestratorConfig, RouteRule, RoutedIntent},
        ports::IntentRouter,
    },
    protocol::domain::{AgentFault, AgentId},
    session::domain::Session,
};
use async_trait::async_trait;

/// Routes by the first matching keyword rule, else to a default worker.
#[derive(Debug, Clone)]
pub struct StaticRouter {
    default_agent: AgentId,
    rules: Vec<RouteRule>,
}

impl StaticRouter {
    /// Creates a router that sends everything to `default_agent`.
    #[must_use]
    pub fn new(default_agent: impl Into<AgentId>) -> Self {
        Self {
            default_agent: default_agent.into(),
            rules: Vec::new(),
        }
    }

    /// Creates a router from the configured default worker and rules.
    #[must_use]
    pub fn from_config(config: &OrchestratorConfig) -> Self {
        Self {
            default_agent: config.default_agent.clone(),
            rules: config.routes.clone(),
        }
    }

    /// Appends a rule.
    #[must_use]
    pub fn with_rule(mut self, rule: RouteRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Routes `text` without a session.
    #[must_use]
    pub fn resolve(&self, text: &str) -> RoutedIntent {
        self.rules
            .iter()
            .find(|rule| rule.matches(text))
            .map_or_else(
                || RoutedIntent::new(GENERAL_INTENT, self.default_agent.clone()),
                |rule| RoutedIntent::new(rule.intent.clone(), rule.agent.clone()),
            )
    }
}

#[async_trait]
impl IntentRouter for StaticRouter {
    async fn route(&self, text: &str, _session: &Session) -> Result<RoutedIntent, AgentFault> {
        Ok(self.resolve(text))
    }
}
