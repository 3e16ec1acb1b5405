//! Composition root tying sessions, dispatch and degradation together.

use mockable::Clock;
use serde_json::Value;
use std::{
    collections::BTreeMap,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
};
use tracing::{debug, error, info, warn};

use crate::{
    communication::services::CommunicationManager,
    config::ConciergeConfig,
    orchestrator::{
        adapters::{NoPreferences, StaticRouter, TemplateFormatter},
        domain::{
            ActivityLevel, ActivityLog, AgentStatistics, GENERAL_INTENT, OrchestratorConfig,
            RoutedIntent, SessionStatistics, StatisticsSnapshot,
        },
        error::{OrchestratorError, OrchestratorResult},
        ports::{CallerDirectory, IntentRouter, ResponseFormatter},
    },
    protocol::domain::{
        AgentFault, AgentId, ConversationContext, ErrorKind, Message, MessageType, Payload,
        SessionId,
    },
    resilience::fallback::{FallbackChain, FallbackExecutor, FallbackStage, FallbackStrategy},
    session::{
        domain::{HistoryEntry, HistoryRole, Session},
        ports::SessionStore,
        services::{SessionResult, SessionStateManager},
    },
};

/// What [`Orchestrator::shutdown`] cleaned up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Pending requests settled with a shutdown fault.
    pub settled_requests: usize,
    /// Expired sessions removed from the backing tier.
    pub expired_sessions: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Worker,
    Correction(ErrorKind),
    Fallback(FallbackStrategy),
}

#[derive(Debug)]
struct Answer {
    text: String,
    source: Source,
}

impl Answer {
    const fn primary(text: String) -> Self {
        Self {
            text,
            source: Source::Worker,
        }
    }

    fn correction(fault: &AgentFault) -> Self {
        Self {
            text: fault.caller_reply(),
            source: Source::Correction(fault.kind()),
        }
    }

    const fn fallback(text: String, strategy: FallbackStrategy) -> Self {
        Self {
            text,
            source: Source::Fallback(strategy),
        }
    }
}

/// Single entry point for caller input.
///
/// Each call resolves the session, applies caller preferences, routes the
/// text, dispatches a query carrying recent history to the routed worker
/// (behind its breaker and retry policy), degrades through the configured
/// fallback chain when that fails, records both turns, and returns the
/// formatted reply.
pub struct Orchestrator<S, C>
where
    S: SessionStore,
    C: Clock + Send + Sync + 'static,
{
    config: OrchestratorConfig,
    communication: Arc<CommunicationManager<C>>,
    sessions: Arc<SessionStateManager<S, C>>,
    router: Arc<dyn IntentRouter>,
    directory: Arc<dyn CallerDirectory>,
    formatter: Arc<dyn ResponseFormatter>,
    fallback: FallbackExecutor,
    activity: Mutex<ActivityLog>,
    clock: Arc<C>,
    initialized: AtomicBool,
}

impl<S, C> Orchestrator<S, C>
where
    S: SessionStore,
    C: Clock + Send + Sync + 'static,
{
    /// Creates an orchestrator over existing managers, with keyword
    /// routing, no caller preferences and template formatting.
    #[must_use]
    pub fn new(
        config: OrchestratorConfig,
        communication: Arc<CommunicationManager<C>>,
        sessions: Arc<SessionStateManager<S, C>>,
        clock: Arc<C>,
    ) -> Self {
        Self {
            router: Arc::new(StaticRouter::from_config(&config)),
            directory: Arc::new(NoPreferences),
            formatter: Arc::new(TemplateFormatter::from_config(&config)),
            fallback: FallbackExecutor::new(),
            activity: Mutex::new(ActivityLog::new(config.activity_capacity)),
            config,
            communication,
            sessions,
            clock,
            initialized: AtomicBool::new(false),
        }
    }

    /// Builds the communication and session managers from configuration.
    #[must_use]
    pub fn from_config(config: &ConciergeConfig, store: Arc<S>, clock: Arc<C>) -> Self {
        let communication = Arc::new(CommunicationManager::from_config(config, Arc::clone(&clock)));
        let sessions = Arc::new(SessionStateManager::new(
            store,
            Arc::clone(&clock),
            config.session.clone(),
        ));
        Self::new(config.orchestrator.clone(), communication, sessions, clock)
    }

    /// Replaces the intent router.
    #[must_use]
    pub fn with_router(mut self, router: impl IntentRouter + 'static) -> Self {
        self.router = Arc::new(router);
        self
    }

    /// Replaces the caller directory.
    #[must_use]
    pub fn with_directory(mut self, directory: impl CallerDirectory + 'static) -> Self {
        self.directory = Arc::new(directory);
        self
    }

    /// Replaces the response formatter.
    #[must_use]
    pub fn with_formatter(mut self, formatter: impl ResponseFormatter + 'static) -> Self {
        self.formatter = Arc::new(formatter);
        self
    }

    /// Returns the active configuration.
    #[must_use]
    pub const fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Returns the communication manager, for worker registration.
    #[must_use]
    pub fn communication(&self) -> &CommunicationManager<C> {
        &self.communication
    }

    /// Returns the session manager.
    #[must_use]
    pub fn sessions(&self) -> &SessionStateManager<S, C> {
        &self.sessions
    }

    /// Returns `true` between a successful [`initialize`](Self::initialize)
    /// and [`shutdown`](Self::shutdown).
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Starts the dispatcher and checks that the default route is served.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::Communication`] outside a tokio runtime
    /// and [`OrchestratorError::DefaultAgentMissing`] when no worker is
    /// registered for the default agent.
    pub fn initialize(&self) -> OrchestratorResult<()> {
        self.communication.start()?;
        if !self.communication.is_registered(&self.config.default_agent) {
            return Err(OrchestratorError::DefaultAgentMissing(
                self.config.default_agent.clone(),
            ));
        }
        self.initialized.store(true, Ordering::Release);
        info!(
            default_agent = %self.config.default_agent,
            workers = self.communication.registered_agents().len(),
            "orchestrator initialized"
        );
        Ok(())
    }

    /// Settles in-flight requests, clears the dispatch queue and removes
    /// expired sessions. Safe to call without a prior `initialize`.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::Session`] when expired sessions cannot
    /// be removed.
    pub async fn shutdown(&self) -> OrchestratorResult<ShutdownReport> {
        let settled_requests = self.communication.shutdown().await;
        let expired_sessions = self.sessions.cleanup_expired().await?;
        self.initialized.store(false, Ordering::Release);
        info!(settled_requests, expired_sessions, "orchestrator shut down");
        Ok(ShutdownReport {
            settled_requests,
            expired_sessions,
        })
    }

    /// Answers one caller utterance.
    ///
    /// Dependency failures never surface as errors: once the routed worker
    /// and every fallback have failed the caller receives the configured
    /// apology. Caller-correctable worker faults (not found, business rule,
    /// validation, authorisation) skip the fallback chain and are answered
    /// with the fault's caller reply.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::BlankSession`] or
    /// [`OrchestratorError::EmptyInput`] for caller-correctable input.
    pub async fn process_input(
        &self,
        text: &str,
        session_id: &SessionId,
        caller_id: Option<&str>,
    ) -> OrchestratorResult<String> {
        if session_id.is_blank() {
            return Err(OrchestratorError::BlankSession);
        }
        let utterance = text.trim();
        if utterance.is_empty() {
            return Err(OrchestratorError::EmptyInput);
        }

        let session = match self.prepare_session(session_id, caller_id).await {
            Ok(session) => session,
            Err(err) => {
                error!(session = %session_id, error = %err, "session unavailable");
                self.log(ActivityLevel::Error, "session unavailable", session_id);
                return Ok(self.config.fallback.apology_text.clone());
            }
        };

        let route = self.route(utterance, &session).await;
        let request = match self.build_request(&route.agent, utterance, &route, session.context()) {
            Ok(request) => request,
            Err(fault) => {
                error!(session = %session_id, code = fault.code(), detail = fault.detail(), "request could not be built");
                self.log(ActivityLevel::Error, "request could not be built", session_id);
                return Ok(self.config.fallback.apology_text.clone());
            }
        };
        let request_id = request.id();

        if let Err(err) = self.sessions.track_pending(session_id, request_id).await {
            warn!(session = %session_id, error = %err, "could not track pending request");
        }
        let answer = self
            .answer(session_id, &route, utterance, session.context(), request)
            .await;
        if let Err(err) = self.sessions.release_pending(session_id, request_id).await {
            warn!(session = %session_id, error = %err, "could not release pending request");
        }

        let reply = match answer {
            Some(Answer {
                text: reply,
                source: Source::Worker,
            }) => {
                debug!(session = %session_id, agent = %route.agent, intent = %route.intent, "answered");
                self.log(ActivityLevel::Info, format!("answered by {}", route.agent), session_id);
                reply
            }
            Some(Answer {
                text: reply,
                source: Source::Correction(kind),
            }) => {
                self.log(ActivityLevel::Warn, format!("caller correction {kind}"), session_id);
                reply
            }
            Some(Answer {
                text: reply,
                source: Source::Fallback(strategy),
            }) => {
                self.log(ActivityLevel::Warn, format!("answered by fallback {strategy}"), session_id);
                reply
            }
            None => {
                error!(session = %session_id, agent = %route.agent, intent = %route.intent, "no answer available");
                self.log(ActivityLevel::Error, "no answer available", session_id);
                self.config.fallback.apology_text.clone()
            }
        };

        let caller_turn = HistoryEntry::new(HistoryRole::Caller, utterance, self.clock.as_ref())
            .with_message_id(request_id);
        let agent_turn = HistoryEntry::new(HistoryRole::Agent, reply.as_str(), self.clock.as_ref());
        for turn in [caller_turn, agent_turn] {
            if let Err(err) = self.sessions.add_to_history(session_id, turn).await {
                warn!(session = %session_id, error = %err, "could not record turn");
            }
        }
        Ok(reply)
    }

    /// Exports breaker, retry, session and activity state.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::Session`] when the session tier cannot
    /// be counted.
    pub async fn statistics(&self) -> OrchestratorResult<StatisticsSnapshot> {
        let active = self.sessions.active_count().await?;

        let mut breakers: BTreeMap<String, _> = self
            .communication
            .breakers()
            .stats()
            .into_iter()
            .map(|stats| (stats.name.clone(), stats))
            .collect();
        let mut agents: Vec<AgentStatistics> = self
            .communication
            .registered_agents()
            .into_iter()
            .map(|agent| AgentStatistics {
                breaker: breakers.remove(agent.as_str()),
                agent: agent.to_string(),
                registered: true,
            })
            .collect();
        agents.extend(breakers.into_values().map(|stats| AgentStatistics {
            agent: stats.name.clone(),
            registered: false,
            breaker: Some(stats),
        }));
        agents.sort_by(|left, right| left.agent.cmp(&right.agent));

        Ok(StatisticsSnapshot {
            generated_at: self.clock.utc(),
            agents,
            sessions: SessionStatistics { active },
            logs: self.activity().summary(),
            retry_patterns: self.communication.retry().patterns(),
        })
    }

    async fn prepare_session(
        &self,
        id: &SessionId,
        caller_id: Option<&str>,
    ) -> SessionResult<Session> {
        let session = self.sessions.get_or_create_session(id).await?;
        let Some(caller) = caller_id.map(str::trim).filter(|caller| !caller.is_empty()) else {
            return Ok(session);
        };
        if session.caller_id() != Some(caller) {
            self.sessions.attach_caller(id, caller).await?;
        }
        match self.directory.preferences(caller).await {
            Ok(preferences) if preferences.is_empty() => {}
            Ok(preferences) => self.sessions.apply_preferences(id, preferences).await?,
            Err(fault) => {
                warn!(caller, code = fault.code(), detail = fault.detail(), "caller preferences unavailable");
            }
        }
        self.sessions.get_or_create_session(id).await
    }

    async fn route(&self, utterance: &str, session: &Session) -> RoutedIntent {
        match self.router.route(utterance, session).await {
            Ok(route) => route,
            Err(fault) => {
                warn!(code = fault.code(), detail = fault.detail(), "routing failed; using default agent");
                RoutedIntent::new(GENERAL_INTENT, self.config.default_agent.clone())
            }
        }
    }

    fn build_request(
        &self,
        agent: &AgentId,
        utterance: &str,
        route: &RoutedIntent,
        context: &ConversationContext,
    ) -> Result<Message, AgentFault> {
        let content = Payload::Query {
            intent: route.intent.clone(),
            text: utterance.to_owned(),
            entities: route.entities.clone(),
        };
        let builder = Message::builder(
            self.config.coordinator_id.clone(),
            agent.clone(),
            MessageType::Query,
            content,
            context.clone(),
        );
        let timed = match self.config.request_timeout {
            Some(timeout) => builder.with_timeout(timeout),
            None => builder,
        };
        timed.build(self.clock.as_ref()).map_err(AgentFault::from)
    }

    async fn ask(&self, request: Message, intent: &str) -> Result<String, AgentFault> {
        let agent = request.to().clone();
        let response = self
            .communication
            .send_and_wait(request, self.config.request_timeout)
            .await?;
        match response.into_content() {
            Payload::Result(result) => self.formatter.format(intent, &result),
            other => Err(AgentFault::new(
                ErrorKind::TypeMismatch,
                format!("worker '{agent}' answered with a {} payload", other.kind()),
            )),
        }
    }

    async fn answer(
        &self,
        session_id: &SessionId,
        route: &RoutedIntent,
        utterance: &str,
        context: &ConversationContext,
        request: Message,
    ) -> Option<Answer> {
        let primary = async {
            match self.ask(request, &route.intent).await {
                Ok(text) => {
                    self.remember(session_id, &route.intent, &text).await;
                    Ok(Answer::primary(text))
                }
                Err(fault) if fault.is_caller_correctable() => {
                    info!(
                        session = %session_id,
                        agent = %route.agent,
                        code = fault.code(),
                        detail = fault.detail(),
                        "worker asked the caller to correct the request"
                    );
                    Ok(Answer::correction(&fault))
                }
                Err(fault) => Err(fault),
            }
        };
        let chain = self.fallback_chain(session_id, route, utterance, context);
        let observer = |fault: &AgentFault, stage: FallbackStage| match stage {
            FallbackStage::Primary => warn!(
                session = %session_id,
                agent = %route.agent,
                code = fault.code(),
                detail = fault.detail(),
                "worker failed; degrading"
            ),
            FallbackStage::Strategy(strategy) => warn!(
                session = %session_id,
                strategy = %strategy,
                code = fault.code(),
                detail = fault.detail(),
                "fallback failed"
            ),
        };
        self.fallback
            .execute_with_fallback(primary, chain, Some(&observer))
            .await
    }

    fn fallback_chain<'a>(
        &'a self,
        session_id: &'a SessionId,
        route: &'a RoutedIntent,
        utterance: &'a str,
        context: &'a ConversationContext,
    ) -> FallbackChain<'a, Answer> {
        self.config
            .fallback
            .order
            .iter()
            .fold(FallbackChain::new(), |chain, &strategy| match strategy {
                FallbackStrategy::CachedData => chain.then(strategy, move || {
                    self.cached_answer(session_id, &route.intent)
                }),
                FallbackStrategy::AlternativeAgent => chain.then(strategy, move || {
                    self.alternative_answer(route, utterance, context)
                }),
                FallbackStrategy::DegradedMode => {
                    let text = self.config.fallback.degraded_text.clone();
                    chain.then(strategy, move || async move {
                        Ok(Some(Answer::fallback(text, FallbackStrategy::DegradedMode)))
                    })
                }
                FallbackStrategy::HumanEscalation => {
                    chain.then(strategy, move || self.escalate(session_id))
                }
                FallbackStrategy::Abort => chain.then(strategy, || async { Ok(None) }),
            })
    }

    async fn cached_answer(
        &self,
        session_id: &SessionId,
        intent: &str,
    ) -> Result<Option<Answer>, AgentFault> {
        let cached = self
            .sessions
            .get_from_memory(session_id, &cache_key(intent))
            .await?;
        Ok(cached
            .as_ref()
            .and_then(Value::as_str)
            .map(|text| Answer::fallback(text.to_owned(), FallbackStrategy::CachedData)))
    }

    async fn alternative_answer(
        &self,
        route: &RoutedIntent,
        utterance: &str,
        context: &ConversationContext,
    ) -> Result<Option<Answer>, AgentFault> {
        let Some(alternate) = self.config.fallback.alternate_for(&route.agent) else {
            return Ok(None);
        };
        let request = self.build_request(alternate, utterance, route, context)?;
        let text = self.ask(request, &route.intent).await?;
        Ok(Some(Answer::fallback(
            text,
            FallbackStrategy::AlternativeAgent,
        )))
    }

    async fn escalate(&self, session_id: &SessionId) -> Result<Option<Answer>, AgentFault> {
        self.sessions
            .update_metadata(session_id, "escalated", Value::Bool(true))
            .await?;
        info!(session = %session_id, "caller escalated to a human");
        Ok(Some(Answer::fallback(
            self.config.fallback.escalation_text.clone(),
            FallbackStrategy::HumanEscalation,
        )))
    }

    async fn remember(&self, session_id: &SessionId, intent: &str, text: &str) {
        if let Err(err) = self
            .sessions
            .store_in_memory(session_id, cache_key(intent), Value::String(text.to_owned()))
            .await
        {
            warn!(session = %session_id, error = %err, "could not cache answer");
        }
    }

    fn log(&self, level: ActivityLevel, message: impl Into<String>, session: &SessionId) {
        self.activity()
            .record(level, message, Some(session), self.clock.as_ref());
    }

    fn activity(&self) -> MutexGuard<'_, ActivityLog> {
        self.activity.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Session memory key holding the last worker answer for an intent.
#[must_use]
pub fn cache_key(intent: &str) -> String {
    format!("answer:{intent}")
}
