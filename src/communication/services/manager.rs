//! Message dispatch, correlation and timeout enforcement.

use mockable::Clock;
use serde::Deserialize;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError, RwLock},
    time::Duration,
};
use tokio::{
    runtime::Handle,
    sync::{Notify, Semaphore},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    communication::{
        domain::{Delivery, DiscardReason, DispatchQueue, PendingRegistry, QueuedDispatch},
        error::{CommunicationError, CommunicationResult},
        ports::WorkerHandler,
    },
    config::{ConciergeConfig, serde_millis},
    protocol::{
        domain::{AgentFault, AgentId, ErrorKind, Message, MessageType, Payload, WorkerResult},
        ports::MessageValidator,
        validation::DefaultMessageValidator,
    },
    resilience::{
        circuit_breaker::CircuitBreakerRegistry,
        retry::{AdaptiveRetryStrategy, RetryOptions},
    },
};

/// Dispatch and correlation settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CommunicationConfig {
    /// Wait applied by `send_and_wait` when neither the call nor the
    /// message sets one.
    #[serde(rename = "default_timeout_ms", with = "serde_millis")]
    pub default_timeout: Duration,
    /// Dispatches allowed in flight at once; the rest wait in priority
    /// order.
    pub max_concurrent_dispatches: usize,
}

impl Default for CommunicationConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(30),
            max_concurrent_dispatches: 10,
        }
    }
}

type SharedHandler = Arc<dyn WorkerHandler>;

struct Shared<C: Clock> {
    config: CommunicationConfig,
    clock: Arc<C>,
    validator: Arc<dyn MessageValidator>,
    handlers: RwLock<HashMap<AgentId, SharedHandler>>,
    breakers: CircuitBreakerRegistry<C>,
    retry: AdaptiveRetryStrategy<C>,
    pending: PendingRegistry,
    queue: DispatchQueue,
    wake: Notify,
    slots: Arc<Semaphore>,
}

struct Dispatcher {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Routes messages to registered workers.
///
/// Every dispatch to a worker runs through that worker's circuit breaker,
/// which wraps the adaptive retry strategy, which wraps the handler call.
/// The breaker registry and retry strategy are owned here and shared by all
/// callers targeting the same worker.
///
/// The dispatcher task starts lazily on the first send and stops on
/// [`shutdown`](Self::shutdown) or drop.
pub struct CommunicationManager<C: Clock + Send + Sync + 'static> {
    shared: Arc<Shared<C>>,
    dispatcher: Mutex<Option<Dispatcher>>,
}

impl<C: Clock + Send + Sync + 'static> CommunicationManager<C> {
    /// Creates a manager from its collaborators.
    #[must_use]
    pub fn new(
        config: CommunicationConfig,
        breakers: CircuitBreakerRegistry<C>,
        retry: AdaptiveRetryStrategy<C>,
        clock: Arc<C>,
    ) -> Self {
        let slots = Arc::new(Semaphore::new(config.max_concurrent_dispatches.max(1)));
        Self {
            shared: Arc::new(Shared {
                config,
                clock,
                validator: Arc::new(DefaultMessageValidator::new()),
                handlers: RwLock::new(HashMap::new()),
                breakers,
                retry,
                pending: PendingRegistry::new(),
                queue: DispatchQueue::new(),
                wake: Notify::new(),
                slots,
            }),
            dispatcher: Mutex::new(None),
        }
    }

    /// Builds a manager, breaker registry and retry strategy from
    /// configuration.
    #[must_use]
    pub fn from_config(config: &ConciergeConfig, clock: Arc<C>) -> Self {
        let breakers = config.circuit_breaker.dependencies.iter().fold(
            CircuitBreakerRegistry::new(config.circuit_breaker.defaults.clone(), Arc::clone(&clock)),
            |registry, (name, settings)| registry.with_override(name.clone(), settings.clone()),
        );
        let retry = AdaptiveRetryStrategy::new(config.retry.defaults.clone(), Arc::clone(&clock));
        for (name, policy) in &config.retry.dependencies {
            retry.register_override(name.clone(), policy.clone());
        }
        Self::new(config.communication.clone(), breakers, retry, clock)
            .with_validator(DefaultMessageValidator::with_config(config.validation.clone()))
    }

    /// Replaces the validator applied to every outbound message.
    ///
    /// Call before the first send; the manager is not yet shared then.
    #[must_use]
    pub fn with_validator(mut self, validator: impl MessageValidator + 'static) -> Self {
        if let Some(shared) = Arc::get_mut(&mut self.shared) {
            shared.validator = Arc::new(validator);
        }
        self
    }

    /// Returns the active configuration.
    #[must_use]
    pub fn config(&self) -> &CommunicationConfig {
        &self.shared.config
    }

    /// Returns the per-worker breaker registry.
    #[must_use]
    pub fn breakers(&self) -> &CircuitBreakerRegistry<C> {
        &self.shared.breakers
    }

    /// Returns the shared retry strategy.
    #[must_use]
    pub fn retry(&self) -> &AdaptiveRetryStrategy<C> {
        &self.shared.retry
    }

    /// Returns the outstanding-request registry.
    #[must_use]
    pub fn pending(&self) -> &PendingRegistry {
        &self.shared.pending
    }

    /// Returns the number of dispatches waiting for a slot.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.shared.queue.len()
    }

    /// Registers a worker, replacing any handler already registered under
    /// the same id. Returns `true` when one was replaced.
    pub fn register(&self, agent: impl Into<AgentId>, handler: impl WorkerHandler + 'static) -> bool {
        self.register_shared(agent, Arc::new(handler))
    }

    /// Registers an already shared handler.
    pub fn register_shared(&self, agent: impl Into<AgentId>, handler: SharedHandler) -> bool {
        let id = agent.into();
        debug!(agent = %id, "registering worker");
        self.shared
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, handler)
            .is_some()
    }

    /// Removes a worker. Returns `true` when one was registered.
    pub fn unregister(&self, agent: &AgentId) -> bool {
        self.shared
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(agent)
            .is_some()
    }

    /// Returns `true` when a handler is registered for `agent`.
    #[must_use]
    pub fn is_registered(&self, agent: &AgentId) -> bool {
        self.shared.handler(agent).is_some()
    }

    /// Lists registered workers in sorted order.
    #[must_use]
    pub fn registered_agents(&self) -> Vec<AgentId> {
        let mut agents: Vec<_> = self
            .shared
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        agents.sort();
        agents
    }

    /// Starts the dispatcher if it is not already running.
    ///
    /// # Errors
    ///
    /// Returns [`CommunicationError::NoRuntime`] outside a tokio runtime.
    pub fn start(&self) -> CommunicationResult<()> {
        let mut slot = self.dispatcher.lock().unwrap_or_else(PoisonError::into_inner);
        if slot
            .as_ref()
            .is_some_and(|running| !running.token.is_cancelled() && !running.handle.is_finished())
        {
            return Ok(());
        }
        let runtime = Handle::try_current().map_err(|_| CommunicationError::NoRuntime)?;
        let token = CancellationToken::new();
        let handle = runtime.spawn(run_dispatcher(Arc::clone(&self.shared), token.clone()));
        *slot = Some(Dispatcher { token, handle });
        debug!("dispatcher started");
        Ok(())
    }

    /// Returns `true` while the dispatcher task is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.dispatcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|running| !running.token.is_cancelled() && !running.handle.is_finished())
    }

    /// Queues a message that expects no response.
    ///
    /// Returns once the message is queued; the outcome of the dispatch is
    /// only logged.
    ///
    /// # Errors
    ///
    /// Fails fast, without dispatching, when the message is invalid,
    /// requires a response, or has no registered recipient.
    pub fn send(&self, message: Message) -> CommunicationResult<()> {
        self.admit(&message)?;
        if message.requires_response() {
            return Err(CommunicationError::ResponseRequired(message.message_type()));
        }
        self.enqueue(message, false)
    }

    /// Dispatches a request and waits for its correlated response.
    ///
    /// The wait is `timeout`, else the message's own timeout, else the
    /// configured default. It covers queueing, every retry and the breaker
    /// call timeout, so the call never outlives it by more than scheduling
    /// jitter.
    ///
    /// # Errors
    ///
    /// Fails fast for invalid messages, messages that expect no response
    /// and unknown recipients. Otherwise returns
    /// [`CommunicationError::Fault`] with a timeout fault, the worker's
    /// fault after retries, or a shutdown fault.
    pub async fn send_and_wait(
        &self,
        message: Message,
        timeout: Option<Duration>,
    ) -> CommunicationResult<Message> {
        self.admit(&message)?;
        if !message.requires_response() {
            return Err(CommunicationError::NoResponseExpected(
                message.message_type(),
            ));
        }
        let wait = timeout
            .or_else(|| message.timeout())
            .unwrap_or(self.shared.config.default_timeout);
        let id = message.id();
        let to = message.to().clone();

        let mut receiver = self
            .shared
            .pending
            .register(id, to.clone(), self.shared.clock.utc())
            .ok_or(CommunicationError::DuplicateRequest(id))?;
        if let Err(err) = self.enqueue(message, true) {
            self.shared.pending.settle(id, Err(err.clone().into()));
            return Err(err);
        }

        match tokio::time::timeout(wait, &mut receiver).await {
            Ok(Ok(outcome)) => Ok(outcome?),
            Ok(Err(_)) => Err(AgentFault::internal("pending request dropped without outcome").into()),
            Err(_) => {
                let fault = AgentFault::timeout(format!(
                    "no response from {to} within {}ms",
                    wait.as_millis()
                ));
                if self.shared.pending.settle(id, Err(fault.clone())) {
                    warn!(request = %id, agent = %to, wait_ms = %wait.as_millis(), "request timed out");
                    return Err(fault.into());
                }
                // Settled between the deadline and our settle attempt.
                match receiver.await {
                    Ok(outcome) => Ok(outcome?),
                    Err(_) => Err(fault.into()),
                }
            }
        }
    }

    /// Delivers a response to the request it correlates to.
    ///
    /// Responses are matched only by `correlation_id`. Unsolicited, late
    /// and duplicate responses are dropped.
    pub fn deliver_response(&self, response: Message) -> Delivery {
        self.shared.deliver(response)
    }

    /// Stops the dispatcher, drops queued dispatches and settles every
    /// pending request with a shutdown fault. Returns how many pending
    /// requests were settled.
    ///
    /// Dispatches already running finish in the background; their outcomes
    /// are discarded.
    pub async fn shutdown(&self) -> usize {
        let running = self
            .dispatcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(dispatcher) = running {
            dispatcher.token.cancel();
            if let Err(err) = dispatcher.handle.await {
                warn!(error = %err, "dispatcher task ended abnormally");
            }
        }
        let dropped = self.shared.queue.drain().len();
        let fault = AgentFault::new(ErrorKind::ShuttingDown, "communication manager shut down");
        let settled = self.shared.pending.settle_all(&fault);
        info!(dropped, settled, "communication manager shut down");
        settled
    }

    fn admit(&self, message: &Message) -> CommunicationResult<()> {
        self.shared.validator.validate(message)?;
        if !self.is_registered(message.to()) {
            return Err(CommunicationError::NoHandler(message.to().clone()));
        }
        Ok(())
    }

    fn enqueue(&self, message: Message, awaiting_response: bool) -> CommunicationResult<()> {
        self.start()?;
        debug!(
            request = %message.id(),
            agent = %message.to(),
            priority = ?message.priority(),
            "queueing dispatch"
        );
        self.shared.queue.push(message, awaiting_response);
        self.shared.wake.notify_one();
        Ok(())
    }
}

impl<C: Clock + Send + Sync + 'static> Drop for CommunicationManager<C> {
    fn drop(&mut self) {
        let slot = self
            .dispatcher
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(dispatcher) = slot.take() {
            dispatcher.token.cancel();
        }
    }
}

impl<C: Clock + Send + Sync + 'static> Shared<C> {
    fn handler(&self, agent: &AgentId) -> Option<SharedHandler> {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(agent)
            .cloned()
    }

    fn deliver(&self, response: Message) -> Delivery {
        let Some(request) = response.correlation_id() else {
            warn!(response = %response.id(), "discarding uncorrelated response");
            return Delivery::Discarded(DiscardReason::Uncorrelated);
        };
        if self.pending.settle(request, Ok(response)) {
            debug!(request = %request, "response delivered");
            Delivery::Delivered
        } else {
            warn!(request = %request, "discarding response with no pending request");
            Delivery::Discarded(DiscardReason::NotPending)
        }
    }

    async fn dispatch(&self, job: QueuedDispatch) {
        let QueuedDispatch {
            message,
            awaiting_response,
            ..
        } = job;
        let outcome = self.invoke(&message).await;

        if !awaiting_response {
            match outcome {
                Ok(_) => debug!(request = %message.id(), agent = %message.to(), "message handled"),
                Err(fault) => warn!(
                    request = %message.id(),
                    agent = %message.to(),
                    code = fault.code(),
                    detail = fault.detail(),
                    "fire-and-forget dispatch failed"
                ),
            }
            return;
        }

        let settled = match outcome {
            Ok(result) => {
                match Message::response_to(&message, MessageType::Inform, Payload::Result(result))
                    .build(self.clock.as_ref())
                {
                    Ok(response) => {
                        self.deliver(response);
                        return;
                    }
                    Err(err) => Err(AgentFault::from(err)),
                }
            }
            Err(fault) => Err(fault),
        };
        self.pending.settle(message.id(), settled);
    }

    async fn invoke(&self, message: &Message) -> Result<WorkerResult, AgentFault> {
        if message.is_expired_at(self.clock.utc()) {
            return Err(AgentFault::timeout(format!(
                "message {} expired before dispatch",
                message.id()
            )));
        }
        let Some(handler) = self.handler(message.to()) else {
            return Err(AgentFault::new(
                ErrorKind::ToolNotFound,
                format!("no handler registered for agent '{}'", message.to()),
            ));
        };
        let dependency = message.to().as_str();
        let breaker = self.breakers.get(dependency);
        breaker
            .execute(|| {
                self.retry.execute_with(
                    || {
                        let worker = Arc::clone(&handler);
                        let request = message.clone();
                        async move { into_outcome(worker.handle(request).await?) }
                    },
                    RetryOptions::for_dependency(dependency),
                )
            })
            .await
    }
}

/// Treats a worker-reported error as a fault carrying the worker's code
/// and retry flag.
fn into_outcome(result: WorkerResult) -> Result<WorkerResult, AgentFault> {
    if result.is_error() {
        return Err(result
            .into_fault()
            .unwrap_or_else(|| AgentFault::internal("worker reported an error")));
    }
    Ok(result)
}

async fn run_dispatcher<C: Clock + Send + Sync + 'static>(
    shared: Arc<Shared<C>>,
    token: CancellationToken,
) {
    loop {
        let slot = tokio::select! {
            () = token.cancelled() => break,
            acquired = Arc::clone(&shared.slots).acquire_owned() => match acquired {
                Ok(slot) => slot,
                Err(_) => break,
            },
        };

        let next = loop {
            if let Some(job) = shared.queue.pop() {
                break Some(job);
            }
            tokio::select! {
                () = token.cancelled() => break None,
                () = shared.wake.notified() => {}
            }
        };
        let Some(job) = next else {
            break;
        };

        debug!(request = %job.message.id(), agent = %job.message.to(), "dispatching");
        let worker = Arc::clone(&shared);
        tokio::spawn(async move {
            worker.dispatch(job).await;
            drop(slot);
        });
    }
    debug!("dispatcher stopped");
}
