//! Closure-backed [`WorkerHandler`].

use crate::{
    communication::ports::WorkerHandler,
    protocol::domain::{AgentFault, Message, WorkerResult},
};
use async_trait::async_trait;
use std::{fmt, future::Future};

/// A [`WorkerHandler`] wrapping an async closure.
#[derive(Clone)]
pub struct FnHandler<F> {
    handler: F,
}

impl<F> fmt::Debug for FnHandler<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnHandler").finish_non_exhaustive()
    }
}

/// Wraps an async closure as a worker handler.
///
/// # Examples
///
/// ```
/// use concierge::communication::adapters::handler_fn;
/// use concierge::protocol::domain::WorkerResult;
/// use serde_json::json;
///
/// let echo = handler_fn(|message| async move {
///     Ok(WorkerResult::success(json!({ "echo": message.content().kind() })))
/// });
/// # let _ = echo;
/// ```
#[must_use]
pub const fn handler_fn<F, Fut>(handler: F) -> FnHandler<F>
where
    F: Fn(Message) -> Fut + Send + Sync,
    Fut: Future<Output = Result<WorkerResult, AgentFault>> + Send,
{
    FnHandler { handler }
}

#[async_trait]
impl<F, Fut> WorkerHandler for FnHandler<F>
where
    F: Fn(Message) -> Fut + Send + Sync,
    Fut: Future<Output = Result<WorkerResult, AgentFault>> + Send,
{
    async fn handle(&self, message: Message) -> Result<WorkerResult, AgentFault> {
        (self.handler)(message).await
    }
}
