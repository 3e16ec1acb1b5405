//! Natural-language routing boundary.

use crate::{protocol::domain::AgentFault, session::domain::Session};
use async_trait::async_trait;

use crate::orchestrator::domain::RoutedIntent;

/// Decides which worker answers a caller utterance.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IntentRouter: Send + Sync {
    /// Routes `text` given the caller's session.
    ///
    /// # Errors
    ///
    /// Returns a fault when the router cannot classify the text. The
    /// orchestrator then sends the text to the default worker.
    async fn route(&self, text: &str, session: &Session) -> Result<RoutedIntent, AgentFault>;
}
