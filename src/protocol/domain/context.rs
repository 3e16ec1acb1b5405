//! Conversation context carried on every message and owned by every session.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, VecDeque};

use super::{MessageId, SessionId, ThreadId};

/// Maximum number of recent-history lines a context retains.
pub const RECENT_HISTORY_LIMIT: usize = 10;

/// Conversation state shared between the coordinator and workers.
///
/// `thread_id` and `session_id` are fixed at construction. Metadata and the
/// bounded recent history change only through the mutators below, which keep
/// the history within [`RECENT_HISTORY_LIMIT`] entries by evicting the
/// oldest line first.
///
/// # Examples
///
/// ```
/// use concierge::protocol::domain::{ConversationContext, SessionId, ThreadId};
///
/// let mut context = ConversationContext::new(ThreadId::new(), SessionId::new("s1"));
/// for turn in 0..15 {
///     context.push_recent(format!("turn {turn}"));
/// }
/// assert_eq!(context.recent_history().len(), 10);
/// assert_eq!(context.recent_history().front().map(String::as_str), Some("turn 5"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationContext {
    thread_id: ThreadId,
    session_id: SessionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    parent_message_id: Option<MessageId>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    metadata: BTreeMap<String, Value>,
    #[serde(
        default,
        skip_serializing_if = "VecDeque::is_empty",
        deserialize_with = "bounded_history"
    )]
    recent_history: VecDeque<String>,
}

impl ConversationContext {
    /// Creates an empty context for the given thread and session.
    #[must_use]
    pub const fn new(thread_id: ThreadId, session_id: SessionId) -> Self {
        Self {
            thread_id,
            session_id,
            parent_message_id: None,
            metadata: BTreeMap::new(),
            recent_history: VecDeque::new(),
        }
    }

    /// Returns a copy of this context pointing at a parent message.
    #[must_use]
    pub fn with_parent(mut self, parent: MessageId) -> Self {
        self.parent_message_id = Some(parent);
        self
    }

    /// Returns the thread identifier.
    #[must_use]
    pub const fn thread_id(&self) -> ThreadId {
        self.thread_id
    }

    /// Returns the session identifier.
    #[must_use]
    pub const fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Returns the parent message, if any.
    #[must_use]
    pub const fn parent_message_id(&self) -> Option<MessageId> {
        self.parent_message_id
    }

    /// Returns the context metadata.
    #[must_use]
    pub const fn metadata(&self) -> &BTreeMap<String, Value> {
        &self.metadata
    }

    /// Returns the recent history, oldest first.
    #[must_use]
    pub const fn recent_history(&self) -> &VecDeque<String> {
        &self.recent_history
    }

    /// Sets a metadata entry, replacing any previous value.
    pub fn set_metadata(&mut self, key: impl Into<String>, value: Value) {
        self.metadata.insert(key.into(), value);
    }

    /// Merges a set of metadata entries over the existing ones.
    pub fn merge_metadata(&mut self, entries: impl IntoIterator<Item = (String, Value)>) {
        self.metadata.extend(entries);
    }

    /// Appends a line to the recent history, evicting the oldest beyond the
    /// limit.
    pub fn push_recent(&mut self, line: impl Into<String>) {
        self.recent_history.push_back(line.into());
        while self.recent_history.len() > RECENT_HISTORY_LIMIT {
            self.recent_history.pop_front();
        }
    }

    /// Replaces the recent history with the last [`RECENT_HISTORY_LIMIT`]
    /// lines of `lines`.
    pub fn replace_recent(&mut self, lines: impl IntoIterator<Item = String>) {
        self.recent_history.clear();
        for line in lines {
            self.push_recent(line);
        }
    }
}

/// Keeps only the newest [`RECENT_HISTORY_LIMIT`] lines of an untrusted
/// history.
fn bounded_history<'de, D>(deserializer: D) -> Result<VecDeque<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let mut lines = VecDeque::<String>::deserialize(deserializer)?;
    while lines.len() > RECENT_HISTORY_LIMIT {
        lines.pop_front();
    }
    Ok(lines)
}
