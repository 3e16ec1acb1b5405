//! Conversational session state with bounded history and sliding expiry.

use chrono::{DateTime, TimeDelta, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{
    collections::{BTreeMap, BTreeSet, VecDeque},
    fmt,
    time::Duration,
};

use crate::{
    config::serde_secs,
    protocol::domain::{ConversationContext, MessageId, SessionId, ThreadId},
};

/// Default number of history entries a session keeps.
pub const DEFAULT_MAX_HISTORY: usize = 50;

/// Default time a session lives after its last mutation.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);

/// Who produced a history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryRole {
    /// The person on the other end of the conversation.
    Caller,
    /// The coordinating agent or one of its workers.
    Agent,
    /// Platform notices such as escalation markers.
    System,
}

impl HistoryRole {
    /// Returns the lowercase role name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Caller => "caller",
            Self::Agent => "agent",
            Self::System => "system",
        }
    }
}

impl fmt::Display for HistoryRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One turn recorded in a session's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    role: HistoryRole,
    content: String,
    timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    message_id: Option<MessageId>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    metadata: BTreeMap<String, Value>,
}

impl HistoryEntry {
    /// Creates an entry stamped with the current time.
    #[must_use]
    pub fn new(role: HistoryRole, content: impl Into<String>, clock: &impl Clock) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: clock.utc(),
            message_id: None,
            metadata: BTreeMap::new(),
        }
    }

    /// Links the entry to the message that carried it.
    #[must_use]
    pub const fn with_message_id(mut self, message_id: MessageId) -> Self {
        self.message_id = Some(message_id);
        self
    }

    /// Attaches a metadata value to the entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Returns the role.
    #[must_use]
    pub const fn role(&self) -> HistoryRole {
        self.role
    }

    /// Returns the recorded text.
    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Returns when the entry was recorded.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Returns the linked message, if any.
    #[must_use]
    pub const fn message_id(&self) -> Option<MessageId> {
        self.message_id
    }

    /// Returns the entry metadata.
    #[must_use]
    pub const fn metadata(&self) -> &BTreeMap<String, Value> {
        &self.metadata
    }

    fn summary(&self) -> String {
        format!("{}: {}", self.role, self.content)
    }
}

/// Size and lifetime bounds applied to a new session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionLimits {
    /// Time to live after the last mutation.
    pub ttl: Duration,
    /// Maximum retained history entries.
    pub max_history: usize,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            max_history: DEFAULT_MAX_HISTORY,
        }
    }
}

/// The durable conversational state for one caller interaction.
///
/// Every mutator takes the clock and pushes `expires_at` forward by the
/// session's time to live. History is capped at `max_history` entries,
/// oldest evicted first, and each appended turn is mirrored into the
/// context's bounded recent history so outbound requests carry it.
///
/// # Examples
///
/// ```
/// use concierge::clock::ManualClock;
/// use concierge::protocol::domain::SessionId;
/// use concierge::session::domain::{HistoryEntry, HistoryRole, Session, SessionLimits};
///
/// let clock = ManualClock::default();
/// let mut session = Session::new(SessionId::new("s1"), SessionLimits::default(), &clock);
/// session.push_history(HistoryEntry::new(HistoryRole::Caller, "hello", &clock), &clock);
/// assert_eq!(session.history().len(), 1);
/// assert_eq!(session.context().recent_history().len(), 1);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    id: SessionId,
    context: ConversationContext,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    #[serde(rename = "ttl_secs", with = "serde_secs")]
    ttl: Duration,
    max_history: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    caller_id: Option<String>,
    #[serde(default)]
    history: VecDeque<HistoryEntry>,
    #[serde(default)]
    metadata: BTreeMap<String, Value>,
    #[serde(default)]
    memory: BTreeMap<String, Value>,
    #[serde(default)]
    pending_requests: BTreeSet<MessageId>,
}

impl Session {
    /// Creates a fresh session on a new conversation thread.
    #[must_use]
    pub fn new(id: SessionId, limits: SessionLimits, clock: &impl Clock) -> Self {
        let now = clock.utc();
        let context = ConversationContext::new(ThreadId::new(), id.clone());
        Self {
            id,
            context,
            created_at: now,
            updated_at: now,
            expires_at: expiry_after(now, limits.ttl),
            ttl: limits.ttl,
            max_history: limits.max_history.max(1),
            caller_id: None,
            history: VecDeque::new(),
            metadata: BTreeMap::new(),
            memory: BTreeMap::new(),
            pending_requests: BTreeSet::new(),
        }
    }

    /// Returns the session identifier.
    #[must_use]
    pub const fn id(&self) -> &SessionId {
        &self.id
    }

    /// Returns the conversation context.
    #[must_use]
    pub const fn context(&self) -> &ConversationContext {
        &self.context
    }

    /// Returns the creation time.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the time of the last mutation.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Returns the instant after which the session is dead.
    #[must_use]
    pub const fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Returns the sliding time to live.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the history cap.
    #[must_use]
    pub const fn max_history(&self) -> usize {
        self.max_history
    }

    /// Returns the attached caller, if any.
    #[must_use]
    pub fn caller_id(&self) -> Option<&str> {
        self.caller_id.as_deref()
    }

    /// Returns the full retained history, oldest first.
    #[must_use]
    pub const fn history(&self) -> &VecDeque<HistoryEntry> {
        &self.history
    }

    /// Returns session metadata.
    #[must_use]
    pub const fn metadata(&self) -> &BTreeMap<String, Value> {
        &self.metadata
    }

    /// Returns the scratch-pad memory.
    #[must_use]
    pub const fn memory(&self) -> &BTreeMap<String, Value> {
        &self.memory
    }

    /// Returns the ids of requests still awaiting a response.
    #[must_use]
    pub const fn pending_requests(&self) -> &BTreeSet<MessageId> {
        &self.pending_requests
    }

    /// Returns `true` once `now` is past `expires_at`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Returns the last `count` history entries in insertion order.
    #[must_use]
    pub fn recent_history(&self, count: usize) -> Vec<HistoryEntry> {
        let skip = self.history.len().saturating_sub(count);
        self.history.iter().skip(skip).cloned().collect()
    }

    /// Returns a scratch-pad value.
    #[must_use]
    pub fn memory_value(&self, key: &str) -> Option<&Value> {
        self.memory.get(key)
    }

    /// Pushes `expires_at` to one time-to-live after now.
    pub fn extend(&mut self, clock: &impl Clock) {
        let now = clock.utc();
        self.updated_at = now;
        self.expires_at = expiry_after(now, self.ttl);
    }

    /// Appends a history entry, evicting the oldest beyond the cap.
    pub fn push_history(&mut self, entry: HistoryEntry, clock: &impl Clock) {
        self.context.push_recent(entry.summary());
        self.history.push_back(entry);
        while self.history.len() > self.max_history {
            self.history.pop_front();
        }
        self.extend(clock);
    }

    /// Stores a scratch-pad value.
    pub fn store_memory(&mut self, key: impl Into<String>, value: Value, clock: &impl Clock) {
        self.memory.insert(key.into(), value);
        self.extend(clock);
    }

    /// Empties the scratch pad.
    pub fn clear_memory(&mut self, clock: &impl Clock) {
        self.memory.clear();
        self.extend(clock);
    }

    /// Sets a session metadata value.
    pub fn set_metadata(&mut self, key: impl Into<String>, value: Value, clock: &impl Clock) {
        self.metadata.insert(key.into(), value);
        self.extend(clock);
    }

    /// Merges caller preferences into the conversation context metadata.
    pub fn apply_preferences(
        &mut self,
        preferences: impl IntoIterator<Item = (String, Value)>,
        clock: &impl Clock,
    ) {
        self.context.merge_metadata(preferences);
        self.extend(clock);
    }

    /// Records which caller the session belongs to.
    pub fn attach_caller(&mut self, caller_id: impl Into<String>, clock: &impl Clock) {
        self.caller_id = Some(caller_id.into());
        self.extend(clock);
    }

    /// Records an outstanding request. Returns `false` if already tracked.
    pub fn track_pending(&mut self, request: MessageId, clock: &impl Clock) -> bool {
        let inserted = self.pending_requests.insert(request);
        self.extend(clock);
        inserted
    }

    /// Forgets an outstanding request. Returns `false` if it was not tracked.
    pub fn release_pending(&mut self, request: MessageId, clock: &impl Clock) -> bool {
        let removed = self.pending_requests.remove(&request);
        self.extend(clock);
        removed
    }
}

fn expiry_after(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    let delta = TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX);
    now.checked_add_signed(delta)
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
