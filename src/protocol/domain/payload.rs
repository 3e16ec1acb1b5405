//! Message payloads and the standard worker result shape.

use super::AgentFault;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Content carried by a [`Message`](super::Message).
///
/// The `Json` variant carries payloads this crate does not model, so new
/// worker protocols can be introduced without changing the enum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Payload {
    /// Free text.
    Text {
        /// The text.
        text: String,
    },
    /// A routed caller query.
    Query {
        /// Intent resolved by the router.
        intent: String,
        /// The caller's original text.
        text: String,
        /// Entities extracted by the router.
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        entities: BTreeMap<String, Value>,
    },
    /// A worker's answer.
    Result(WorkerResult),
    /// A request for missing details.
    Clarification {
        /// The question to put to the caller.
        question: String,
        /// The fields still required.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        required: Vec<RequiredField>,
    },
    /// Any other JSON document.
    Json {
        /// The document.
        value: Value,
    },
}

impl Payload {
    /// Creates a text payload.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Creates a query payload with no extracted entities.
    #[must_use]
    pub fn query(intent: impl Into<String>, text: impl Into<String>) -> Self {
        Self::Query {
            intent: intent.into(),
            text: text.into(),
            entities: BTreeMap::new(),
        }
    }

    /// Returns the worker result, if this payload carries one.
    #[must_use]
    pub const fn as_result(&self) -> Option<&WorkerResult> {
        match self {
            Self::Result(result) => Some(result),
            _ => None,
        }
    }

    /// Returns the kind tag used on the wire.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::Query { .. } => "query",
            Self::Result(_) => "result",
            Self::Clarification { .. } => "clarification",
            Self::Json { .. } => "json",
        }
    }
}

impl From<WorkerResult> for Payload {
    fn from(result: WorkerResult) -> Self {
        Self::Result(result)
    }
}

/// Outcome reported by a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    /// The request was handled.
    Success,
    /// The worker needs more information from the caller.
    NeedsInfo,
    /// The worker failed.
    Error,
    /// The request was handled in part.
    Partial,
}

/// Error detail attached to a failed [`WorkerResult`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultError {
    /// Machine-readable error code.
    pub code: String,
    /// Diagnostic message; logged, never shown to callers.
    pub message: String,
    /// Whether the worker considers the failure transient.
    #[serde(default)]
    pub retryable: bool,
}

/// A field a worker needs before it can complete a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequiredField {
    /// Field name.
    pub field: String,
    /// Expected type, e.g. `"string"` or `"date"`.
    pub field_type: String,
    /// Caller-facing description.
    pub description: String,
}

impl RequiredField {
    /// Creates a required field description.
    #[must_use]
    pub fn new(
        field: impl Into<String>,
        field_type: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            field_type: field_type.into(),
            description: description.into(),
        }
    }
}

/// Standard result shape returned by every worker handler.
///
/// # Examples
///
/// ```
/// use concierge::protocol::domain::{ResultStatus, WorkerResult};
/// use serde_json::json;
///
/// let result = WorkerResult::success(json!({"balance": "12.00"}));
/// assert_eq!(result.status, ResultStatus::Success);
///
/// let failed = WorkerResult::error("API_ERROR", "upstream 502", true);
/// let fault = failed.into_fault().expect("error results convert to faults");
/// assert!(fault.is_retryable());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerResult {
    /// Outcome.
    pub status: ResultStatus,
    /// Result data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Error detail when `status` is [`ResultStatus::Error`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ResultError>,
    /// Fields needed when `status` is [`ResultStatus::NeedsInfo`].
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<RequiredField>,
}

impl WorkerResult {
    /// Creates a successful result.
    #[must_use]
    pub const fn success(data: Value) -> Self {
        Self {
            status: ResultStatus::Success,
            data: Some(data),
            error: None,
            required: Vec::new(),
        }
    }

    /// Creates a partial result.
    #[must_use]
    pub const fn partial(data: Value) -> Self {
        Self {
            status: ResultStatus::Partial,
            data: Some(data),
            error: None,
            required: Vec::new(),
        }
    }

    /// Creates a result asking for more information.
    #[must_use]
    pub const fn needs_info(required: Vec<RequiredField>) -> Self {
        Self {
            status: ResultStatus::NeedsInfo,
            data: None,
            error: None,
            required,
        }
    }

    /// Creates a failed result.
    #[must_use]
    pub fn error(code: impl Into<String>, message: impl Into<String>, retryable: bool) -> Self {
        Self {
            status: ResultStatus::Error,
            data: None,
            error: Some(ResultError {
                code: code.into(),
                message: message.into(),
                retryable,
            }),
            required: Vec::new(),
        }
    }

    /// Returns `true` when the worker reported a failure.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.status == ResultStatus::Error
    }

    /// Converts a failed result into a fault carrying the worker's code and
    /// retry flag. Returns `None` for any other status.
    #[must_use]
    pub fn into_fault(self) -> Option<AgentFault> {
        if !self.is_error() {
            return None;
        }
        let fault = match self.error {
            Some(detail) => AgentFault::from_code(detail.code, detail.message)
                .with_retryable(detail.retryable),
            None => AgentFault::internal("worker reported an error without detail"),
        };
        Some(fault)
    }
}
