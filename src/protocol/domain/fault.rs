//! Error taxonomy shared by the protocol, retry strategy and orchestrator.
//!
//! Every failure observed while routing a request is expressed as an
//! [`AgentFault`]: a classified [`ErrorKind`] plus the raw code reported by
//! the worker and an internal diagnostic message. The diagnostic message is
//! for logs only; callers see [`ErrorKind::user_message`].

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Classification of a failure, deciding retry eligibility and the
/// caller-facing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed or invalid input.
    InvalidInput,
    /// A required piece of data was not supplied.
    MissingRequiredData,
    /// A value had the wrong type.
    TypeMismatch,
    /// An upstream API call failed.
    ApiError,
    /// A database operation failed.
    DatabaseError,
    /// The network was unreachable or reset.
    NetworkError,
    /// Establishing a connection timed out.
    ConnectionTimeout,
    /// The operation exceeded its deadline.
    Timeout,
    /// The caller is not authenticated.
    Unauthorized,
    /// The caller is not permitted to perform the operation.
    Forbidden,
    /// An unexpected internal failure.
    Internal,
    /// An internal failure explicitly known to be transient.
    TransientProcessing,
    /// The requested entity does not exist.
    NotFound,
    /// A business rule rejected the request.
    BusinessRule,
    /// No handler is registered for the addressed agent.
    ToolNotFound,
    /// The dependency is throttling requests.
    RateLimited,
    /// The dependency's circuit breaker is open.
    CircuitOpen,
    /// The communication layer is shutting down.
    ShuttingDown,
}

impl ErrorKind {
    /// Every kind, in declaration order.
    pub const ALL: [Self; 18] = [
        Self::InvalidInput,
        Self::MissingRequiredData,
        Self::TypeMismatch,
        Self::ApiError,
        Self::DatabaseError,
        Self::NetworkError,
        Self::ConnectionTimeout,
        Self::Timeout,
        Self::Unauthorized,
        Self::Forbidden,
        Self::Internal,
        Self::TransientProcessing,
        Self::NotFound,
        Self::BusinessRule,
        Self::ToolNotFound,
        Self::RateLimited,
        Self::CircuitOpen,
        Self::ShuttingDown,
    ];

    /// Returns the canonical wire code.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::InvalidInput => "INVALID_INPUT",
            Self::MissingRequiredData => "MISSING_REQUIRED_DATA",
            Self::TypeMismatch => "TYPE_MISMATCH",
            Self::ApiError => "API_ERROR",
            Self::DatabaseError => "DATABASE_ERROR",
            Self::NetworkError => "NETWORK_ERROR",
            Self::ConnectionTimeout => "CONNECTION_TIMEOUT",
            Self::Timeout => "TIMEOUT",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Forbidden => "FORBIDDEN",
            Self::Internal => "INTERNAL_ERROR",
            Self::TransientProcessing => "PROCESSING_ERROR",
            Self::NotFound => "NOT_FOUND",
            Self::BusinessRule => "BUSINESS_RULE_VIOLATION",
            Self::ToolNotFound => "TOOL_NOT_FOUND",
            Self::RateLimited => "RATE_LIMIT",
            Self::CircuitOpen => "CIRCUIT_OPEN",
            Self::ShuttingDown => "SHUTTING_DOWN",
        }
    }

    /// Looks a kind up by its wire code, case-insensitively.
    #[must_use]
    pub fn from_code(code: &str) -> Option<Self> {
        let normalized = code.trim().to_ascii_uppercase();
        match normalized.as_str() {
            "RATE_LIMITED" | "RATE_LIMIT_EXCEEDED" => Some(Self::RateLimited),
            "INTERNAL" => Some(Self::Internal),
            "NETWORK" => Some(Self::NetworkError),
            _ => Self::ALL.into_iter().find(|kind| kind.code() == normalized),
        }
    }

    /// Returns `true` when a failure of this kind may succeed on a later
    /// attempt.
    ///
    /// Validation, authorisation and business-rule failures never retry.
    /// Internal failures fail safe unless marked transient.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::ApiError
                | Self::DatabaseError
                | Self::NetworkError
                | Self::ConnectionTimeout
                | Self::Timeout
                | Self::TransientProcessing
                | Self::RateLimited
        )
    }

    /// Returns `true` for validation, authorisation and business-rule
    /// kinds: failures the caller can correct and that say nothing about
    /// the health of the worker that reported them.
    #[must_use]
    pub const fn is_caller_correctable(self) -> bool {
        matches!(
            self,
            Self::InvalidInput
                | Self::MissingRequiredData
                | Self::TypeMismatch
                | Self::Unauthorized
                | Self::Forbidden
                | Self::NotFound
                | Self::BusinessRule
        )
    }

    /// Returns the fixed message shown to callers for this kind.
    #[must_use]
    pub const fn user_message(self) -> &'static str {
        match self {
            Self::InvalidInput => "Some of the information provided isn't valid.",
            Self::MissingRequiredData => "I need a bit more information to continue.",
            Self::TypeMismatch => "Some of the information provided is in an unexpected format.",
            Self::ApiError | Self::DatabaseError | Self::Internal | Self::TransientProcessing => {
                "Something went wrong on our side while handling your request."
            }
            Self::NetworkError | Self::ConnectionTimeout => {
                "I'm having trouble reaching one of our systems right now."
            }
            Self::Timeout => "That took longer than expected.",
            Self::Unauthorized => "I couldn't verify your identity for this request.",
            Self::Forbidden => "That request isn't permitted for your account.",
            Self::NotFound => "I couldn't find what you were looking for.",
            Self::BusinessRule => "That request can't be completed under our policies.",
            Self::ToolNotFound | Self::CircuitOpen | Self::ShuttingDown => {
                "That service is temporarily unavailable."
            }
            Self::RateLimited => "We're receiving a lot of requests at the moment.",
        }
    }

    /// Returns remediation hints shown alongside the user message.
    #[must_use]
    pub const fn suggestions(self) -> &'static [&'static str] {
        match self {
            Self::InvalidInput | Self::TypeMismatch => {
                &["Please check the details and try again."]
            }
            Self::MissingRequiredData => &["Please provide the missing details."],
            Self::NotFound => &[
                "Please double-check the reference number.",
                "You can also ask to speak with an agent.",
            ],
            Self::Unauthorized | Self::Forbidden => &["Please contact support for access."],
            Self::RateLimited | Self::Timeout | Self::NetworkError | Self::ConnectionTimeout => {
                &["Please try again in a moment."]
            }
            Self::ApiError
            | Self::DatabaseError
            | Self::Internal
            | Self::TransientProcessing
            | Self::BusinessRule
            | Self::ToolNotFound
            | Self::CircuitOpen
            | Self::ShuttingDown => &[],
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A classified failure raised while routing or handling a request.
///
/// # Examples
///
/// ```
/// use concierge::protocol::domain::{AgentFault, ErrorKind};
///
/// let fault = AgentFault::new(ErrorKind::Timeout, "worker exceeded 5s");
/// assert!(fault.is_retryable());
/// assert_eq!(fault.code(), "TIMEOUT");
///
/// let vetoed = AgentFault::new(ErrorKind::Timeout, "idempotency unknown").with_retryable(false);
/// assert!(!vetoed.is_retryable());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{code}: {detail}")]
pub struct AgentFault {
    kind: ErrorKind,
    code: String,
    detail: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    retryable: Option<bool>,
}

impl AgentFault {
    /// Creates a fault whose code is the kind's canonical code.
    #[must_use]
    pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            code: kind.code().to_owned(),
            detail: detail.into(),
            retryable: None,
        }
    }

    /// Creates a fault from a raw worker error code.
    ///
    /// Unrecognised codes are classified as [`ErrorKind::Internal`] while the
    /// raw code is preserved for retry-pattern learning.
    #[must_use]
    pub fn from_code(code: impl Into<String>, detail: impl Into<String>) -> Self {
        let raw = code.into();
        let kind = ErrorKind::from_code(&raw).unwrap_or(ErrorKind::Internal);
        Self {
            kind,
            code: raw.trim().to_ascii_uppercase(),
            detail: detail.into(),
            retryable: None,
        }
    }

    /// Overrides the kind's default retry eligibility.
    #[must_use]
    pub const fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = Some(retryable);
        self
    }

    /// Returns the classified kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the raw error code.
    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Returns the internal diagnostic message. Never show this to callers.
    #[must_use]
    pub fn detail(&self) -> &str {
        &self.detail
    }

    /// Returns `true` when the fault may be retried.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.retryable.unwrap_or_else(|| self.kind.is_retryable())
    }

    /// Returns `true` when the caller, not a retry or fallback, has to act.
    ///
    /// A worker that explicitly marks such a fault retryable opts out.
    #[must_use]
    pub fn is_caller_correctable(&self) -> bool {
        self.kind.is_caller_correctable() && !self.is_retryable()
    }

    /// Returns the caller-facing message for this fault.
    #[must_use]
    pub const fn user_message(&self) -> &'static str {
        self.kind.user_message()
    }

    /// Returns the caller-facing message followed by the kind's
    /// remediation hints.
    ///
    /// ```
    /// use concierge::protocol::domain::{AgentFault, ErrorKind};
    ///
    /// let fault = AgentFault::new(ErrorKind::MissingRequiredData, "no date");
    /// assert_eq!(
    ///     fault.caller_reply(),
    ///     "I need a bit more information to continue. Please provide the missing details."
    /// );
    /// ```
    #[must_use]
    pub fn caller_reply(&self) -> String {
        let hints = self.kind.suggestions();
        if hints.is_empty() {
            return self.user_message().to_owned();
        }
        format!("{} {}", self.user_message(), hints.join(" "))
    }

    /// Creates an [`ErrorKind::Timeout`] fault.
    #[must_use]
    pub fn timeout(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, detail)
    }

    /// Creates an [`ErrorKind::InvalidInput`] fault.
    #[must_use]
    pub fn invalid_input(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidInput, detail)
    }

    /// Creates an [`ErrorKind::Internal`] fault.
    #[must_use]
    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, detail)
    }
}
