//! Validator port for protocol messages.

use crate::protocol::{domain::Message, error::ValidationError};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Port for message validation.
///
/// Validation occurs in two layers:
/// 1. Structure: identity, addressing, timestamps, response flag
/// 2. Limits: serialised size and payload text length
///
/// Implementations collect every failure before returning and combine them
/// with [`ValidationError::multiple`].
pub trait MessageValidator: Send + Sync {
    /// Validates a message against all rules.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if any rule fails.
    fn validate(&self, message: &Message) -> ValidationResult<()>;

    /// Validates only the structural rules.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if structural validation fails.
    fn validate_structure(&self, message: &Message) -> ValidationResult<()>;

    /// Validates size and payload limits.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if a limit is exceeded.
    fn validate_limits(&self, message: &Message) -> ValidationResult<()>;
}

/// Limits applied by the validator.
///
/// # Examples
///
/// ```
/// use concierge::protocol::ports::validator::ValidationConfig;
///
/// let config = ValidationConfig::default();
/// assert!(!config.allow_empty_text);
///
/// let lenient = ValidationConfig::lenient();
/// assert!(lenient.allow_empty_text);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Maximum serialised message size in bytes.
    pub max_message_size_bytes: usize,
    /// Maximum text payload length in characters.
    pub max_text_length: usize,
    /// Whether empty text payloads are accepted.
    pub allow_empty_text: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_message_size_bytes: 1024 * 1024, // 1 MiB
            max_text_length: 100_000,
            allow_empty_text: false,
        }
    }
}

impl ValidationConfig {
    /// Creates a lenient configuration that accepts empty text.
    #[must_use]
    pub fn lenient() -> Self {
        Self {
            allow_empty_text: true,
            ..Default::default()
        }
    }

    /// Creates a strict configuration with reduced limits.
    #[must_use]
    pub const fn strict() -> Self {
        Self {
            max_message_size_bytes: 64 * 1024, // 64 KiB
            max_text_length: 4_000,
            allow_empty_text: false,
        }
    }
}
