//! Runtime configuration loaded from TOML.
//!
//! Every section is optional; omitted keys take the defaults documented on
//! the section types. Durations are written as integer milliseconds with a
//! `_ms` suffix (or seconds with `_secs` for session lifetimes).
//!
//! ```toml
//! [communication]
//! default_timeout_ms = 5000
//!
//! [circuit_breaker]
//! failure_threshold = 3
//!
//! [circuit_breaker.dependencies.billing]
//! reset_timeout_ms = 10000
//!
//! [retry.dependencies.billing]
//! max_retries = 1
//!
//! [orchestrator]
//! default_agent = "support"
//! fallback_order = ["cached_data", "degraded_mode"]
//! ```

use crate::{
    communication::services::CommunicationConfig,
    orchestrator::domain::OrchestratorConfig,
    protocol::ports::ValidationConfig,
    resilience::{
        circuit_breaker::{CircuitBreakerConfig, CircuitBreakerOverride},
        retry::{RetryPolicy, RetryPolicyOverride},
    },
    session::services::SessionConfig,
};
use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use serde::Deserialize;
use std::collections::HashMap;
use thiserror::Error;

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config file '{path}': {source}")]
    Read {
        /// Path that was read.
        path: Utf8PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// The TOML document did not match the configuration schema.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value parsed but is outside its permitted range.
    #[error("invalid configuration value for '{key}': {message}")]
    InvalidValue {
        /// Dotted key of the offending value.
        key: String,
        /// What is wrong with it.
        message: String,
    },
}

impl ConfigError {
    fn invalid(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.into(),
            message: message.into(),
        }
    }
}

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Circuit breaker defaults plus per-dependency overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    /// Settings applied to every dependency without an override.
    #[serde(flatten)]
    pub defaults: CircuitBreakerConfig,
    /// Overrides keyed by dependency name.
    pub dependencies: HashMap<String, CircuitBreakerOverride>,
}

/// Retry defaults plus per-dependency overrides.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Policy applied when no dependency override matches.
    #[serde(flatten)]
    pub defaults: RetryPolicy,
    /// Overrides keyed by dependency name.
    pub dependencies: HashMap<String, RetryPolicyOverride>,
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ConciergeConfig {
    /// Dispatch and correlation settings.
    pub communication: CommunicationConfig,
    /// Breaker thresholds.
    pub circuit_breaker: CircuitBreakerSettings,
    /// Adaptive retry tuning.
    pub retry: RetrySettings,
    /// Session lifetime and storage bounds.
    pub session: SessionConfig,
    /// Routing and degradation behaviour.
    pub orchestrator: OrchestratorConfig,
    /// Message validation limits.
    pub validation: ValidationConfig,
}

impl ConciergeConfig {
    /// Parses configuration from a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the document is not valid TOML or
    /// does not match the schema, and [`ConfigError::InvalidValue`] when a
    /// value is out of range.
    pub fn from_toml_str(source: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a TOML configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] when the file cannot be read, otherwise
    /// the same errors as [`Self::from_toml_str`].
    pub fn from_file(path: impl AsRef<Utf8Path>) -> ConfigResult<Self> {
        let file_path = path.as_ref();
        let source = read_config(file_path).map_err(|source| ConfigError::Read {
            path: file_path.to_owned(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    /// Checks cross-field constraints that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] naming the first offending key.
    pub fn validate(&self) -> ConfigResult<()> {
        check_breaker("circuit_breaker", &self.circuit_breaker.defaults)?;
        let mut breakers: Vec<_> = self.circuit_breaker.dependencies.iter().collect();
        breakers.sort_by(|a, b| a.0.cmp(b.0));
        for (name, entry) in breakers {
            check_breaker(
                &format!("circuit_breaker.dependencies.{name}"),
                &entry.apply(&self.circuit_breaker.defaults),
            )?;
        }
        check_retry("retry", &self.retry.defaults)?;
        let mut retries: Vec<_> = self.retry.dependencies.iter().collect();
        retries.sort_by(|a, b| a.0.cmp(b.0));
        for (name, entry) in retries {
            check_retry(
                &format!("retry.dependencies.{name}"),
                &entry.apply(&self.retry.defaults),
            )?;
        }
        if self.communication.max_concurrent_dispatches == 0 {
            return Err(ConfigError::invalid(
                "communication.max_concurrent_dispatches",
                "must be at least 1",
            ));
        }
        if self.session.max_history == 0 {
            return Err(ConfigError::invalid(
                "session.max_history",
                "must be at least 1",
            ));
        }
        if self.orchestrator.default_agent.is_blank() {
            return Err(ConfigError::invalid(
                "orchestrator.default_agent",
                "must not be blank",
            ));
        }
        Ok(())
    }
}

fn read_config(path: &Utf8Path) -> std::io::Result<String> {
    let file_name = path.file_name().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "configuration path has no file name",
        )
    })?;
    let parent = path
        .parent()
        .filter(|parent| !parent.as_str().is_empty())
        .unwrap_or_else(|| Utf8Path::new("."));
    let dir = Dir::open_ambient_dir(parent, ambient_authority())?;
    dir.read_to_string(file_name)
}

fn check_breaker(prefix: &str, config: &CircuitBreakerConfig) -> ConfigResult<()> {
    if config.failure_threshold == 0 {
        return Err(ConfigError::invalid(
            format!("{prefix}.failure_threshold"),
            "must be at least 1",
        ));
    }
    if config.success_threshold == 0 {
        return Err(ConfigError::invalid(
            format!("{prefix}.success_threshold"),
            "must be at least 1",
        ));
    }
    Ok(())
}

fn check_retry(prefix: &str, policy: &RetryPolicy) -> ConfigResult<()> {
    // RangeInclusive::contains is false for NaN.
    if !(0.0..=1.0).contains(&policy.jitter_ratio) {
        return Err(ConfigError::invalid(
            format!("{prefix}.jitter_ratio"),
            "must be between 0 and 1",
        ));
    }
    if policy.success_window == 0 {
        return Err(ConfigError::invalid(
            format!("{prefix}.success_window"),
            "must be at least 1",
        ));
    }
    Ok(())
}

/// Serde helpers for [`std::time::Duration`] expressed as integer
/// milliseconds.
pub mod serde_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    /// Serializes a duration as whole milliseconds, saturating at `u64::MAX`.
    ///
    /// # Errors
    ///
    /// Propagates serializer failures.
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        as_millis(*duration).serialize(serializer)
    }

    /// Deserializes whole milliseconds into a duration.
    ///
    /// # Errors
    ///
    /// Fails when the value is not an unsigned integer.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }

    fn as_millis(duration: Duration) -> u64 {
        u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
    }

    /// The same encoding for optional durations.
    pub mod option {
        use serde::{Deserialize, Deserializer, Serialize, Serializer};
        use std::time::Duration;

        /// Serializes `Some` as milliseconds and `None` as a unit.
        ///
        /// # Errors
        ///
        /// Propagates serializer failures.
        pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            duration.map(super::as_millis).serialize(serializer)
        }

        /// Deserializes optional milliseconds.
        ///
        /// # Errors
        ///
        /// Fails when a present value is not an unsigned integer.
        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
        where
            D: Deserializer<'de>,
        {
            Option::<u64>::deserialize(deserializer).map(|millis| millis.map(Duration::from_millis))
        }
    }
}

/// Serde helpers for [`std::time::Duration`] expressed as integer seconds.
pub mod serde_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    /// Serializes a duration as whole seconds.
    ///
    /// # Errors
    ///
    /// Propagates serializer failures.
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    /// Deserializes whole seconds into a duration.
    ///
    /// # Errors
    ///
    /// Fails when the value is not an unsigned integer.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
