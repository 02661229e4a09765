//! Engine configuration.
//!
//! Precedence, lowest first: built-in defaults, a TOML document, then
//! `PLANSIEVE_*` environment variables. Every value is validated once by
//! [`EngineConfig::validate`] before an engine is built from it.

use crate::error::{ErrorClass, ErrorOrigin, InternalError};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::{fmt, path::Path, str::FromStr, time::Duration};
use thiserror::Error as ThisError;

pub const ENV_PREFIX: &str = "PLANSIEVE_";

///
/// ConfigError
///

#[derive(Debug, ThisError)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid config document: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("failed to build worker pool: {0}")]
    Pool(String),
}

impl ConfigError {
    fn invalid(key: &str, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.to_string(),
            message: message.into(),
        }
    }

    pub(crate) const fn class(&self) -> ErrorClass {
        match self {
            Self::Io { .. } | Self::Parse(_) | Self::InvalidValue { .. } => {
                ErrorClass::Configuration
            }
            Self::Pool(_) => ErrorClass::Internal,
        }
    }
}

impl From<ConfigError> for InternalError {
    fn from(err: ConfigError) -> Self {
        Self::new(err.class(), ErrorOrigin::Config, err.to_string())
    }
}

///
/// MissingFilterPolicy
///
/// What to do with a leaf whose filter is not registered.
///

#[derive(Clone, Copy, Debug, Default, Deserialize, Display, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingFilterPolicy {
    /// Leave the leaf out of the result store.
    #[default]
    #[display("skip")]
    Skip,
    /// Fail the evaluation before any resolver runs.
    #[display("reject")]
    Reject,
}

impl FromStr for MissingFilterPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "skip" => Ok(Self::Skip),
            "reject" => Ok(Self::Reject),
            other => Err(format!("expected 'skip' or 'reject', got '{other}'")),
        }
    }
}

///
/// MissingOperandPolicy
///
/// What a `NOT` merges to when one of its operands left nothing in the
/// result store.
///

#[derive(Clone, Copy, Debug, Default, Deserialize, Display, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingOperandPolicy {
    /// Treat the absent operand as the empty set.
    #[default]
    #[display("empty")]
    Empty,
    #[display("reject")]
    Reject,
}

impl FromStr for MissingOperandPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "empty" => Ok(Self::Empty),
            "reject" => Ok(Self::Reject),
            other => Err(format!("expected 'empty' or 'reject', got '{other}'")),
        }
    }
}

///
/// EngineConfig
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Resolver worker threads; `1` resolves leaves inline.
    pub workers: usize,

    /// Whole-query deadline, shared with nested pipeline runs.
    pub query_timeout_ms: Option<u64>,

    /// Extra attempts for resolver failures marked transient.
    pub resolver_retries: u32,

    /// Extra plan-generation attempts.
    pub plan_retries: u32,

    pub max_nesting_depth: u32,
    pub missing_filter: MissingFilterPolicy,
    pub missing_operand: MissingOperandPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            query_timeout_ms: None,
            resolver_retries: 0,
            plan_retries: 2,
            max_nesting_depth: 4,
            missing_filter: MissingFilterPolicy::Skip,
            missing_operand: MissingOperandPolicy::Empty,
        }
    }
}

impl EngineConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;

        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;

        Self::from_toml_str(&source)
    }

    /// Defaults, then `file` if given, then the process environment.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match file {
            Some(path) => Self::from_toml_file(path)?,
            None => Self::default(),
        };
        config.apply_env()?;

        Ok(config)
    }

    /// Apply `PLANSIEVE_*` overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply `PLANSIEVE_*` overrides read through `lookup`.
    pub fn apply_env_from(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        let var = |name: &str| {
            let key = format!("{ENV_PREFIX}{name}");
            lookup(&key).map(|value| (key, value))
        };

        if let Some((key, value)) = var("WORKERS") {
            self.workers = parse_value(&key, &value)?;
        }
        if let Some((key, value)) = var("QUERY_TIMEOUT_MS") {
            self.query_timeout_ms = if value.trim().is_empty() || value.trim() == "none" {
                None
            } else {
                Some(parse_value(&key, &value)?)
            };
        }
        if let Some((key, value)) = var("RESOLVER_RETRIES") {
            self.resolver_retries = parse_value(&key, &value)?;
        }
        if let Some((key, value)) = var("PLAN_RETRIES") {
            self.plan_retries = parse_value(&key, &value)?;
        }
        if let Some((key, value)) = var("MAX_NESTING_DEPTH") {
            self.max_nesting_depth = parse_value(&key, &value)?;
        }
        if let Some((key, value)) = var("MISSING_FILTER") {
            self.missing_filter = parse_value(&key, &value)?;
        }
        if let Some((key, value)) = var("MISSING_OPERAND") {
            self.missing_operand = parse_value(&key, &value)?;
        }

        self.validate()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::invalid("workers", "must be at least 1"));
        }
        if self.query_timeout_ms == Some(0) {
            return Err(ConfigError::invalid(
                "query_timeout_ms",
                "must be positive; omit it to disable the deadline",
            ));
        }

        Ok(())
    }

    #[must_use]
    pub fn query_timeout(&self) -> Option<Duration> {
        self.query_timeout_ms.map(Duration::from_millis)
    }

    /// Worker pool for leaf resolution, or `None` when leaves run inline.
    pub fn build_pool(&self) -> Result<Option<rayon::ThreadPool>, ConfigError> {
        self.validate()?;
        if self.workers == 1 {
            return Ok(None);
        }

        rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .thread_name(|i| format!("plansieve-worker-{i}"))
            .build()
            .map(Some)
            .map_err(|err| ConfigError::Pool(err.to_string()))
    }
}

fn parse_value<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|err: T::Err| ConfigError::invalid(key, format!("'{value}': {err}")))
}
