//! Batch run configuration.
//!
//! A [`RunConfig`] names the input and output files, the prompt columns, any
//! vocabulary overrides, and the [`RetryPolicy`] the driver applies to rate
//! limits. Defaults can be overlaid from `ROW_AUDIT_*` environment variables;
//! the CLI overlays its flags on top of that.

use std::path::{Component, Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::agents::SessionSettings;
use crate::llm::pool::DEFAULT_COOLDOWN;

/// Default GOOD dataset path.
pub const DEFAULT_GOOD_PATH: &str = "good.csv";
/// Default ISSUES dataset path.
pub const DEFAULT_ISSUES_PATH: &str = "issues.csv";
/// Default run log path.
pub const DEFAULT_LOG_PATH: &str = "processing_log.txt";

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// What to cool down when a rate limit cannot be traced to one agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnidentifiedRateLimitPolicy {
    /// Cool down every agent of the failed attempt.
    #[default]
    CooldownAll,
    /// Cool down nothing; only back off before retrying.
    CooldownNone,
}

impl FromStr for UnidentifiedRateLimitPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "all" | "cooldown-all" => Ok(Self::CooldownAll),
            "none" | "cooldown-none" => Ok(Self::CooldownNone),
            other => Err(format!(
                "expected 'all' or 'none', got '{}'",
                other
            )),
        }
    }
}

impl std::fmt::Display for UnidentifiedRateLimitPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CooldownAll => write!(f, "all"),
            Self::CooldownNone => write!(f, "none"),
        }
    }
}

/// How the driver reacts to rate limits and pool exhaustion.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// How long a rate-limited agent is excluded from selection.
    pub cooldown: Duration,
    /// Fixed pause before retrying a rate-limited row.
    pub backoff: Duration,
    /// Rate-limit retries allowed per row; `None` retries forever.
    pub max_rate_limit_retries: Option<u32>,
    pub unidentified: UnidentifiedRateLimitPolicy,
    /// Stop the whole run, instead of abandoning the row, when a role has no
    /// agent left.
    pub halt_on_pool_exhaustion: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            cooldown: DEFAULT_COOLDOWN,
            backoff: Duration::from_secs(1),
            max_rate_limit_retries: Some(10),
            unidentified: UnidentifiedRateLimitPolicy::CooldownAll,
            halt_on_pool_exhaustion: false,
        }
    }
}

/// Configuration for one batch run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub input_path: PathBuf,
    pub good_path: PathBuf,
    pub issues_path: PathBuf,
    pub log_path: PathBuf,
    /// Columns shown to the model; `None` means all.
    pub columns: Option<Vec<String>>,
    /// Replaces the loaded issue vocabulary for this run.
    pub issue_types: Option<Vec<String>>,
    /// Replaces the loaded bias vocabulary for this run.
    pub bias_types: Option<Vec<String>>,
    pub retry: RetryPolicy,
    pub session: SessionSettings,
}

impl RunConfig {
    /// Configuration with default output paths.
    pub fn new(input_path: impl Into<PathBuf>) -> Self {
        Self {
            input_path: input_path.into(),
            good_path: PathBuf::from(DEFAULT_GOOD_PATH),
            issues_path: PathBuf::from(DEFAULT_ISSUES_PATH),
            log_path: PathBuf::from(DEFAULT_LOG_PATH),
            columns: None,
            issue_types: None,
            bias_types: None,
            retry: RetryPolicy::default(),
            session: SessionSettings::default(),
        }
    }

    /// Overlays settings from the process environment.
    ///
    /// # Environment Variables
    ///
    /// - `ROW_AUDIT_COOLDOWN_SECS`: Agent cooldown after a rate limit (default: 60)
    /// - `ROW_AUDIT_BACKOFF_MS`: Pause before retrying a row (default: 1000)
    /// - `ROW_AUDIT_MAX_RETRIES`: Rate-limit retries per row, or `unbounded` (default: 10)
    /// - `ROW_AUDIT_UNIDENTIFIED_POLICY`: `all` or `none` (default: all)
    /// - `ROW_AUDIT_HALT_ON_EXHAUSTION`: Stop the run when a pool is exhausted (default: false)
    /// - `ROW_AUDIT_TEMPERATURE`: Sampling temperature (default: provider default)
    /// - `ROW_AUDIT_MAX_TOKENS`: Max tokens per turn (default: provider default)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable has an invalid value.
    pub fn with_env(self) -> Result<Self, ConfigError> {
        self.with_env_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`with_env`](Self::with_env) with an explicit lookup.
    pub fn with_env_lookup(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(val) = lookup("ROW_AUDIT_COOLDOWN_SECS") {
            let secs: u64 = parse_env_value(&val, "ROW_AUDIT_COOLDOWN_SECS")?;
            self.retry.cooldown = Duration::from_secs(secs);
        }

        if let Some(val) = lookup("ROW_AUDIT_BACKOFF_MS") {
            let ms: u64 = parse_env_value(&val, "ROW_AUDIT_BACKOFF_MS")?;
            self.retry.backoff = Duration::from_millis(ms);
        }

        if let Some(val) = lookup("ROW_AUDIT_MAX_RETRIES") {
            self.retry.max_rate_limit_retries = parse_retry_limit(&val, "ROW_AUDIT_MAX_RETRIES")?;
        }

        if let Some(val) = lookup("ROW_AUDIT_UNIDENTIFIED_POLICY") {
            self.retry.unidentified =
                val.parse()
                    .map_err(|message| ConfigError::InvalidValue {
                        key: "ROW_AUDIT_UNIDENTIFIED_POLICY".to_string(),
                        message,
                    })?;
        }

        if let Some(val) = lookup("ROW_AUDIT_HALT_ON_EXHAUSTION") {
            self.retry.halt_on_pool_exhaustion =
                parse_env_bool(&val, "ROW_AUDIT_HALT_ON_EXHAUSTION")?;
        }

        if let Some(val) = lookup("ROW_AUDIT_TEMPERATURE") {
            self.session.temperature = Some(parse_env_value(&val, "ROW_AUDIT_TEMPERATURE")?);
        }

        if let Some(val) = lookup("ROW_AUDIT_MAX_TOKENS") {
            self.session.max_tokens = Some(parse_env_value(&val, "ROW_AUDIT_MAX_TOKENS")?);
        }

        self.validate()?;
        Ok(self)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.input_path.as_os_str().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "input_path cannot be empty".to_string(),
            ));
        }

        let files = [
            ("input", &self.input_path),
            ("good", &self.good_path),
            ("issues", &self.issues_path),
            ("log", &self.log_path),
        ];
        let resolved: Vec<PathBuf> = files.iter().map(|(_, path)| normalize_path(path)).collect();
        for i in 0..files.len() {
            for j in (i + 1)..files.len() {
                if resolved[i] == resolved[j] {
                    return Err(ConfigError::ValidationFailed(format!(
                        "{} and {} must be different files (both resolve to {})",
                        files[i].0,
                        files[j].0,
                        resolved[i].display()
                    )));
                }
            }
        }

        if matches!(&self.columns, Some(cols) if cols.is_empty()) {
            return Err(ConfigError::ValidationFailed(
                "column selection cannot be empty".to_string(),
            ));
        }

        if let Some(temperature) = self.session.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(ConfigError::ValidationFailed(
                    "temperature must be between 0.0 and 2.0".to_string(),
                ));
            }
        }

        if self.session.max_tokens == Some(0) {
            return Err(ConfigError::ValidationFailed(
                "max_tokens must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Builder method to set the output paths.
    pub fn with_outputs(
        mut self,
        good: impl Into<PathBuf>,
        issues: impl Into<PathBuf>,
        log: impl Into<PathBuf>,
    ) -> Self {
        self.good_path = good.into();
        self.issues_path = issues.into();
        self.log_path = log.into();
        self
    }

    /// Builder method to restrict the prompt columns.
    pub fn with_columns(mut self, columns: Vec<String>) -> Self {
        self.columns = Some(columns);
        self
    }

    /// Builder method to override the vocabularies.
    pub fn with_vocabulary_override(
        mut self,
        issue_types: Option<Vec<String>>,
        bias_types: Option<Vec<String>>,
    ) -> Self {
        self.issue_types = issue_types;
        self.bias_types = bias_types;
        self
    }

    /// Builder method to set the retry policy.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Builder method to set sampling options.
    pub fn with_session_settings(mut self, session: SessionSettings) -> Self {
        self.session = session;
        self
    }
}

/// Absolute form of `path` for identity checks.
///
/// `.` and `..` are folded lexically, then the parent directory is
/// canonicalized when it exists so symlinked directories compare equal. The
/// file itself need not exist.
fn normalize_path(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };

    let mut folded = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                folded.pop();
            }
            other => folded.push(other.as_os_str()),
        }
    }

    let canonical = match (folded.parent(), folded.file_name()) {
        (Some(parent), Some(name)) => parent.canonicalize().ok().map(|dir| dir.join(name)),
        _ => None,
    };
    canonical.unwrap_or(folded)
}

/// Parses an environment variable value into the target type.
fn parse_env_value<T: FromStr>(value: &str, key: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })
}

/// Parses a boolean environment variable value.
fn parse_env_bool(value: &str, key: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected boolean value, got '{}'", value),
        }),
    }
}

/// Parses a retry limit; `unbounded`, `none` and `inf` mean no limit.
pub fn parse_retry_limit(value: &str, key: &str) -> Result<Option<u32>, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "unbounded" | "none" | "inf" => Ok(None),
        other => parse_env_value(other, key).map(Some),
    }
}
