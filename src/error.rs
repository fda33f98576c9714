//! Error types for row-audit operations.
//!
//! Defines error types for the major subsystems:
//! - LLM API interactions
//! - Agent pool scheduling
//! - Issue/bias vocabulary loading
//! - Dataset input and output

use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use thiserror::Error;

/// Errors that can occur during LLM operations.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Missing API key for agent '{agent}': set the {env_var} environment variable")]
    MissingApiKey { agent: String, env_var: String },

    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Failed to parse LLM response: {0}")]
    ParseError(String),

    #[error("Rate limited (429): {0}")]
    RateLimited(String),

    #[error("API error ({code}): {message}")]
    ApiError { code: u16, message: String },

    #[error("LLM response contained no choices")]
    EmptyResponse,
}

/// Marker some providers put in the body of quota errors instead of a 429.
pub const RESOURCE_EXHAUSTED_MARKER: &str = "RESOURCE_EXHAUSTED";

impl LlmError {
    /// Returns true when the error signals that the credential or model is
    /// being throttled by the provider.
    pub fn is_rate_limited(&self) -> bool {
        match self {
            Self::RateLimited(_) => true,
            Self::ApiError { code: 429, .. } => true,
            Self::ApiError { message, .. } => message.contains(RESOURCE_EXHAUSTED_MARKER),
            Self::RequestFailed(message) => is_rate_limit_text(message),
            _ => false,
        }
    }
}

/// A 429 reported as a status, e.g. `HTTP 429` or `status: 429`, or its
/// reason phrase. Bare digits inside URLs or ports do not count.
static RATE_LIMIT_STATUS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:status|http|code|error)[^0-9a-z]{0,3}429\b|too many requests")
        .expect("rate limit status pattern is valid")
});

/// Rate limit detection for errors that only survive as strings.
fn is_rate_limit_text(message: &str) -> bool {
    message.contains(RESOURCE_EXHAUSTED_MARKER) || RATE_LIMIT_STATUS.is_match(message)
}

/// Errors that can occur while selecting agents from the pool.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("All agents for role '{role}' are on cooldown (next available in {retry_in:?})")]
    AllAgentsUnavailable { role: String, retry_in: Duration },

    #[error("No agents configured for role '{0}'")]
    EmptyRole(String),

    #[error("Duplicate agent name '{name}' in role '{role}'")]
    DuplicateAgent { role: String, name: String },

    #[error("Failed to read pool definition '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid pool definition '{path}': {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Errors that can occur while loading issue/bias vocabularies.
#[derive(Debug, Error)]
pub enum VocabularyError {
    #[error("Failed to read types file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid types file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Vocabulary '{0}' is empty")]
    Empty(&'static str),
}

/// Errors that can occur while reading input rows or writing outputs.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("CSV error in '{path}': {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("IO error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Column '{0}' not found in input header")]
    UnknownColumn(String),

    #[error("Input file '{0}' has no header row")]
    MissingHeader(PathBuf),

    #[error("Row {row} of '{path}' has {fields} fields but the header has {expected}")]
    RaggedRow {
        path: PathBuf,
        row: usize,
        fields: usize,
        expected: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_detection() {
        assert!(LlmError::RateLimited("slow down".to_string()).is_rate_limited());
        assert!(LlmError::ApiError {
            code: 429,
            message: "too many".to_string()
        }
        .is_rate_limited());
        assert!(LlmError::ApiError {
            code: 400,
            message: "status: RESOURCE_EXHAUSTED".to_string()
        }
        .is_rate_limited());
        assert!(!LlmError::ApiError {
            code: 500,
            message: "internal".to_string()
        }
        .is_rate_limited());
        assert!(!LlmError::EmptyResponse.is_rate_limited());
    }

    #[test]
    fn test_request_failure_text_needs_a_429_status() {
        let limited = |message: &str| LlmError::RequestFailed(message.to_string()).is_rate_limited();

        assert!(limited("HTTP 429 Too Many Requests"));
        assert!(limited("upstream returned status: 429"));
        assert!(limited("error code 429 from provider"));
        assert!(limited("too many requests, retry later"));
        assert!(limited("quota RESOURCE_EXHAUSTED"));

        assert!(!limited(
            "error sending request for url (http://localhost:4290/v1/chat/completions)"
        ));
        assert!(!limited("connection refused: https://api.example.com/jobs/429/run"));
        assert!(!limited("dns error: failed to lookup 10.0.4.29:429"));
        assert!(!limited("HTTP 4290 unexpected"));
    }

    #[test]
    fn test_missing_key_is_not_rate_limit() {
        let err = LlmError::MissingApiKey {
            agent: "Critic_Groq_1".to_string(),
            env_var: "GROQ_API_KEY_1".to_string(),
        };
        assert!(!err.is_rate_limited());
        assert!(err.to_string().contains("GROQ_API_KEY_1"));
    }
}
