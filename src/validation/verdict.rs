//! Turns a model's final message into a validated verdict.
//!
//! The pipeline is: strip code fences, take the greedy `{...}` span, parse it,
//! read `issues` and `bias` (each defaulting to `["none"]`), and check every
//! label against the active vocabulary. Any failure yields a
//! [`VerdictStatus::ParseError`] verdict that keeps the raw text.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::utils::json_extraction::{extract_json_object, strip_code_fences};
use crate::vocabulary::{TypeRegistry, NONE_LABEL};

/// Label written to the issue/bias columns for unparseable responses.
pub const PARSE_ERROR_LABEL: &str = "parse_error";

/// Outcome class of one row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerdictStatus {
    /// Both lists are exactly `["none"]`.
    Clean,
    /// Valid labels, at least one of them a finding.
    Flagged,
    /// The response could not be turned into valid labels.
    ParseError,
}

/// Why a response was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerdictError {
    #[error("No JSON object found in response")]
    NoJsonObject,

    #[error("Invalid JSON: {0}")]
    InvalidJson(String),

    #[error("Response JSON is not an object")]
    NotAnObject,

    #[error("Field '{field}' must be a list of strings")]
    InvalidField { field: &'static str },

    #[error("Response contains {field} type '{label}' not in the allowed list")]
    UnknownLabel { field: &'static str, label: String },
}

/// The classification of one row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub row_index: usize,
    /// Issue labels, first-seen order, no duplicates. Empty on parse error.
    pub issues: Vec<String>,
    /// Bias labels, first-seen order, no duplicates. Empty on parse error.
    pub bias: Vec<String>,
    pub status: VerdictStatus,
    /// The final message exactly as received.
    pub raw_response: String,
    /// Rejection reason for parse errors.
    pub error: Option<String>,
}

impl Verdict {
    /// Parses `raw` against `vocabulary`. Never fails: rejection is a status.
    pub fn from_response(row_index: usize, raw: &str, vocabulary: &TypeRegistry) -> Self {
        match parse_labels(raw, vocabulary) {
            Ok((issues, bias)) => {
                let status = if is_none_only(&issues) && is_none_only(&bias) {
                    VerdictStatus::Clean
                } else {
                    VerdictStatus::Flagged
                };
                Self {
                    row_index,
                    issues,
                    bias,
                    status,
                    raw_response: raw.to_string(),
                    error: None,
                }
            }
            Err(err) => Self {
                row_index,
                issues: Vec::new(),
                bias: Vec::new(),
                status: VerdictStatus::ParseError,
                raw_response: raw.to_string(),
                error: Some(err.to_string()),
            },
        }
    }

    /// Value for the `issues` output column.
    pub fn issues_column(&self) -> String {
        self.column(&self.issues)
    }

    /// Value for the `bias` output column.
    pub fn bias_column(&self) -> String {
        self.column(&self.bias)
    }

    fn column(&self, labels: &[String]) -> String {
        match self.status {
            VerdictStatus::ParseError => PARSE_ERROR_LABEL.to_string(),
            _ => labels.join(", "),
        }
    }

    /// Line for the run log.
    pub fn log_line(&self) -> String {
        match self.status {
            VerdictStatus::ParseError => format!(
                "Row {}: PARSE ERROR. Raw response: {}",
                self.row_index, self.raw_response
            ),
            _ => format!(
                "Row {}: Issues: {:?}, Bias: {:?}",
                self.row_index, self.issues, self.bias
            ),
        }
    }
}

/// Extracts and validates the `issues` and `bias` labels.
pub fn parse_labels(
    raw: &str,
    vocabulary: &TypeRegistry,
) -> Result<(Vec<String>, Vec<String>), VerdictError> {
    let cleaned = strip_code_fences(raw);
    let object_text = extract_json_object(&cleaned).ok_or(VerdictError::NoJsonObject)?;
    let value: Value =
        serde_json::from_str(object_text).map_err(|e| VerdictError::InvalidJson(e.to_string()))?;
    let object = value.as_object().ok_or(VerdictError::NotAnObject)?;

    let issues = read_labels(object.get("issues"), "issues")?;
    let bias = read_labels(object.get("bias"), "bias")?;

    if let Some(label) = issues.iter().find(|l| !vocabulary.is_issue_type(l)) {
        return Err(VerdictError::UnknownLabel {
            field: "issue",
            label: label.clone(),
        });
    }
    if let Some(label) = bias.iter().find(|l| !vocabulary.is_bias_type(l)) {
        return Err(VerdictError::UnknownLabel {
            field: "bias",
            label: label.clone(),
        });
    }

    Ok((issues, bias))
}

fn read_labels(value: Option<&Value>, field: &'static str) -> Result<Vec<String>, VerdictError> {
    let Some(value) = value else {
        return Ok(vec![NONE_LABEL.to_string()]);
    };
    let items = value
        .as_array()
        .ok_or(VerdictError::InvalidField { field })?;

    let mut labels: Vec<String> = Vec::with_capacity(items.len());
    for item in items {
        let label = item.as_str().ok_or(VerdictError::InvalidField { field })?;
        if !labels.iter().any(|l| l == label) {
            labels.push(label.to_string());
        }
    }
    Ok(labels)
}

fn is_none_only(labels: &[String]) -> bool {
    labels.len() == 1 && labels[0] == NONE_LABEL
}
