//! Closed vocabularies of issue and bias labels.
//!
//! Model output is only accepted when every label it uses is listed here.
//! The defaults ship with the binary (`types.json`); a run may replace either
//! list wholesale.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::VocabularyError;

/// Label meaning "nothing found".
pub const NONE_LABEL: &str = "none";

const DEFAULT_TYPES_JSON: &str = include_str!("../types.json");

/// On-disk shape of a types file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct TypesFile {
    issue_types: Vec<String>,
    bias_types: Vec<String>,
}

/// The active issue and bias vocabularies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeRegistry {
    issue_types: Vec<String>,
    bias_types: Vec<String>,
}

impl TypeRegistry {
    /// Builds a registry, dropping duplicate labels. Neither list may be empty.
    pub fn new(issue_types: Vec<String>, bias_types: Vec<String>) -> Result<Self, VocabularyError> {
        let issue_types = dedup(issue_types);
        let bias_types = dedup(bias_types);
        if issue_types.is_empty() {
            return Err(VocabularyError::Empty("issue_types"));
        }
        if bias_types.is_empty() {
            return Err(VocabularyError::Empty("bias_types"));
        }
        Ok(Self {
            issue_types,
            bias_types,
        })
    }

    /// The vocabulary bundled with the crate.
    pub fn builtin() -> Result<Self, VocabularyError> {
        Self::from_json(DEFAULT_TYPES_JSON)
    }

    /// Parses a types document with exactly `issue_types` and `bias_types`.
    pub fn from_json(json: &str) -> Result<Self, VocabularyError> {
        let file: TypesFile = serde_json::from_str(json)?;
        Self::new(file.issue_types, file.bias_types)
    }

    pub fn from_file(path: &Path) -> Result<Self, VocabularyError> {
        let json = std::fs::read_to_string(path).map_err(|source| VocabularyError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Replaces either list with a caller-supplied one.
    pub fn with_overrides(
        self,
        issue_types: Option<Vec<String>>,
        bias_types: Option<Vec<String>>,
    ) -> Result<Self, VocabularyError> {
        Self::new(
            issue_types.unwrap_or(self.issue_types),
            bias_types.unwrap_or(self.bias_types),
        )
    }

    pub fn issue_types(&self) -> &[String] {
        &self.issue_types
    }

    pub fn bias_types(&self) -> &[String] {
        &self.bias_types
    }

    pub fn is_issue_type(&self, label: &str) -> bool {
        self.issue_types.iter().any(|t| t == label)
    }

    pub fn is_bias_type(&self, label: &str) -> bool {
        self.bias_types.iter().any(|t| t == label)
    }
}

fn dedup(values: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(values.len());
    for value in values {
        let value = value.trim().to_string();
        if !value.is_empty() && !out.contains(&value) {
            out.push(value);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_vocabulary_loads() {
        let vocab = TypeRegistry::builtin().expect("bundled types.json is valid");
        assert!(vocab.is_issue_type(NONE_LABEL));
        assert!(vocab.is_bias_type(NONE_LABEL));
        assert!(vocab.is_issue_type("grammar"));
        assert!(!vocab.is_issue_type("typo"));
    }

    #[test]
    fn test_from_json_rejects_extra_fields() {
        let json = r#"{"issue_types": ["none"], "bias_types": ["none"], "extra": 1}"#;
        assert!(matches!(
            TypeRegistry::from_json(json),
            Err(VocabularyError::Json(_))
        ));
    }

    #[test]
    fn test_from_json_requires_both_fields() {
        let json = r#"{"issue_types": ["none"]}"#;
        assert!(TypeRegistry::from_json(json).is_err());
    }

    #[test]
    fn test_empty_vocabulary_rejected() {
        let err = TypeRegistry::new(vec![], vec!["none".to_string()]).unwrap_err();
        assert!(matches!(err, VocabularyError::Empty("issue_types")));
    }

    #[test]
    fn test_overrides_replace_lists() {
        let vocab = TypeRegistry::builtin()
            .expect("builtin")
            .with_overrides(Some(vec!["none".to_string(), "typo".to_string()]), None)
            .expect("override");
        assert!(vocab.is_issue_type("typo"));
        assert!(!vocab.is_issue_type("grammar"));
        assert!(vocab.is_bias_type("gender"));
    }

    #[test]
    fn test_duplicates_and_blanks_dropped() {
        let vocab = TypeRegistry::new(
            vec!["none".into(), " none ".into(), "".into(), "grammar".into()],
            vec!["none".into()],
        )
        .expect("vocab");
        assert_eq!(vocab.issue_types(), ["none", "grammar"]);
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("types.json");
        std::fs::write(&path, r#"{"issue_types": ["none"], "bias_types": ["none", "age"]}"#)
            .expect("write");
        let vocab = TypeRegistry::from_file(&path).expect("load");
        assert_eq!(vocab.bias_types(), ["none", "age"]);

        let missing = TypeRegistry::from_file(&dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(missing, VocabularyError::Io { .. }));
    }
}
