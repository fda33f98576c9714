//! Validation of model output against the active vocabularies.

pub mod verdict;

pub use verdict::{parse_labels, Verdict, VerdictError, VerdictStatus, PARSE_ERROR_LABEL};
