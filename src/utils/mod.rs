//! Shared utility functions for row-audit.

pub mod json_extraction;

pub use json_extraction::{extract_json_object, strip_code_fences};
