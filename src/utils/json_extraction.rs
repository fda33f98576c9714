//! JSON extraction from free-text LLM responses.
//!
//! Models wrap their answer in markdown fences or surround it with prose.
//! Extraction is deliberately simple: strip fence markers, then take the span
//! from the first `{` to the last `}`. Anything that span fails to parse as is
//! treated as a malformed answer by the caller.
//!
//! # Example
//!
//! ```
//! use row_audit::utils::json_extraction::{extract_json_object, strip_code_fences};
//!
//! let response = "```json\n{\"issues\": [\"none\"]}\n```";
//! let cleaned = strip_code_fences(response);
//! assert_eq!(extract_json_object(&cleaned), Some("{\"issues\": [\"none\"]}"));
//! ```

use regex::Regex;
use std::sync::LazyLock;

/// Opening fence (with optional `json` tag) at line start, or a closing fence
/// at line end.
static CODE_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^```json|^```|```$").expect("code fence pattern is valid")
});

/// First `{` through last `}`, across lines.
static GREEDY_OBJECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{.*\}").expect("object pattern is valid"));

/// Removes markdown code-fence markers and trims the result.
pub fn strip_code_fences(content: &str) -> String {
    CODE_FENCE.replace_all(content.trim(), "").trim().to_string()
}

/// Returns the greedy brace-delimited span, if any.
pub fn extract_json_object(content: &str) -> Option<&str> {
    GREEDY_OBJECT.find(content).map(|m| m.as_str())
}
