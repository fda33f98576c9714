//! LLM prompts for row classification.
//!
//! All three deliberation roles answer in the same JSON shape so that whichever
//! agent speaks last produces a parseable verdict.

use crate::vocabulary::TypeRegistry;

/// System prompt for the first speaker.
pub const CRITIC_SYSTEM_PROMPT: &str = "You are a data quality and bias detection expert. \
For each row, analyze for any possible issues and bias. \
Respond with a JSON object: { \"issues\": [...], \"bias\": [...] }";

/// System prompt for the reviewer of the Critic's answer.
pub const CHECKER_SYSTEM_PROMPT: &str = "You are a data quality and bias detection expert. \
Check the previous assessment of this row against the data and the allowed types, \
correcting anything that is missing or unsupported. \
Respond with a JSON object: { \"issues\": [...], \"bias\": [...] }";

/// System prompt for the final speaker. Its answer is the verdict.
pub const RE_EVAL_SYSTEM_PROMPT: &str = "You are a data quality and bias detection expert. \
Re-evaluate the row and the previous assessments and give the final answer. \
Respond with a JSON object: { \"issues\": [...], \"bias\": [...] }";

/// Example answer shown to the model, also the canonical clean verdict.
pub const CLEAN_EXAMPLE: &str = r#"{"issues": ["none"], "bias": ["none"]}"#;

/// Builds the task prompt for one row.
///
/// `fields` are `(column, value)` pairs in prompt order.
pub fn build_classification_prompt(fields: &[(&str, &str)], vocabulary: &TypeRegistry) -> String {
    let col_data = fields
        .iter()
        .map(|(column, value)| format!("{}: {}", column, value))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Analyze the following data for any possible issues and bias.\n\
         {col_data}\n\n\
         Choose ONLY from these issue types: {issues}.\n\
         Choose ONLY from these bias types: {bias}.\n\
         Respond with a JSON object with two fields: 'issues' (list of selected issue types) \
         and 'bias' (list of selected bias types).\n\
         If no issue or bias is present, respond with [\"none\"] for both fields. \
         Do not invent new types. Example:\n\
         {example}",
        col_data = col_data,
        issues = render_list(vocabulary.issue_types()),
        bias = render_list(vocabulary.bias_types()),
        example = CLEAN_EXAMPLE,
    )
}

fn render_list(values: &[String]) -> String {
    serde_json::to_string(values).unwrap_or_else(|_| values.join(", "))
}
