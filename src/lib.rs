//! row-audit: multi-agent LLM classification of CSV rows.
//!
//! Each row is rendered into a prompt, discussed by a Critic, a Checker and a
//! ReEval agent, and sorted into a GOOD or ISSUES dataset depending on the
//! issue and bias labels of the final answer. Agents are drawn round-robin
//! from per-role pools; rate-limited agents sit out a cooldown.

pub mod agents;
pub mod cli;
pub mod dataset;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod prompts;
pub mod utils;
pub mod validation;
pub mod vocabulary;

pub use error::{DatasetError, LlmError, PoolError, VocabularyError};
