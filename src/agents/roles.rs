//! Deliberation roles.
//!
//! Every row is reviewed by three agents speaking in a fixed order. Each role
//! is backed by its own rotating pool of agent configurations.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::prompts::{CHECKER_SYSTEM_PROMPT, CRITIC_SYSTEM_PROMPT, RE_EVAL_SYSTEM_PROMPT};

/// A logical position in the deliberation sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    /// Gives the first assessment of the row.
    #[serde(alias = "Critic")]
    Critic,
    /// Reviews the Critic's assessment.
    #[serde(alias = "Checker")]
    Checker,
    /// Re-evaluates both and gives the final answer.
    #[serde(alias = "ReEval", alias = "reeval")]
    ReEval,
}

impl AgentRole {
    /// All roles in speaking order.
    pub fn all() -> [Self; 3] {
        [Self::Critic, Self::Checker, Self::ReEval]
    }

    /// Returns the display name for this role.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Critic => "Critic",
            Self::Checker => "Checker",
            Self::ReEval => "ReEval",
        }
    }

    /// Name the agent uses as a conversation participant.
    ///
    /// Providers sometimes echo it in error messages, which is one of the
    /// ways a failing agent is identified.
    pub fn participant_name(&self) -> &'static str {
        match self {
            Self::Critic => "Critic_Agent",
            Self::Checker => "Checker_Agent",
            Self::ReEval => "Re_Eval_Agent",
        }
    }

    /// Returns the system prompt for this role.
    pub fn system_prompt(&self) -> &'static str {
        match self {
            Self::Critic => CRITIC_SYSTEM_PROMPT,
            Self::Checker => CHECKER_SYSTEM_PROMPT,
            Self::ReEval => RE_EVAL_SYSTEM_PROMPT,
        }
    }
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl FromStr for AgentRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "critic" => Ok(Self::Critic),
            "checker" => Ok(Self::Checker),
            "reeval" => Ok(Self::ReEval),
            _ => Err(s.to_string()),
        }
    }
}
