//! Error types for classification sessions.

use thiserror::Error;

use super::roles::AgentRole;
use crate::error::LlmError;
use crate::llm::pool::AgentKey;

/// Errors that abort a classification session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// A participant's call failed. Carries the identity of the failing agent
    /// so the caller can cool down exactly that credential.
    #[error("Agent '{agent}' ({role}, model {model}) failed: {source}")]
    Agent {
        role: AgentRole,
        agent: String,
        model: String,
        #[source]
        source: LlmError,
    },

    /// A provider could not be constructed for a pool entry. The factory is
    /// shared by the whole team, so the failure is not pinned on `agent`.
    #[error("Failed to set up agent '{agent}': {source}")]
    Setup {
        agent: String,
        #[source]
        source: LlmError,
    },
}

impl SessionError {
    /// Whether the failure is a provider rate limit.
    pub fn is_rate_limited(&self) -> bool {
        match self {
            Self::Agent { source, .. } | Self::Setup { source, .. } => source.is_rate_limited(),
        }
    }

    /// The agent responsible, when the error carries it.
    pub fn implicated_agent(&self) -> Option<AgentKey> {
        match self {
            Self::Agent { role, agent, .. } => Some(AgentKey {
                role: *role,
                name: agent.clone(),
            }),
            Self::Setup { .. } => None,
        }
    }

    /// Provider text to search for an agent name or model when the error
    /// carries no identity. Excludes the wrapper message, which always names
    /// the entry being built.
    pub fn unattributed_detail(&self) -> Option<String> {
        match self {
            Self::Agent { .. } => None,
            Self::Setup { source, .. } => Some(source.to_string()),
        }
    }
}

/// Result type alias for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_error_identifies_agent() {
        let err = SessionError::Agent {
            role: AgentRole::Checker,
            agent: "Checker_Groq_2".to_string(),
            model: "llama".to_string(),
            source: LlmError::RateLimited("quota".to_string()),
        };
        assert!(err.is_rate_limited());
        assert_eq!(
            err.implicated_agent(),
            Some(AgentKey {
                role: AgentRole::Checker,
                name: "Checker_Groq_2".to_string()
            })
        );
        let text = err.to_string();
        assert!(text.contains("Checker_Groq_2"));
        assert!(text.contains("llama"));
    }

    #[test]
    fn test_setup_error_is_unattributed() {
        let err = SessionError::Setup {
            agent: "Critic_Groq_1".to_string(),
            source: LlmError::RequestFailed("HTTP 429 Too Many Requests".to_string()),
        };
        assert!(err.is_rate_limited());
        assert_eq!(err.implicated_agent(), None);

        let detail = err.unattributed_detail().expect("setup errors expose provider text");
        assert!(detail.contains("Too Many Requests"));
        assert!(!detail.contains("Critic_Groq_1"));
    }

    #[test]
    fn test_agent_error_has_no_unattributed_detail() {
        let err = SessionError::Agent {
            role: AgentRole::Critic,
            agent: "c".to_string(),
            model: "m".to_string(),
            source: LlmError::ApiError {
                code: 500,
                message: "boom".to_string(),
            },
        };
        assert!(!err.is_rate_limited());
        assert_eq!(err.unattributed_detail(), None);
    }
}
