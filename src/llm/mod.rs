//! LLM integration for row-audit.
//!
//! - [`chat`] - the `LlmProvider` trait and an OpenAI-compatible client
//! - [`pool`] - per-role agent pools and the cooldown scheduler
//!
//! ```ignore
//! use row_audit::agents::AgentRole;
//! use row_audit::llm::pool::{AgentPool, AgentScheduler, DEFAULT_COOLDOWN};
//!
//! let pool = AgentPool::builtin(|var| std::env::var(var).ok())?;
//! let mut scheduler = AgentScheduler::new(pool, DEFAULT_COOLDOWN);
//! let critic = scheduler.select(AgentRole::Critic)?;
//! ```

pub mod chat;
pub mod pool;

pub use chat::{
    ChatCompletionClient, GenerationRequest, GenerationResponse, LlmProvider, Message, Usage,
};
pub use pool::{
    AgentConfig, AgentKey, AgentPool, AgentScheduler, Credential, ModelCapabilities,
    DEFAULT_COOLDOWN,
};
