//! Deliberating agents.
//!
//! - [`roles`] - the three roles and their system prompts
//! - [`session`] - the fixed three-turn exchange for one row
//! - [`error`] - session failures, carrying the failing agent's identity

pub mod error;
pub mod roles;
pub mod session;

pub use error::{SessionError, SessionResult};
pub use roles::AgentRole;
pub use session::{
    ClassificationSession, HttpProviderFactory, ProviderFactory, SessionSettings, Team, Turn,
};
