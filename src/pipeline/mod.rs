//! Batch classification pipeline.
//!
//! - **Config**: paths, column selection, vocabulary overrides and the
//!   rate-limit [`RetryPolicy`]
//! - **Runner**: the sequential [`BatchRunner`] that classifies every row and
//!   writes the GOOD/ISSUES datasets and the run log
//!
//! # Row lifecycle
//!
//! 1. **Select**: one agent per role from the cooldown scheduler
//! 2. **Deliberate**: Critic, Checker and ReEval answer in turn
//! 3. **Parse**: the final answer becomes a [`Verdict`](crate::validation::Verdict)
//! 4. **Route**: CLEAN rows go to GOOD, FLAGGED and PARSE_ERROR rows to ISSUES
//!
//! Rate limits cool the failing agent down and send the row back to step 1.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use row_audit::agents::HttpProviderFactory;
//! use row_audit::llm::{AgentPool, AgentScheduler};
//! use row_audit::pipeline::{BatchRunner, RunConfig};
//! use row_audit::vocabulary::TypeRegistry;
//!
//! let config = RunConfig::new("translations.csv").with_env()?;
//! let pool = AgentPool::builtin(|var| std::env::var(var).ok())?;
//! let scheduler = AgentScheduler::new(pool, config.retry.cooldown);
//! let factory = Arc::new(HttpProviderFactory::with_default_timeout()?);
//!
//! let mut runner = BatchRunner::new(scheduler, factory, TypeRegistry::builtin()?, config)?;
//! let summary = runner.run().await?;
//! println!("{} clean, {} flagged", summary.clean, summary.flagged);
//! ```

pub mod config;
pub mod runner;

pub use config::{ConfigError, RetryPolicy, RunConfig, UnidentifiedRateLimitPolicy};
pub use runner::{
    identify_by_text, AbandonCause, BatchRunner, RowOutcome, RowReport, RunError, RunSummary,
};
