//! Batch driver.
//!
//! Walks the input rows in order. For each row it selects one agent per
//! role, runs a three-turn session, parses the final answer and routes the
//! row to the GOOD or ISSUES dataset. Rate-limited rows are retried with a
//! fresh team after the failing agent is cooled down; every other failure
//! skips the row.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use super::config::{ConfigError, RunConfig, UnidentifiedRateLimitPolicy};
use crate::agents::{AgentRole, ClassificationSession, ProviderFactory, SessionError, Team};
use crate::dataset::{InputTable, OutputDatasets, RunLog};
use crate::error::{DatasetError, PoolError, VocabularyError};
use crate::llm::pool::{AgentKey, AgentScheduler};
use crate::prompts::build_classification_prompt;
use crate::validation::{Verdict, VerdictStatus};
use crate::vocabulary::TypeRegistry;

/// Errors that stop a whole run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Dataset error: {0}")]
    Dataset(#[from] DatasetError),

    #[error("Vocabulary error: {0}")]
    Vocabulary(#[from] VocabularyError),

    #[error("Run halted at row {row}: {reason}")]
    Halted { row: usize, reason: String },
}

/// Why a row was given up on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbandonCause {
    /// A role had no agent off cooldown.
    PoolExhausted,
    /// The row hit the rate-limit retry bound.
    RetriesExhausted,
}

/// Terminal state of one row.
#[derive(Debug, Clone, PartialEq)]
pub enum RowOutcome {
    Classified(Verdict),
    Skipped { reason: String },
    Abandoned { reason: String, cause: AbandonCause },
}

impl RowOutcome {
    /// Line for the run log.
    pub fn log_line(&self, row: usize) -> String {
        match self {
            Self::Classified(verdict) => verdict.log_line(),
            Self::Skipped { reason } => {
                format!("Row {} SKIPPED due to UNHANDLED ERROR: {}", row, reason)
            }
            Self::Abandoned { reason, .. } => format!("Row {} ABANDONED: {}", row, reason),
        }
    }
}

/// A row's outcome plus the rate-limit retries it took.
#[derive(Debug, Clone, PartialEq)]
pub struct RowReport {
    pub outcome: RowOutcome,
    pub rate_limit_retries: u32,
}

/// Counts for a finished run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub total_rows: usize,
    pub clean: usize,
    pub flagged: usize,
    pub parse_errors: usize,
    pub skipped: usize,
    pub abandoned: usize,
    pub rate_limit_retries: u64,
    pub good_path: PathBuf,
    pub issues_path: PathBuf,
    pub log_path: PathBuf,
}

impl RunSummary {
    fn new(total_rows: usize, config: &RunConfig) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            total_rows,
            clean: 0,
            flagged: 0,
            parse_errors: 0,
            skipped: 0,
            abandoned: 0,
            rate_limit_retries: 0,
            good_path: config.good_path.clone(),
            issues_path: config.issues_path.clone(),
            log_path: config.log_path.clone(),
        }
    }

    fn record(&mut self, report: &RowReport) {
        self.rate_limit_retries += u64::from(report.rate_limit_retries);
        match &report.outcome {
            RowOutcome::Classified(verdict) => match verdict.status {
                VerdictStatus::Clean => self.clean += 1,
                VerdictStatus::Flagged => self.flagged += 1,
                VerdictStatus::ParseError => self.parse_errors += 1,
            },
            RowOutcome::Skipped { .. } => self.skipped += 1,
            RowOutcome::Abandoned { .. } => self.abandoned += 1,
        }
    }

    /// Rows that reached a terminal state.
    pub fn processed(&self) -> usize {
        self.clean + self.flagged + self.parse_errors + self.skipped + self.abandoned
    }
}

/// Sequential row classifier.
pub struct BatchRunner {
    scheduler: AgentScheduler,
    factory: Arc<dyn ProviderFactory>,
    vocabulary: TypeRegistry,
    config: RunConfig,
}

impl BatchRunner {
    /// Creates a runner. `config` is validated and its vocabulary overrides
    /// are applied to `vocabulary` here.
    pub fn new(
        scheduler: AgentScheduler,
        factory: Arc<dyn ProviderFactory>,
        vocabulary: TypeRegistry,
        config: RunConfig,
    ) -> Result<Self, RunError> {
        config.validate()?;
        let vocabulary =
            vocabulary.with_overrides(config.issue_types.clone(), config.bias_types.clone())?;

        for agent in scheduler.pool().missing_credentials() {
            tracing::warn!(
                agent = %agent.key(),
                env_var = agent.credential.source(),
                "API key not set; calls through this agent will fail"
            );
        }

        Ok(Self {
            scheduler,
            factory,
            vocabulary,
            config,
        })
    }

    pub fn scheduler(&self) -> &AgentScheduler {
        &self.scheduler
    }

    pub fn vocabulary(&self) -> &TypeRegistry {
        &self.vocabulary
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Processes every row of the input file.
    ///
    /// # Errors
    ///
    /// Returns `RunError` when the input cannot be read, an output cannot be
    /// written, or a role runs out of agents while
    /// `halt_on_pool_exhaustion` is set.
    pub async fn run(&mut self) -> Result<RunSummary, RunError> {
        let table = InputTable::from_path(&self.config.input_path)?;
        let indices = table.column_indices(self.config.columns.as_deref())?;
        let mut outputs =
            OutputDatasets::create(&self.config.good_path, &self.config.issues_path, table.headers())?;
        let mut log = RunLog::create(&self.config.log_path)?;
        let mut summary = RunSummary::new(table.len(), &self.config);

        tracing::info!(
            run_id = %summary.run_id,
            input = %table.path().display(),
            rows = table.len(),
            agents = self.scheduler.pool().len(),
            "Starting classification run"
        );

        for (index, row) in table.rows().iter().enumerate() {
            let prompt = build_classification_prompt(&table.fields(row, &indices), &self.vocabulary);
            let report = self.process_row(index, &prompt).await;

            if let RowOutcome::Classified(verdict) = &report.outcome {
                let destination = outputs.record(row, verdict)?;
                tracing::info!(
                    row = index,
                    status = ?verdict.status,
                    destination = ?destination,
                    "Row classified"
                );
            }
            log.append(&report.outcome.log_line(index))?;
            summary.record(&report);

            if let RowOutcome::Abandoned {
                reason,
                cause: AbandonCause::PoolExhausted,
            } = &report.outcome
            {
                if self.config.retry.halt_on_pool_exhaustion {
                    return Err(RunError::Halted {
                        row: index,
                        reason: reason.clone(),
                    });
                }
            }
        }

        summary.finished_at = Some(Utc::now());
        tracing::info!(
            run_id = %summary.run_id,
            clean = summary.clean,
            flagged = summary.flagged,
            parse_errors = summary.parse_errors,
            skipped = summary.skipped,
            abandoned = summary.abandoned,
            rate_limit_retries = summary.rate_limit_retries,
            "Classification run finished"
        );
        Ok(summary)
    }

    /// Drives one row to a terminal state.
    pub async fn process_row(&mut self, index: usize, prompt: &str) -> RowReport {
        let mut retries = 0u32;

        loop {
            let team = match self.select_team() {
                Ok(team) => team,
                Err(err) => {
                    tracing::warn!(row = index, error = %err, "No agents available");
                    return RowReport {
                        outcome: RowOutcome::Abandoned {
                            reason: err.to_string(),
                            cause: AbandonCause::PoolExhausted,
                        },
                        rate_limit_retries: retries,
                    };
                }
            };

            let result = match ClassificationSession::new(
                self.factory.as_ref(),
                &team,
                self.config.session,
            ) {
                Ok(session) => session.run(prompt).await,
                Err(err) => Err(err),
            };

            let err = match result {
                Ok(raw) => {
                    return RowReport {
                        outcome: RowOutcome::Classified(Verdict::from_response(
                            index,
                            &raw,
                            &self.vocabulary,
                        )),
                        rate_limit_retries: retries,
                    };
                }
                Err(err) => err,
            };

            if !err.is_rate_limited() {
                tracing::warn!(row = index, error = %err, "Row skipped");
                return RowReport {
                    outcome: RowOutcome::Skipped {
                        reason: err.to_string(),
                    },
                    rate_limit_retries: retries,
                };
            }

            tracing::warn!(row = index, attempt = retries + 1, error = %err, "Rate limited");
            self.cool_down(&err, &team);

            if let Some(max) = self.config.retry.max_rate_limit_retries {
                if retries >= max {
                    return RowReport {
                        outcome: RowOutcome::Abandoned {
                            reason: format!(
                                "rate limited after {} retries; last error: {}",
                                retries, err
                            ),
                            cause: AbandonCause::RetriesExhausted,
                        },
                        rate_limit_retries: retries,
                    };
                }
            }

            retries += 1;
            tokio::time::sleep(self.config.retry.backoff).await;
        }
    }

    fn select_team(&mut self) -> Result<Team, PoolError> {
        Ok(Team {
            critic: self.scheduler.select(AgentRole::Critic)?,
            checker: self.scheduler.select(AgentRole::Checker)?,
            re_eval: self.scheduler.select(AgentRole::ReEval)?,
        })
    }

    /// Cools down the agent behind a rate-limit error, or applies the
    /// unidentified-agent policy.
    fn cool_down(&mut self, err: &SessionError, team: &Team) {
        let implicated = err.implicated_agent().or_else(|| {
            err.unattributed_detail()
                .and_then(|detail| identify_by_text(&detail, team))
        });

        match (implicated, self.config.retry.unidentified) {
            (Some(key), _) => self.scheduler.place_on_cooldown(&key),
            (None, UnidentifiedRateLimitPolicy::CooldownAll) => {
                tracing::warn!("Could not identify rate-limited agent; cooling down the whole team");
                for member in team.members() {
                    self.scheduler.place_on_cooldown(&member.key());
                }
            }
            (None, UnidentifiedRateLimitPolicy::CooldownNone) => {
                tracing::warn!("Could not identify rate-limited agent; retrying without cooldown");
            }
        }
    }
}

/// Finds the team member an error message refers to.
///
/// Agent names win over participant names, which win over models. A model
/// only identifies an agent when no other member shares it.
pub fn identify_by_text(message: &str, team: &Team) -> Option<AgentKey> {
    let members = team.members();

    if let Some(member) = members.iter().find(|m| message.contains(m.name.as_str())) {
        return Some(member.key());
    }

    if let Some(member) = members
        .iter()
        .find(|m| message.contains(m.role.participant_name()))
    {
        return Some(member.key());
    }

    let mut by_model = members
        .iter()
        .filter(|m| !m.model.is_empty() && message.contains(m.model.as_str()));
    match (by_model.next(), by_model.next()) {
        (Some(member), None) => Some(member.key()),
        _ => None,
    }
}
