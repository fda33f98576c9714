//! CLI command definitions for row-audit.
//!
//! `classify` runs a batch over a CSV file; `pool` and `types` print the
//! agent pool and the label vocabulary a run would use.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use crate::agents::{HttpProviderFactory, SessionSettings};
use crate::llm::{AgentPool, AgentScheduler};
use crate::pipeline::config::{
    parse_retry_limit, DEFAULT_GOOD_PATH, DEFAULT_ISSUES_PATH, DEFAULT_LOG_PATH,
};
use crate::pipeline::{BatchRunner, RunConfig, RunSummary, UnidentifiedRateLimitPolicy};
use crate::vocabulary::TypeRegistry;

/// Multi-agent LLM classifier for CSV rows.
#[derive(Parser)]
#[command(name = "row-audit")]
#[command(about = "Classify CSV rows for data-quality issues and bias with deliberating LLM agents")]
#[command(version)]
#[command(
    long_about = "row-audit sends every row of a CSV file through a Critic, Checker and ReEval agent and sorts it into a GOOD or ISSUES dataset.\n\nExample usage:\n  row-audit classify translations.csv --columns source,target --good good.csv --issues issues.csv"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Classify every row of a CSV file.
    Classify(ClassifyArgs),

    /// Show the agent pool and which API keys are set.
    Pool(PoolArgs),

    /// Show the allowed issue and bias types.
    Types(TypesArgs),
}

/// Arguments for `row-audit classify`.
#[derive(Parser, Debug)]
pub struct ClassifyArgs {
    /// Input CSV file with a header row.
    pub input: PathBuf,

    /// Output CSV for rows without issues.
    #[arg(long, default_value = DEFAULT_GOOD_PATH)]
    pub good: PathBuf,

    /// Output CSV for flagged and unparseable rows.
    #[arg(long, default_value = DEFAULT_ISSUES_PATH)]
    pub issues: PathBuf,

    /// Per-row processing log.
    #[arg(long, default_value = DEFAULT_LOG_PATH)]
    pub log: PathBuf,

    /// Comma-separated columns shown to the model (default: all).
    #[arg(long)]
    pub columns: Option<String>,

    /// JSON file with `issue_types` and `bias_types` (default: built-in).
    #[arg(long, env = "ROW_AUDIT_TYPES_FILE")]
    pub types: Option<PathBuf>,

    /// Comma-separated issue types replacing the loaded list.
    #[arg(long)]
    pub issue_types: Option<String>,

    /// Comma-separated bias types replacing the loaded list.
    #[arg(long)]
    pub bias_types: Option<String>,

    /// YAML agent pool definition (default: built-in Groq pool).
    #[arg(long, env = "ROW_AUDIT_POOL_FILE")]
    pub pool: Option<PathBuf>,

    /// Seconds a rate-limited agent is excluded from selection.
    #[arg(long)]
    pub cooldown_secs: Option<u64>,

    /// Milliseconds to wait before retrying a rate-limited row.
    #[arg(long)]
    pub backoff_ms: Option<u64>,

    /// Rate-limit retries per row, or `unbounded`.
    #[arg(long)]
    pub max_retries: Option<String>,

    /// What to cool down when the rate-limited agent is unknown (all, none).
    #[arg(long)]
    pub unidentified_policy: Option<UnidentifiedRateLimitPolicy>,

    /// Stop the run when a role has no agent off cooldown.
    #[arg(long)]
    pub halt_on_exhaustion: bool,

    /// Sampling temperature for every turn.
    #[arg(long)]
    pub temperature: Option<f64>,

    /// Max tokens per turn.
    #[arg(long)]
    pub max_tokens: Option<u32>,

    /// Print the run summary as JSON.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `row-audit pool`.
#[derive(Parser, Debug)]
pub struct PoolArgs {
    /// YAML agent pool definition (default: built-in Groq pool).
    #[arg(long, env = "ROW_AUDIT_POOL_FILE")]
    pub pool: Option<PathBuf>,
}

/// Arguments for `row-audit types`.
#[derive(Parser, Debug)]
pub struct TypesArgs {
    /// JSON file with `issue_types` and `bias_types` (default: built-in).
    #[arg(long, env = "ROW_AUDIT_TYPES_FILE")]
    pub types: Option<PathBuf>,

    /// Print as JSON.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Parse CLI arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Parse CLI args and run the command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Classify(args) => run_classify_command(args).await,
        Commands::Pool(args) => run_pool_command(args),
        Commands::Types(args) => run_types_command(args),
    }
}

// ============================================================================
// Command implementations
// ============================================================================

async fn run_classify_command(args: ClassifyArgs) -> anyhow::Result<()> {
    let config = build_run_config(&args)?;
    let vocabulary = load_vocabulary(args.types.as_deref())?;
    let pool = load_pool(args.pool.as_deref())?;
    let scheduler = AgentScheduler::new(pool, config.retry.cooldown);
    let factory = Arc::new(
        HttpProviderFactory::with_default_timeout().context("Failed to build HTTP client")?,
    );

    info!(input = %config.input_path.display(), "Classifying rows");
    let mut runner = BatchRunner::new(scheduler, factory, vocabulary, config)?;
    let summary = runner.run().await?;

    if args.json {
        let json = serde_json::to_string_pretty(&summary)
            .context("Failed to serialize run summary")?;
        println!("{}", json);
    } else {
        print_summary(&summary);
    }
    Ok(())
}

fn run_pool_command(args: PoolArgs) -> anyhow::Result<()> {
    let pool = load_pool(args.pool.as_deref())?;

    println!("{} agents", pool.len());
    for agent in pool.iter() {
        println!(
            "  {:<8} {:<16} {:<50} key={} ({})",
            agent.role.display_name(),
            agent.name,
            agent.model,
            agent.credential.masked(),
            agent.credential.source(),
        );
        println!("           {} via {}", agent.capabilities.summary(), agent.endpoint);
    }

    let missing = pool.missing_credentials();
    if !missing.is_empty() {
        println!();
        println!("{} agents have no API key and will fail when selected", missing.len());
    }
    Ok(())
}

fn run_types_command(args: TypesArgs) -> anyhow::Result<()> {
    let vocabulary = load_vocabulary(args.types.as_deref())?;

    if args.json {
        let json = serde_json::json!({
            "issue_types": vocabulary.issue_types(),
            "bias_types": vocabulary.bias_types(),
        });
        println!("{}", serde_json::to_string_pretty(&json)?);
        return Ok(());
    }

    println!("Issue types: {}", vocabulary.issue_types().join(", "));
    println!("Bias types:  {}", vocabulary.bias_types().join(", "));
    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

/// Defaults, then `ROW_AUDIT_*` variables, then flags.
fn build_run_config(args: &ClassifyArgs) -> anyhow::Result<RunConfig> {
    let mut config = RunConfig::new(&args.input)
        .with_outputs(&args.good, &args.issues, &args.log)
        .with_vocabulary_override(
            args.issue_types.as_deref().map(parse_list),
            args.bias_types.as_deref().map(parse_list),
        )
        .with_env()
        .context("Invalid ROW_AUDIT_* environment configuration")?;

    if let Some(columns) = args.columns.as_deref() {
        config = config.with_columns(parse_list(columns));
    }
    if let Some(secs) = args.cooldown_secs {
        config.retry.cooldown = Duration::from_secs(secs);
    }
    if let Some(ms) = args.backoff_ms {
        config.retry.backoff = Duration::from_millis(ms);
    }
    if let Some(limit) = args.max_retries.as_deref() {
        config.retry.max_rate_limit_retries = parse_retry_limit(limit, "--max-retries")?;
    }
    if let Some(policy) = args.unidentified_policy {
        config.retry.unidentified = policy;
    }
    if args.halt_on_exhaustion {
        config.retry.halt_on_pool_exhaustion = true;
    }
    let session = SessionSettings {
        temperature: args.temperature.or(config.session.temperature),
        max_tokens: args.max_tokens.or(config.session.max_tokens),
    };
    config = config.with_session_settings(session);

    config.validate()?;
    Ok(config)
}

fn load_vocabulary(path: Option<&Path>) -> anyhow::Result<TypeRegistry> {
    match path {
        Some(path) => TypeRegistry::from_file(path)
            .with_context(|| format!("Failed to load types file {}", path.display())),
        None => Ok(TypeRegistry::builtin()?),
    }
}

fn load_pool(path: Option<&Path>) -> anyhow::Result<AgentPool> {
    match path {
        Some(path) => AgentPool::from_file(path)
            .with_context(|| format!("Failed to load pool definition {}", path.display())),
        None => Ok(AgentPool::builtin(|var| std::env::var(var).ok())?),
    }
}

/// Splits a comma-separated list, dropping blanks.
fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn print_summary(summary: &RunSummary) {
    println!("Run {}", summary.run_id);
    println!("  rows:        {}", summary.total_rows);
    println!("  clean:       {}", summary.clean);
    println!("  flagged:     {}", summary.flagged);
    println!("  parse error: {}", summary.parse_errors);
    println!("  skipped:     {}", summary.skipped);
    println!("  abandoned:   {}", summary.abandoned);
    println!("  rate-limit retries: {}", summary.rate_limit_retries);
    println!("  good:   {}", summary.good_path.display());
    println!("  issues: {}", summary.issues_path.display());
    println!("  log:    {}", summary.log_path.display());
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parses() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_classify_command_defaults() {
        let cli = Cli::try_parse_from(["row-audit", "classify", "data.csv"]).expect("should parse");

        match cli.command {
            Commands::Classify(args) => {
                assert_eq!(args.input, PathBuf::from("data.csv"));
                assert_eq!(args.good, PathBuf::from("good.csv"));
                assert_eq!(args.issues, PathBuf::from("issues.csv"));
                assert_eq!(args.log, PathBuf::from("processing_log.txt"));
                assert!(args.columns.is_none());
                assert!(args.unidentified_policy.is_none());
                assert!(!args.halt_on_exhaustion);
                assert!(!args.json);
            }
            _ => panic!("Expected Classify command"),
        }
    }

    #[test]
    fn test_classify_command_with_options() {
        let cli = Cli::try_parse_from([
            "row-audit",
            "classify",
            "data.csv",
            "--columns",
            "source, target",
            "--issue-types",
            "none,grammar",
            "--cooldown-secs",
            "5",
            "--max-retries",
            "unbounded",
            "--unidentified-policy",
            "none",
            "--halt-on-exhaustion",
            "--temperature",
            "0.2",
        ])
        .expect("should parse");

        let Commands::Classify(args) = cli.command else {
            panic!("Expected Classify command");
        };
        let config = build_run_config(&args).expect("valid config");

        assert_eq!(
            config.columns,
            Some(vec!["source".to_string(), "target".to_string()])
        );
        assert_eq!(
            config.issue_types,
            Some(vec!["none".to_string(), "grammar".to_string()])
        );
        assert!(config.bias_types.is_none());
        assert_eq!(config.retry.cooldown, Duration::from_secs(5));
        assert_eq!(config.retry.max_rate_limit_retries, None);
        assert_eq!(
            config.retry.unidentified,
            UnidentifiedRateLimitPolicy::CooldownNone
        );
        assert!(config.retry.halt_on_pool_exhaustion);
        assert_eq!(config.session.temperature, Some(0.2));
    }

    #[test]
    fn test_invalid_policy_rejected() {
        let result = Cli::try_parse_from([
            "row-audit",
            "classify",
            "data.csv",
            "--unidentified-policy",
            "some",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_log_level_is_global() {
        let cli = Cli::try_parse_from(["row-audit", "types", "--log-level", "debug"])
            .expect("should parse");
        assert_eq!(cli.log_level, "debug");
    }

    #[test]
    fn test_parse_list() {
        assert_eq!(parse_list(" a, b ,,c"), vec!["a", "b", "c"]);
        assert!(parse_list("").is_empty());
    }
}
