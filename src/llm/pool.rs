//! Agent pools and the cooldown-aware round-robin scheduler.
//!
//! Each role owns a pool of `(model, credential, endpoint)` configurations.
//! [`AgentScheduler::select`] rotates through a role's pool, skipping entries
//! that recently hit a rate limit, so a batch keeps moving as long as one
//! credential per role has quota left.
//!
//! Cooldowns are keyed by [`AgentKey`] (role + name), so two roles may reuse a
//! display name without throttling each other. Names must be unique within a
//! role.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::time::{Duration, Instant};

use crate::agents::AgentRole;
use crate::error::PoolError;

/// Default cooldown applied to an agent after a rate limit.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(60);

/// Groq's OpenAI-compatible endpoint, used by the built-in pool.
pub const GROQ_ENDPOINT: &str = "https://api.groq.com/openai/v1";

/// Model used by the built-in pool.
pub const DEFAULT_MODEL: &str = "meta-llama/llama-4-maverick-17b-128e-instruct";

/// Environment variables holding the built-in pool's keys, one per entry.
pub const DEFAULT_KEY_ENV_VARS: [&str; 3] = ["GROQ_API_KEY_1", "GROQ_API_KEY_2", "GROQ_API_KEY_3"];

// ============================================================================
// Agent configuration
// ============================================================================

/// What a model can do. Carried for reporting; requests do not depend on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelCapabilities {
    #[serde(default)]
    pub vision: bool,
    #[serde(default)]
    pub function_calling: bool,
    #[serde(default)]
    pub json_output: bool,
    #[serde(default)]
    pub structured_output: bool,
    #[serde(default = "default_family")]
    pub family: String,
}

fn default_family() -> String {
    "unknown".to_string()
}

impl Default for ModelCapabilities {
    fn default() -> Self {
        Self {
            vision: false,
            function_calling: false,
            json_output: false,
            structured_output: false,
            family: default_family(),
        }
    }
}

impl ModelCapabilities {
    /// Capabilities of Llama 4 Maverick as served by Groq.
    pub fn llama4_maverick() -> Self {
        Self {
            vision: false,
            function_calling: true,
            json_output: true,
            structured_output: false,
            family: "llama-4-maverick".to_string(),
        }
    }

    /// Short comma-separated summary, e.g. `llama-4-maverick: json, tools`.
    pub fn summary(&self) -> String {
        let mut flags = Vec::new();
        if self.json_output {
            flags.push("json");
        }
        if self.structured_output {
            flags.push("structured");
        }
        if self.function_calling {
            flags.push("tools");
        }
        if self.vision {
            flags.push("vision");
        }
        if flags.is_empty() {
            self.family.clone()
        } else {
            format!("{}: {}", self.family, flags.join(", "))
        }
    }
}

/// An API key and where it came from.
///
/// A missing secret does not fail pool construction; the entry stays in the
/// pool and every call through it fails with `LlmError::MissingApiKey`.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    source: String,
    secret: Option<String>,
}

impl Credential {
    /// Reads the key from the given environment variable.
    pub fn from_env(var: &str) -> Self {
        Self::resolve(var, |name| std::env::var(name).ok())
    }

    /// Resolves the key through an arbitrary lookup (environment, test map).
    pub fn resolve(var: &str, lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            source: var.to_string(),
            secret: lookup(var).filter(|v| !v.trim().is_empty()),
        }
    }

    /// A key supplied directly.
    pub fn inline(secret: impl Into<String>) -> Self {
        Self {
            source: "inline".to_string(),
            secret: Some(secret.into()),
        }
    }

    /// No key at all.
    pub fn missing(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            secret: None,
        }
    }

    /// Name of the variable (or "inline") the key was taken from.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn secret(&self) -> Option<&str> {
        self.secret.as_deref()
    }

    pub fn is_present(&self) -> bool {
        self.secret.is_some()
    }

    /// Masked key for display.
    pub fn masked(&self) -> String {
        match &self.secret {
            None => "<missing>".to_string(),
            Some(key) if key.chars().count() <= 8 => "*".repeat(key.chars().count()),
            Some(key) => {
                let chars: Vec<char> = key.chars().collect();
                let head: String = chars[..4].iter().collect();
                let tail: String = chars[chars.len() - 4..].iter().collect();
                format!("{}...{}", head, tail)
            }
        }
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("source", &self.source)
            .field("secret", &self.masked())
            .finish()
    }
}

/// Identity used for cooldown bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AgentKey {
    pub role: AgentRole,
    pub name: String,
}

impl std::fmt::Display for AgentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.role, self.name)
    }
}

/// One concrete agent: a model reachable at an endpoint with a credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentConfig {
    pub role: AgentRole,
    pub name: String,
    pub model: String,
    pub credential: Credential,
    pub endpoint: String,
    pub capabilities: ModelCapabilities,
}

impl AgentConfig {
    pub fn key(&self) -> AgentKey {
        AgentKey {
            role: self.role,
            name: self.name.clone(),
        }
    }
}

// ============================================================================
// Pool definition
// ============================================================================

/// YAML pool file.
///
/// ```yaml
/// defaults:
///   endpoint: https://api.groq.com/openai/v1
///   model: meta-llama/llama-4-maverick-17b-128e-instruct
/// agents:
///   - role: critic
///     name: Critic_Groq_1
///     api_key_env: GROQ_API_KEY_1
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PoolDefinition {
    #[serde(default)]
    pub defaults: PoolDefaults,
    pub agents: Vec<AgentDefinition>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PoolDefaults {
    pub endpoint: Option<String>,
    pub model: Option<String>,
    pub capabilities: Option<ModelCapabilities>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentDefinition {
    pub role: AgentRole,
    pub name: String,
    pub model: Option<String>,
    pub endpoint: Option<String>,
    pub api_key_env: String,
    pub capabilities: Option<ModelCapabilities>,
}

impl PoolDefinition {
    pub fn from_yaml_str(yaml: &str, path: &Path) -> Result<Self, PoolError> {
        serde_yaml::from_str(yaml).map_err(|source| PoolError::Yaml {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_file(path: &Path) -> Result<Self, PoolError> {
        let yaml = std::fs::read_to_string(path).map_err(|source| PoolError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&yaml, path)
    }

    /// Turns the definition into agent configs, resolving keys via `lookup`.
    pub fn resolve(&self, lookup: impl Fn(&str) -> Option<String>) -> Vec<AgentConfig> {
        self.agents
            .iter()
            .map(|def| AgentConfig {
                role: def.role,
                name: def.name.clone(),
                model: def
                    .model
                    .clone()
                    .or_else(|| self.defaults.model.clone())
                    .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
                credential: Credential::resolve(&def.api_key_env, &lookup),
                endpoint: def
                    .endpoint
                    .clone()
                    .or_else(|| self.defaults.endpoint.clone())
                    .unwrap_or_else(|| GROQ_ENDPOINT.to_string()),
                capabilities: def
                    .capabilities
                    .clone()
                    .or_else(|| self.defaults.capabilities.clone())
                    .unwrap_or_default(),
            })
            .collect()
    }
}

// ============================================================================
// Pool
// ============================================================================

/// Static per-role pools.
#[derive(Debug, Clone)]
pub struct AgentPool {
    pools: BTreeMap<AgentRole, Vec<AgentConfig>>,
}

impl AgentPool {
    /// Groups configs by role, keeping their order. Every role must have at
    /// least one entry and names must be unique within a role.
    pub fn new(configs: Vec<AgentConfig>) -> Result<Self, PoolError> {
        let mut pools: BTreeMap<AgentRole, Vec<AgentConfig>> = BTreeMap::new();
        for config in configs {
            let entries = pools.entry(config.role).or_default();
            if entries.iter().any(|c| c.name == config.name) {
                return Err(PoolError::DuplicateAgent {
                    role: config.role.to_string(),
                    name: config.name,
                });
            }
            entries.push(config);
        }

        for role in AgentRole::all() {
            if pools.get(&role).map_or(true, Vec::is_empty) {
                return Err(PoolError::EmptyRole(role.to_string()));
            }
        }

        Ok(Self { pools })
    }

    /// The built-in pool: one Groq entry per key in [`DEFAULT_KEY_ENV_VARS`]
    /// for every role.
    pub fn builtin(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, PoolError> {
        let mut configs = Vec::new();
        for role in AgentRole::all() {
            for (i, var) in DEFAULT_KEY_ENV_VARS.iter().enumerate() {
                configs.push(AgentConfig {
                    role,
                    name: format!("{}_Groq_{}", role.display_name(), i + 1),
                    model: DEFAULT_MODEL.to_string(),
                    credential: Credential::resolve(var, &lookup),
                    endpoint: GROQ_ENDPOINT.to_string(),
                    capabilities: ModelCapabilities::llama4_maverick(),
                });
            }
        }
        Self::new(configs)
    }

    /// Loads a YAML pool file, reading keys from the environment.
    pub fn from_file(path: &Path) -> Result<Self, PoolError> {
        let definition = PoolDefinition::from_file(path)?;
        Self::new(definition.resolve(|var| std::env::var(var).ok()))
    }

    /// Entries for a role, in rotation order.
    pub fn members(&self, role: AgentRole) -> &[AgentConfig] {
        self.pools.get(&role).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = &AgentConfig> {
        self.pools.values().flatten()
    }

    /// Total number of entries over all roles.
    pub fn len(&self) -> usize {
        self.pools.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries without a usable key.
    pub fn missing_credentials(&self) -> Vec<&AgentConfig> {
        self.iter().filter(|c| !c.credential.is_present()).collect()
    }
}

// ============================================================================
// Scheduler
// ============================================================================

/// Round-robin selection with per-agent cooldowns.
///
/// Owns the mutable run state (cooldown expiries and per-role cursors); one
/// scheduler per batch run.
#[derive(Debug)]
pub struct AgentScheduler {
    pool: AgentPool,
    cooldown: Duration,
    cooldown_until: HashMap<AgentKey, Instant>,
    cursors: HashMap<AgentRole, usize>,
}

impl AgentScheduler {
    pub fn new(pool: AgentPool, cooldown: Duration) -> Self {
        Self {
            pool,
            cooldown,
            cooldown_until: HashMap::new(),
            cursors: HashMap::new(),
        }
    }

    pub fn pool(&self) -> &AgentPool {
        &self.pool
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Index the next scan for `role` starts at.
    pub fn cursor(&self, role: AgentRole) -> usize {
        self.cursors.get(&role).copied().unwrap_or(0)
    }

    /// Next available agent for `role`.
    pub fn select(&mut self, role: AgentRole) -> Result<AgentConfig, PoolError> {
        self.select_at(role, Instant::now())
    }

    /// Scans the role's pool from its cursor, wrapping once, and returns the
    /// first entry not cooling down at `now`. The cursor moves to the slot
    /// after the returned entry.
    pub fn select_at(&mut self, role: AgentRole, now: Instant) -> Result<AgentConfig, PoolError> {
        let members = self.pool.members(role);
        if members.is_empty() {
            return Err(PoolError::EmptyRole(role.to_string()));
        }

        let start = self.cursor(role) % members.len();
        for offset in 0..members.len() {
            let idx = (start + offset) % members.len();
            let candidate = &members[idx];
            if self.is_available_at(&candidate.key(), now) {
                let selected = candidate.clone();
                self.cursors.insert(role, (idx + 1) % members.len());
                tracing::debug!(role = %role, agent = %selected.name, index = idx, "Selected agent");
                return Ok(selected);
            }
        }

        Err(PoolError::AllAgentsUnavailable {
            role: role.to_string(),
            retry_in: self.next_available_in_at(role, now),
        })
    }

    /// Excludes the agent from selection for the cooldown period.
    pub fn place_on_cooldown(&mut self, key: &AgentKey) {
        self.place_on_cooldown_at(key, Instant::now());
    }

    pub fn place_on_cooldown_at(&mut self, key: &AgentKey, now: Instant) {
        let until = now + self.cooldown;
        tracing::info!(agent = %key, cooldown_secs = self.cooldown.as_secs(), "Agent placed on cooldown");
        self.cooldown_until.insert(key.clone(), until);
    }

    pub fn is_available_at(&self, key: &AgentKey, now: Instant) -> bool {
        self.cooldown_until
            .get(key)
            .map_or(true, |until| now >= *until)
    }

    /// Time until the first agent of `role` leaves cooldown; zero if one is
    /// already available.
    pub fn next_available_in_at(&self, role: AgentRole, now: Instant) -> Duration {
        self.pool
            .members(role)
            .iter()
            .map(|c| {
                self.cooldown_until
                    .get(&c.key())
                    .map_or(Duration::ZERO, |until| until.saturating_duration_since(now))
            })
            .min()
            .unwrap_or(Duration::ZERO)
    }
}
