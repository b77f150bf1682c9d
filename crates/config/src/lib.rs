//! Configuration for Convoy.
//!
//! Settings come from `~/.convoy/config.toml`, then environment overrides.
//! Every field has a default, so an absent or partial file is fine. The
//! result is validated once at startup and not mutated afterwards.
//!
//! ```toml
//! default_provider = "groq"
//!
//! [orchestrator]
//! parallel_agents = 4
//! task_timeout_secs = 300
//!
//! [providers.groq]
//! api_key = "gsk-..."
//! default_model = "llama-3.3-70b-versatile"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_DIR: &str = ".convoy";
const CONFIG_FILE: &str = "config.toml";

/// Global API key variables, in lookup order.
const API_KEY_VARS: &[&str] = &["CONVOY_API_KEY", "OPENROUTER_API_KEY", "OPENAI_API_KEY"];

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Fallback key for providers without their own `api_key`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    pub default_provider: String,

    /// Model for `default_provider`. Unset means the backend's built-in
    /// default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,

    pub default_temperature: f32,

    /// Completion length cap. Unset lets the model decide.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    pub orchestrator: OrchestratorConfig,
    pub agent: AgentConfig,
    pub providers: HashMap<String, ProviderConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: "openrouter".into(),
            default_model: None,
            default_temperature: 0.7,
            max_tokens: None,
            orchestrator: OrchestratorConfig::default(),
            agent: AgentConfig::default(),
            providers: HashMap::new(),
        }
    }
}

/// Debug output for anything that may hold a secret.
fn redacted(secret: &Option<String>) -> &'static str {
    if secret.is_some() { "[REDACTED]" } else { "None" }
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redacted(&self.api_key))
            .field("default_provider", &self.default_provider)
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("max_tokens", &self.max_tokens)
            .field("orchestrator", &self.orchestrator)
            .field("agent", &self.agent)
            .field("providers", &self.providers)
            .finish()
    }
}

/// How agent outcomes are combined into the final artifact.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationStrategy {
    /// Merge every usable artifact through one synthesis call.
    #[default]
    Consensus,
}

impl fmt::Display for AggregationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Consensus => f.write_str("consensus"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Agents (and task descriptions) per request.
    pub parallel_agents: usize,

    /// Cap on simultaneously running agents. Unset means `parallel_agents`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_concurrency: Option<usize>,

    /// Wall-clock budget per agent, counted from when it gets a slot.
    pub task_timeout_secs: u64,

    pub aggregation_strategy: AggregationStrategy,

    /// Placeholders: `{user_input}`, `{num_agents}`.
    pub question_generation_prompt: String,

    /// Placeholders: `{user_input}`, `{num_responses}`, `{agent_responses}`.
    pub synthesis_prompt: String,
}

const QUESTION_GENERATION_PROMPT: &str = "\
You are an orchestrator that needs to create {num_agents} different questions to thoroughly \
analyze this request from multiple angles.\n\n\
Original user request: {user_input}\n\n\
Generate exactly {num_agents} different, specific questions that will help gather comprehensive \
information. Each question should approach the request from a different angle (research, \
analysis, verification, alternatives, etc.).\n\n\
Return exactly {num_agents} questions as a JSON array of strings, like this:\n\
[\"question 1\", \"question 2\"]\n\n\
Only return the JSON array, nothing else.";

const SYNTHESIS_PROMPT: &str = "\
You have {num_responses} different AI agents that worked on the same request from different \
perspectives. Synthesize their responses into ONE comprehensive final answer.\n\n\
Original user request: {user_input}\n\n\
Here are all the agent responses:\n\n{agent_responses}\n\
Combine the best information from all agents. Do NOT call any tools and do NOT mention that \
you are synthesizing multiple responses. Provide the final answer directly.";

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            parallel_agents: 4,
            max_concurrency: None,
            task_timeout_secs: 300,
            aggregation_strategy: AggregationStrategy::default(),
            question_generation_prompt: QUESTION_GENERATION_PROMPT.into(),
            synthesis_prompt: SYNTHESIS_PROMPT.into(),
        }
    }
}

impl OrchestratorConfig {
    /// How many agents may run at once.
    pub fn concurrency(&self) -> usize {
        self.max_concurrency.unwrap_or(self.parallel_agents)
    }

    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Reasoning steps allowed before the agent gives up.
    pub max_iterations: usize,

    /// Consecutive replies without tool calls after which the agent's drafts
    /// are taken as its answer.
    pub finalize_after_no_tool_streak: usize,

    pub system_prompt: String,
}

const SYSTEM_PROMPT: &str = "\
You are a helpful research assistant. Work on the task you are given step by step. \
Use the available tools when they help you gather information or compute results. \
When you have gathered enough information and written your answer, call the \
mark_task_complete tool with a short summary.";

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            finalize_after_no_tool_streak: 2,
            system_prompt: SYSTEM_PROMPT.into(),
        }
    }
}

/// Per-backend overrides under `[providers.<name>]`.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL, for endpoints that are not built in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redacted(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .finish()
    }
}

impl AppConfig {
    /// Reads `~/.convoy/config.toml` and applies environment overrides:
    /// `CONVOY_API_KEY`, `OPENROUTER_API_KEY` or `OPENAI_API_KEY` when no key
    /// is configured, plus `CONVOY_PROVIDER` and `CONVOY_MODEL`.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::load_from(&Self::config_path())?;
        config.apply_env(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Reads one file. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let config: Self = toml::from_str(&text).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        config.validate()?;
        tracing::debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if self.api_key.is_none() {
            self.api_key = API_KEY_VARS.iter().find_map(|&name| var(name));
        }
        if let Some(provider) = var("CONVOY_PROVIDER") {
            self.default_provider = provider;
        }
        if let Some(model) = var("CONVOY_MODEL") {
            self.default_model = Some(model);
        }
    }

    pub fn config_dir() -> PathBuf {
        home_dir().join(CONFIG_DIR)
    }

    pub fn config_path() -> PathBuf {
        Self::config_dir().join(CONFIG_FILE)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let orchestrator = &self.orchestrator;
        let checks = [
            (
                (0.0..=2.0).contains(&self.default_temperature),
                "default_temperature must be between 0.0 and 2.0",
            ),
            (
                orchestrator.parallel_agents >= 1,
                "orchestrator.parallel_agents must be at least 1",
            ),
            (
                orchestrator.max_concurrency != Some(0),
                "orchestrator.max_concurrency must be at least 1",
            ),
            (
                orchestrator.task_timeout_secs >= 1,
                "orchestrator.task_timeout_secs must be at least 1",
            ),
            (
                self.agent.max_iterations >= 1,
                "agent.max_iterations must be at least 1",
            ),
            (
                self.agent.finalize_after_no_tool_streak >= 1,
                "agent.finalize_after_no_tool_streak must be at least 1",
            ),
        ];

        match checks.into_iter().find(|(ok, _)| !ok) {
            Some((_, problem)) => Err(ConfigError::Invalid(problem.into())),
            None => Ok(()),
        }
    }

    /// Per-provider key, else the global one.
    pub fn api_key_for(&self, provider: &str) -> Option<String> {
        self.providers
            .get(provider)
            .and_then(|p| p.api_key.clone())
            .or_else(|| self.api_key.clone())
    }

    /// Model to request from `provider`.
    ///
    /// Resolution order: `[providers.<name>] default_model`, then the
    /// top-level `default_model` when `provider` is the configured default,
    /// then `builtin_default`. The top-level model is a last resort for
    /// endpoints with no built-in default.
    pub fn model_for(&self, provider: &str, builtin_default: Option<&str>) -> Option<String> {
        let configured = self.providers.get(provider).and_then(|p| p.default_model.clone());
        let global = self.default_model.as_ref();
        configured
            .or_else(|| global.filter(|_| provider == self.default_provider).cloned())
            .or_else(|| builtin_default.map(str::to_string))
            .or_else(|| global.cloned())
    }

    /// The file `convoy config init` writes.
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir)
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    Read { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
