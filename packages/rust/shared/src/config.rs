//! Application configuration for postcheck.
//!
//! User config lives at `~/.postcheck/postcheck.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PostcheckError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "postcheck.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".postcheck";

// ---------------------------------------------------------------------------
// Config structs (matching postcheck.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP listener settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Analysis pipeline budgets and limits.
    #[serde(default)]
    pub pipeline: PipelineSection,

    /// Web search provider settings.
    #[serde(default)]
    pub search: SearchConfig,

    /// Language model provider settings.
    #[serde(default)]
    pub llm: LlmConfig,

    /// CMS proxy settings.
    #[serde(default)]
    pub cms: CmsConfig,
}

/// `[server]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Interface to bind.
    #[serde(default = "default_host")]
    pub host: String,

    /// Listening port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Allowed CORS origins. `*` allows any origin.
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: default_cors_origins(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    3001
}
fn default_cors_origins() -> Vec<String> {
    vec!["*".into()]
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSection {
    /// Wall-clock budget for one analysis, in seconds.
    #[serde(default = "default_budget_secs")]
    pub budget_secs: u64,

    /// Per-call timeout for search requests, in seconds.
    #[serde(default = "default_search_timeout_secs")]
    pub search_timeout_secs: u64,

    /// Pause between successive search requests, in milliseconds.
    #[serde(default = "default_search_delay_ms")]
    pub search_delay_ms: u64,

    /// Pause between successive chunk rewrites, in milliseconds.
    #[serde(default = "default_chunk_delay_ms")]
    pub chunk_delay_ms: u64,

    /// Content above this many bytes is rewritten chunk by chunk, in chunks of
    /// at most this size.
    #[serde(default = "default_rewrite_threshold")]
    pub rewrite_threshold: usize,

    /// Digest bytes included with each chunk rewrite.
    #[serde(default = "default_digest_limit")]
    pub digest_limit: usize,

    /// Content bytes shown to the query planner.
    #[serde(default = "default_planner_sample")]
    pub planner_sample: usize,

    /// Upper bound on planned search queries.
    #[serde(default = "default_max_queries")]
    pub max_queries: usize,

    /// Search hits kept per query.
    #[serde(default = "default_results_per_query")]
    pub results_per_query: usize,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            budget_secs: default_budget_secs(),
            search_timeout_secs: default_search_timeout_secs(),
            search_delay_ms: default_search_delay_ms(),
            chunk_delay_ms: default_chunk_delay_ms(),
            rewrite_threshold: default_rewrite_threshold(),
            digest_limit: default_digest_limit(),
            planner_sample: default_planner_sample(),
            max_queries: default_max_queries(),
            results_per_query: default_results_per_query(),
        }
    }
}

fn default_budget_secs() -> u64 {
    240
}
fn default_search_timeout_secs() -> u64 {
    10
}
fn default_search_delay_ms() -> u64 {
    500
}
fn default_chunk_delay_ms() -> u64 {
    500
}
fn default_rewrite_threshold() -> usize {
    20_000
}
fn default_digest_limit() -> usize {
    8_000
}
fn default_planner_sample() -> usize {
    4_000
}
fn default_max_queries() -> usize {
    8
}
fn default_results_per_query() -> usize {
    3
}

/// `[search]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Web search endpoint.
    #[serde(default = "default_search_endpoint")]
    pub endpoint: String,

    /// Env var read by `postcheck analyze` for the search key.
    #[serde(default = "default_search_key_env")]
    pub api_key_env: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            endpoint: default_search_endpoint(),
            api_key_env: default_search_key_env(),
        }
    }
}

fn default_search_endpoint() -> String {
    "https://api.search.brave.com/res/v1/web/search".into()
}
fn default_search_key_env() -> String {
    "BRAVE_API_KEY".into()
}

/// `[llm]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Messages endpoint.
    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,

    /// Model identifier sent with every request.
    #[serde(default = "default_model")]
    pub model: String,

    /// Protocol version header value.
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Token budget for rewrite calls.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Token budget for query planning calls.
    #[serde(default = "default_planner_max_tokens")]
    pub planner_max_tokens: u32,

    /// Per-call timeout, in seconds.
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,

    /// Env var read by `postcheck analyze` for the model key.
    #[serde(default = "default_llm_key_env")]
    pub api_key_env: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: default_llm_endpoint(),
            model: default_model(),
            api_version: default_api_version(),
            max_tokens: default_max_tokens(),
            planner_max_tokens: default_planner_max_tokens(),
            timeout_secs: default_llm_timeout_secs(),
            api_key_env: default_llm_key_env(),
        }
    }
}

fn default_llm_endpoint() -> String {
    "https://api.anthropic.com/v1/messages".into()
}
fn default_model() -> String {
    "claude-sonnet-4-20250514".into()
}
fn default_api_version() -> String {
    "2023-06-01".into()
}
fn default_max_tokens() -> u32 {
    16_000
}
fn default_planner_max_tokens() -> u32 {
    1_024
}
fn default_llm_timeout_secs() -> u64 {
    180
}
fn default_llm_key_env() -> String {
    "ANTHROPIC_API_KEY".into()
}

/// `[cms]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CmsConfig {
    /// Base URL of the CMS data API.
    #[serde(default = "default_cms_endpoint")]
    pub endpoint: String,

    /// Per-call timeout, in seconds.
    #[serde(default = "default_cms_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for CmsConfig {
    fn default() -> Self {
        Self {
            endpoint: default_cms_endpoint(),
            timeout_secs: default_cms_timeout_secs(),
        }
    }
}

fn default_cms_endpoint() -> String {
    "https://api.webflow.com/v2".into()
}
fn default_cms_timeout_secs() -> u64 {
    30
}

// ---------------------------------------------------------------------------
// Pipeline config (runtime, derived from the config file)
// ---------------------------------------------------------------------------

/// Runtime pipeline configuration with durations resolved.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Global wall-clock budget per analysis.
    pub budget: Duration,
    /// Pause between successive searches.
    pub search_delay: Duration,
    /// Pause between successive chunk rewrites.
    pub chunk_delay: Duration,
    /// Single-pass rewrite limit in bytes, also the maximum chunk size.
    pub rewrite_threshold: usize,
    /// Digest bytes sent with each chunk.
    pub digest_limit: usize,
    /// Content bytes sent to the planner.
    pub planner_sample: usize,
    /// Upper bound on planned queries.
    pub max_queries: usize,
    /// Hits kept per search.
    pub results_per_query: usize,
    /// Token budget for rewrite calls.
    pub rewrite_max_tokens: u32,
    /// Token budget for the planner call.
    pub planner_max_tokens: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for PipelineConfig {
    fn from(config: &AppConfig) -> Self {
        let p = &config.pipeline;
        Self {
            budget: Duration::from_secs(p.budget_secs),
            search_delay: Duration::from_millis(p.search_delay_ms),
            chunk_delay: Duration::from_millis(p.chunk_delay_ms),
            rewrite_threshold: p.rewrite_threshold,
            digest_limit: p.digest_limit,
            planner_sample: p.planner_sample,
            max_queries: p.max_queries.clamp(1, 8),
            results_per_query: p.results_per_query.max(1),
            rewrite_max_tokens: config.llm.max_tokens,
            planner_max_tokens: config.llm.planner_max_tokens,
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.postcheck/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| PostcheckError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.postcheck/postcheck.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| PostcheckError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        PostcheckError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| PostcheckError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| PostcheckError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| PostcheckError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read an API key from the named env var, failing if it is unset or empty.
pub fn api_key_from_env(var_name: &str) -> Result<String> {
    match std::env::var(var_name) {
        Ok(val) if !val.trim().is_empty() => Ok(val),
        _ => Err(PostcheckError::config(format!(
            "API key not found. Set the {var_name} environment variable."
        ))),
    }
}
