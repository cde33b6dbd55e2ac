use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, TenderError};
use crate::types::{
    default_include_metadata, default_max_results, default_relevance_threshold,
    default_search_scope, QueryContext,
};

/// Top-level Tenderflow configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Model used for structured query analysis.
    #[serde(default = "default_analysis_model")]
    pub analysis_model: ModelConfig,
    /// Model used for query enhancement and Cypher generation.
    #[serde(default = "default_generation_model")]
    pub generation_model: ModelConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub log: LogConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            analysis_model: default_analysis_model(),
            generation_model: default_generation_model(),
            pipeline: PipelineConfig::default(),
            cache: CacheConfig::default(),
            log: LogConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_uri")]
    pub uri: String,
    #[serde(default = "default_db_username")]
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_db_name")]
    pub database: String,
    #[serde(default = "default_connection_lifetime")]
    pub max_connection_lifetime_secs: u64,
    #[serde(default = "default_pool_size")]
    pub max_connection_pool_size: usize,
    #[serde(default = "default_acquisition_timeout")]
    pub connection_acquisition_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            uri: default_db_uri(),
            username: default_db_username(),
            password: None,
            database: default_db_name(),
            max_connection_lifetime_secs: default_connection_lifetime(),
            max_connection_pool_size: default_pool_size(),
            connection_acquisition_timeout_secs: default_acquisition_timeout(),
        }
    }
}

fn default_db_uri() -> String { "http://localhost:7474".to_string() }
fn default_db_username() -> String { "neo4j".to_string() }
fn default_db_name() -> String { "neo4j".to_string() }
fn default_connection_lifetime() -> u64 { 300 }
fn default_pool_size() -> usize { 50 }
fn default_acquisition_timeout() -> u64 { 60 }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    pub model_id: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        default_generation_model()
    }
}

fn default_provider() -> String { "anthropic".to_string() }
fn default_max_tokens() -> u32 { 4096 }
fn default_temperature() -> f32 { 0.0 }

fn default_analysis_model() -> ModelConfig {
    ModelConfig {
        provider: "openai".to_string(),
        model_id: "chatgpt-4o-latest".to_string(),
        api_key: None,
        base_url: None,
        max_tokens: default_max_tokens(),
        temperature: default_temperature(),
    }
}

fn default_generation_model() -> ModelConfig {
    ModelConfig {
        provider: default_provider(),
        model_id: "claude-3-5-sonnet-latest".to_string(),
        api_key: None,
        base_url: None,
        max_tokens: default_max_tokens(),
        temperature: default_temperature(),
    }
}

/// How re-entries after stage failures are budgeted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryBudget {
    /// Each stage owns its own counter.
    #[default]
    PerStage,
    /// One counter for the whole run, acting as a global circuit breaker.
    Shared,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_search_scope")]
    pub default_search_scope: Vec<String>,
    #[serde(default = "default_relevance_threshold")]
    pub default_relevance_threshold: f64,
    #[serde(default = "default_max_results")]
    pub default_max_results: usize,
    #[serde(default = "default_include_metadata")]
    pub default_include_metadata: bool,
    /// Attempts allowed per stage (or per run with a shared budget).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Backoff multiplier in seconds.
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: f64,
    #[serde(default = "default_max_retry_delay")]
    pub max_retry_delay_secs: f64,
    #[serde(default)]
    pub retry_jitter: bool,
    #[serde(default = "default_stage_timeout")]
    pub stage_timeout_secs: u64,
    #[serde(default)]
    pub retry_budget: RetryBudget,
    #[serde(default = "default_performance_monitoring")]
    pub enable_performance_monitoring: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            default_search_scope: default_search_scope(),
            default_relevance_threshold: default_relevance_threshold(),
            default_max_results: default_max_results(),
            default_include_metadata: default_include_metadata(),
            max_retries: default_max_retries(),
            retry_delay_secs: default_retry_delay(),
            max_retry_delay_secs: default_max_retry_delay(),
            retry_jitter: false,
            stage_timeout_secs: default_stage_timeout(),
            retry_budget: RetryBudget::default(),
            enable_performance_monitoring: default_performance_monitoring(),
        }
    }
}

fn default_max_retries() -> u32 { 3 }
fn default_retry_delay() -> f64 { 1.0 }
fn default_max_retry_delay() -> f64 { 30.0 }
fn default_stage_timeout() -> u64 { 120 }
fn default_performance_monitoring() -> bool { true }

impl PipelineConfig {
    /// Reject values the retry policy and default context cannot represent.
    pub fn validate(&self) -> Result<()> {
        self.default_context()
            .map_err(|e| TenderError::Config(format!("pipeline defaults: {}", e)))?;
        if self.max_retries == 0 {
            return Err(TenderError::Config("pipeline.max_retries must be positive".into()));
        }
        if !(self.retry_delay_secs.is_finite() && self.retry_delay_secs > 0.0) {
            return Err(TenderError::Config(
                "pipeline.retry_delay_secs must be a positive number".into(),
            ));
        }
        if !(self.max_retry_delay_secs.is_finite()
            && self.max_retry_delay_secs >= self.retry_delay_secs)
        {
            return Err(TenderError::Config(
                "pipeline.max_retry_delay_secs must be at least retry_delay_secs".into(),
            ));
        }
        if self.stage_timeout_secs == 0 {
            return Err(TenderError::Config(
                "pipeline.stage_timeout_secs must be positive".into(),
            ));
        }
        Ok(())
    }

    /// The context used when a caller does not supply one.
    pub fn default_context(&self) -> Result<QueryContext> {
        QueryContext::new(
            self.default_search_scope.clone(),
            self.default_relevance_threshold,
            self.default_max_results,
            self.default_include_metadata,
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_cache_path")]
    pub path: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: default_cache_path(),
        }
    }
}

fn default_cache_path() -> String { ".tenderflow/cache.db".to_string() }

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Filter directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
    /// Append log output to this file instead of stdout.
    #[serde(default)]
    pub file: Option<String>,
    /// Directory for per-run JSONL event logs.
    #[serde(default)]
    pub run_log_dir: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            file: None,
            run_log_dir: None,
        }
    }
}

fn default_log_level() -> String { "info".to_string() }

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| TenderError::ConfigNotFound(path.display().to_string()))?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate a TOML document, expanding `${ENV_VAR}` references.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let expanded = expand_env_vars(content);
        let config: AppConfig =
            toml::from_str(&expanded).map_err(|e| TenderError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.pipeline.validate()?;
        if self.database.max_connection_pool_size == 0 {
            return Err(TenderError::Config(
                "database.max_connection_pool_size must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Resolve the cache database path (expand ~).
    pub fn cache_path(&self) -> PathBuf {
        expand_home(&self.cache.path)
    }
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(path)
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                Err(_) => {
                    // Keep original if env var not set
                    result.push_str(&format!("${{{}}}", var_name));
                }
            }
        } else {
            result.push(c);
        }
    }
    result
}
