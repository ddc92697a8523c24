//! Configuration management
//!
//! This module handles loading, validation, and management of the Concierge
//! configuration. Configuration is stored in TOML format at
//! ~/.concierge/config.toml unless another path is given on the command line.
//!
//! # Configuration Sections
//!
//! - **core**: Log level, data directory
//! - **llm**: Completion provider settings
//! - **orchestrator**: Handler timeout and agent catalog location
//! - **reasoning**: Chained-reasoning loop bounds
//! - **parallel**: Parallel chain concurrency and timeout
//! - **memory**: Expired memory sweep interval
//! - **auth**: Static bearer credentials (optional)
//!
//! # Examples
//!
//! ```no_run
//! use concierge_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load_or_create()?;
//! println!("Default provider: {}", config.llm.default_provider);
//! println!("Database: {:?}", config.database_path());
//! # Ok(())
//! # }
//! ```

use sdk::{AccessTier, OrchestrationError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Core engine settings
    pub core: CoreConfig,

    /// Completion provider configuration
    pub llm: LLMConfig,

    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    #[serde(default)]
    pub reasoning: ReasoningConfig,

    #[serde(default)]
    pub parallel: ParallelConfig,

    #[serde(default)]
    pub memory: MemoryConfig,

    #[serde(default)]
    pub auth: AuthConfig,
}

/// Core engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Data directory path (supports ~ expansion)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

/// Completion provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMConfig {
    /// Provider tried first (ollama, openai, anthropic)
    pub default_provider: String,

    /// Token ceiling for a single completion
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Per-provider call timeout
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "ProviderConfig::ollama")]
    pub ollama: ProviderConfig,

    #[serde(default = "ProviderConfig::openai")]
    pub openai: ProviderConfig,

    #[serde(default = "ProviderConfig::anthropic")]
    pub anthropic: ProviderConfig,
}

/// Settings shared by every completion provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub base_url: String,

    pub model: String,

    /// Environment variable holding the API key. Keys never live in the
    /// config file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
}

impl ProviderConfig {
    fn ollama() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "llama3.1:8b".to_string(),
            api_key_env: None,
        }
    }

    fn openai() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: Some("OPENAI_API_KEY".to_string()),
        }
    }

    fn anthropic() -> Self {
        Self {
            base_url: "https://api.anthropic.com/v1".to_string(),
            model: "claude-3-5-sonnet-20241022".to_string(),
            api_key_env: Some("ANTHROPIC_API_KEY".to_string()),
        }
    }

    /// Read the API key from the configured environment variable
    pub fn api_key(&self) -> Option<String> {
        self.api_key_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|key| !key.is_empty())
    }
}

/// Dispatcher settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Upper bound on a single handler invocation
    #[serde(default = "default_handler_timeout")]
    pub handler_timeout_secs: u64,

    /// Agent catalog file; the built-in catalog is used when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog: Option<PathBuf>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            handler_timeout_secs: default_handler_timeout(),
            catalog: None,
        }
    }
}

/// Chained-reasoning loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningConfig {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// A reflection verdict must exceed this to stop the loop
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            confidence_threshold: default_confidence_threshold(),
            max_tokens: default_max_tokens(),
        }
    }
}

/// Parallel chain coordinator settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParallelConfig {
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Per-chain timeout in milliseconds
    #[serde(default = "default_parallel_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            timeout_ms: default_parallel_timeout_ms(),
        }
    }
}

/// Memory store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

/// Static bearer credentials
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub tokens: Vec<TokenConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    pub token: String,
    pub user_id: String,
    pub tier: AccessTier,
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("~/.concierge")
}

fn default_max_tokens() -> u32 {
    2048
}

fn default_llm_timeout() -> u64 {
    30
}

fn default_handler_timeout() -> u64 {
    120
}

fn default_max_iterations() -> u32 {
    3
}

fn default_confidence_threshold() -> f64 {
    0.8
}

fn default_max_concurrency() -> usize {
    3
}

fn default_parallel_timeout_ms() -> u64 {
    60_000
}

fn default_sweep_interval() -> u64 {
    300
}

impl Config {
    /// Load configuration from the default location (~/.concierge/config.toml)
    ///
    /// If the configuration file doesn't exist, creates a default configuration.
    pub fn load_or_create() -> Result<Self, OrchestrationError> {
        let config_path = Self::default_config_path()?;
        Self::load_or_create_at(&config_path)
    }

    /// Load configuration from `path`, writing defaults there if it is missing
    pub fn load_or_create_at(path: &Path) -> Result<Self, OrchestrationError> {
        if path.exists() {
            Self::load_from_path(path)
        } else {
            Self::create_default(path)
        }
    }

    /// Load configuration from a specific path
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    pub fn load_from_path(path: &Path) -> Result<Self, OrchestrationError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| OrchestrationError::Config(format!("Failed to read config file: {}", e)))?;

        let mut config: Config = toml::from_str(&contents)
            .map_err(|e| OrchestrationError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate_and_process()?;

        Ok(config)
    }

    /// Create default configuration and save to path
    fn create_default(path: &Path) -> Result<Self, OrchestrationError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                OrchestrationError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let config = Self::default_config();

        // Written before path expansion so the file keeps the portable ~ form
        let toml_string = toml::to_string_pretty(&config).map_err(|e| {
            OrchestrationError::Config(format!("Failed to serialize config: {}", e))
        })?;
        fs::write(path, toml_string)
            .map_err(|e| OrchestrationError::Config(format!("Failed to write config file: {}", e)))?;

        let mut config = config;
        config.validate_and_process()?;
        Ok(config)
    }

    /// Get the default configuration file path (~/.concierge/config.toml)
    fn default_config_path() -> Result<PathBuf, OrchestrationError> {
        let home = dirs::home_dir().ok_or_else(|| {
            OrchestrationError::Config("Could not determine home directory".to_string())
        })?;

        Ok(home.join(".concierge").join("config.toml"))
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self {
            core: CoreConfig {
                log_level: default_log_level(),
                data_dir: default_data_dir(),
            },
            llm: LLMConfig {
                default_provider: "ollama".to_string(),
                max_tokens: default_max_tokens(),
                timeout_secs: default_llm_timeout(),
                ollama: ProviderConfig::ollama(),
                openai: ProviderConfig::openai(),
                anthropic: ProviderConfig::anthropic(),
            },
            orchestrator: OrchestratorConfig::default(),
            reasoning: ReasoningConfig::default(),
            parallel: ParallelConfig::default(),
            memory: MemoryConfig::default(),
            auth: AuthConfig::default(),
        }
    }

    /// Location of the SQLite database
    pub fn database_path(&self) -> PathBuf {
        self.core.data_dir.join("concierge.db")
    }

    pub fn handler_timeout(&self) -> Duration {
        Duration::from_secs(self.orchestrator.handler_timeout_secs)
    }

    pub fn memory_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.memory.sweep_interval_secs)
    }

    /// Validate and process configuration
    ///
    /// Checks value ranges and expands ~ in paths. The data directory is
    /// created if it doesn't exist.
    pub fn validate_and_process(&mut self) -> Result<(), OrchestrationError> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.core.log_level.as_str()) {
            return Err(OrchestrationError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                valid_log_levels.join(", ")
            )));
        }

        let valid_providers = ["ollama", "openai", "anthropic"];
        if !valid_providers.contains(&self.llm.default_provider.as_str()) {
            return Err(OrchestrationError::Config(format!(
                "Invalid default provider '{}'. Must be one of: {}",
                self.llm.default_provider,
                valid_providers.join(", ")
            )));
        }

        if !(0.0..=1.0).contains(&self.reasoning.confidence_threshold) {
            return Err(OrchestrationError::Config(
                "confidence_threshold must be between 0.0 and 1.0".to_string(),
            ));
        }
        if self.reasoning.max_iterations == 0 {
            return Err(OrchestrationError::Config(
                "max_iterations must be at least 1".to_string(),
            ));
        }
        if self.parallel.max_concurrency == 0 {
            return Err(OrchestrationError::Config(
                "max_concurrency must be at least 1".to_string(),
            ));
        }
        if self.parallel.timeout_ms == 0
            || self.orchestrator.handler_timeout_secs == 0
            || self.llm.timeout_secs == 0
        {
            return Err(OrchestrationError::Config(
                "timeouts must be greater than zero".to_string(),
            ));
        }

        if self.memory.sweep_interval_secs == 0 {
            return Err(OrchestrationError::Config(
                "sweep_interval_secs must be at least 1".to_string(),
            ));
        }

        for entry in &self.auth.tokens {
            if entry.token.is_empty() || entry.user_id.is_empty() {
                return Err(OrchestrationError::Config(
                    "auth tokens need a non-empty token and user_id".to_string(),
                ));
            }
        }

        self.core.data_dir = expand_path(&self.core.data_dir)?;
        if !self.core.data_dir.exists() {
            fs::create_dir_all(&self.core.data_dir).map_err(|e| {
                OrchestrationError::Config(format!("Failed to create data directory: {}", e))
            })?;
        }

        if let Some(catalog) = &self.orchestrator.catalog {
            self.orchestrator.catalog = Some(expand_path(catalog)?);
        }

        Ok(())
    }
}

/// Expand ~ in path to user's home directory
fn expand_path(path: &Path) -> Result<PathBuf, OrchestrationError> {
    let path_str = path
        .to_str()
        .ok_or_else(|| OrchestrationError::Config("Invalid UTF-8 in path".to_string()))?;

    if let Some(rest) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir().ok_or_else(|| {
            OrchestrationError::Config("Could not determine home directory".to_string())
        })?;

        Ok(home.join(rest))
    } else if path_str == "~" {
        dirs::home_dir().ok_or_else(|| {
            OrchestrationError::Config("Could not determine home directory".to_string())
        })
    } else {
        Ok(path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_creation() {
        let config = Config::default_config();

        assert_eq!(config.core.log_level, "info");
        assert_eq!(config.llm.default_provider, "ollama");
        assert_eq!(config.reasoning.max_iterations, 3);
        assert_eq!(config.reasoning.confidence_threshold, 0.8);
        assert_eq!(config.parallel.max_concurrency, 3);
        assert_eq!(config.parallel.timeout_ms, 60_000);
        assert!(config.auth.tokens.is_empty());
    }

    #[test]
    fn test_expand_path_with_tilde() {
        let path = PathBuf::from("~/test");
        let expanded = expand_path(&path).unwrap();

        let home = dirs::home_dir().unwrap();
        assert_eq!(expanded, home.join("test"));
    }

    #[test]
    fn test_expand_path_without_tilde() {
        let path = PathBuf::from("/absolute/path");
        let expanded = expand_path(&path).unwrap();

        assert_eq!(expanded, path);
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default_config();
        let toml_string = toml::to_string(&config).unwrap();

        let parsed: Config = toml::from_str(&toml_string).unwrap();
        assert_eq!(parsed.llm.default_provider, config.llm.default_provider);
        assert_eq!(parsed.llm.openai.api_key_env.as_deref(), Some("OPENAI_API_KEY"));
    }

    #[test]
    fn test_rejects_threshold_out_of_range() {
        let mut config = Config::default_config();
        config.core.data_dir = std::env::temp_dir();
        config.reasoning.confidence_threshold = 1.5;

        let err = config.validate_and_process().unwrap_err();
        assert!(err.to_string().contains("confidence_threshold"));
    }

    #[test]
    fn test_rejects_zero_concurrency() {
        let mut config = Config::default_config();
        config.core.data_dir = std::env::temp_dir();
        config.parallel.max_concurrency = 0;

        assert!(config.validate_and_process().is_err());
    }

    #[test]
    fn test_minimal_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [core]
            [llm]
            default_provider = "anthropic"
            "#,
        )
        .unwrap();

        assert_eq!(config.core.log_level, "info");
        assert_eq!(config.orchestrator.handler_timeout_secs, 120);
        assert_eq!(config.llm.anthropic.model, "claude-3-5-sonnet-20241022");
        assert_eq!(config.memory.sweep_interval_secs, 300);
    }
}
