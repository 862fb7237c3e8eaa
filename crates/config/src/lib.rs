//! Configuration loading, validation, and management for workagent.
//!
//! Loads configuration from `~/.workagent/config.toml` with `.env` and
//! environment variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Value shipped in `.env.example`; never a real key.
pub const PLACEHOLDER_API_KEY: &str = "sk-your-api-key-here";

/// The root configuration structure.
///
/// Maps directly to `~/.workagent/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the model endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Model transport ("openai" is the only built-in one)
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Base URL of an OpenAI-compatible endpoint
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model name
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Max tokens per model response
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Instructions placed at the head of every transcript
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// OpenWeatherMap key; without one the weather tool runs offline
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weather_api_key: Option<String>,

    #[serde(default = "default_weather_base_url")]
    pub weather_base_url: String,

    /// Deadline for one weather API request
    #[serde(default = "default_weather_timeout_secs")]
    pub weather_timeout_secs: u64,

    /// Orchestration loop settings
    #[serde(default)]
    pub agent: AgentSettings,

    /// HTTP API server settings
    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_provider() -> String {
    "openai".into()
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_weather_base_url() -> String {
    "https://api.openweathermap.org/data/2.5".into()
}
fn default_weather_timeout_secs() -> u64 {
    30
}
fn default_model() -> String {
    "gpt-4o".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_system_prompt() -> String {
    "You are a helpful assistant. Use the available tools when they help answer \
     the user's request, and answer directly when they do not."
        .into()
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("provider", &self.provider)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("system_prompt", &self.system_prompt)
            .field("weather_api_key", &redact(&self.weather_api_key))
            .field("weather_base_url", &self.weather_base_url)
            .field("weather_timeout_secs", &self.weather_timeout_secs)
            .field("agent", &self.agent)
            .field("server", &self.server)
            .field("logging", &self.logging)
            .finish()
    }
}

/// How the tool calls of one round are executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolConcurrency {
    #[default]
    Parallel,
    Serial,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    /// Maximum tool-execution rounds per run
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,

    /// Deadline for a single tool call
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,

    /// Deadline for a single model call
    #[serde(default = "default_model_timeout_secs")]
    pub model_timeout_secs: u64,

    /// Upper bound on in-flight tool calls within one round
    #[serde(default = "default_max_concurrent_tools")]
    pub max_concurrent_tools: usize,

    #[serde(default)]
    pub tool_concurrency: ToolConcurrency,

    /// Request streamed model responses
    #[serde(default)]
    pub streaming: bool,

    /// Total attempts per model call (1 = no retry)
    #[serde(default = "default_model_max_attempts")]
    pub model_max_attempts: u32,
}

fn default_max_rounds() -> u32 {
    10
}
fn default_tool_timeout_secs() -> u64 {
    30
}
fn default_model_timeout_secs() -> u64 {
    120
}
fn default_max_concurrent_tools() -> usize {
    4
}
fn default_model_max_attempts() -> u32 {
    2
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
            tool_timeout_secs: default_tool_timeout_secs(),
            model_timeout_secs: default_model_timeout_secs(),
            max_concurrent_tools: default_max_concurrent_tools(),
            tool_concurrency: ToolConcurrency::default(),
            streaming: false,
            model_max_attempts: default_model_max_attempts(),
        }
    }
}

impl AgentSettings {
    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }

    pub fn model_timeout(&self) -> Duration {
        Duration::from_secs(self.model_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_server_host")]
    pub host: String,

    #[serde(default = "default_server_port")]
    pub port: u16,
}

fn default_server_host() -> String {
    "127.0.0.1".into()
}
fn default_server_port() -> u16 {
    8080
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive (`RUST_LOG` wins when set)
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.workagent/config.toml).
    ///
    /// A `.env` file in the working directory is read first. Then:
    /// - `WORKAGENT_API_KEY` (highest priority), then `OPENAI_API_KEY`
    /// - `WORKAGENT_BASE_URL`, `WORKAGENT_MODEL`, `WORKAGENT_LOG_LEVEL`
    /// - `WORKAGENT_WEATHER_API_KEY`, then `OPENWEATHER_API_KEY`
    /// - `WORKAGENT_WEATHER_BASE_URL`
    pub fn load() -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(path) => tracing::debug!("Loaded environment from {}", path.display()),
            Err(e) if e.not_found() => {}
            Err(e) => {
                return Err(ConfigError::ReadError {
                    path: PathBuf::from(".env"),
                    reason: e.to_string(),
                });
            }
        }

        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = non_empty("WORKAGENT_API_KEY").or_else(|| non_empty("OPENAI_API_KEY")) {
            self.api_key = Some(key);
        }
        if let Some(url) = non_empty("WORKAGENT_BASE_URL") {
            self.base_url = url;
        }
        if let Some(model) = non_empty("WORKAGENT_MODEL") {
            self.model = model;
        }
        if let Some(level) = non_empty("WORKAGENT_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(key) =
            non_empty("WORKAGENT_WEATHER_API_KEY").or_else(|| non_empty("OPENWEATHER_API_KEY"))
        {
            self.weather_api_key = Some(key);
        }
        if let Some(url) = non_empty("WORKAGENT_WEATHER_BASE_URL") {
            self.weather_base_url = url;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".workagent")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::ValidationError(
                "temperature must be between 0.0 and 2.0".into(),
            ));
        }
        if self.agent.max_rounds == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_rounds must be at least 1".into(),
            ));
        }
        if self.agent.max_concurrent_tools == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_concurrent_tools must be at least 1".into(),
            ));
        }
        if self.agent.tool_timeout_secs == 0 || self.agent.model_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "agent timeouts must be greater than 0".into(),
            ));
        }
        if self.agent.model_max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "agent.model_max_attempts must be at least 1".into(),
            ));
        }
        if self.weather_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "weather_timeout_secs must be greater than 0".into(),
            ));
        }
        if self.api_key.as_deref() == Some(PLACEHOLDER_API_KEY) {
            return Err(ConfigError::ValidationError(
                "api_key is still the placeholder value; set a real key in .env or the environment"
                    .into(),
            ));
        }
        Ok(())
    }

    /// The API key, or an error naming where to set it.
    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or(ConfigError::MissingApiKey)
    }

    /// The weather API key, if a non-blank one is configured.
    pub fn weather_api_key(&self) -> Option<&str> {
        self.weather_api_key.as_deref().filter(|k| !k.trim().is_empty())
    }

    pub fn weather_timeout(&self) -> Duration {
        Duration::from_secs(self.weather_timeout_secs)
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.require_api_key().is_ok()
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            provider: default_provider(),
            base_url: default_base_url(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            system_prompt: default_system_prompt(),
            weather_api_key: None,
            weather_base_url: default_weather_base_url(),
            weather_timeout_secs: default_weather_timeout_secs(),
            agent: AgentSettings::default(),
            server: ServerSettings::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),

    #[error("No API key configured; set WORKAGENT_API_KEY or OPENAI_API_KEY (a .env file works)")]
    MissingApiKey,
}
