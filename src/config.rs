//! Configuration management for file-agent.
//!
//! Configuration is read from environment variables (a `.env` file in the
//! current directory is loaded first when present):
//! - `ANTHROPIC_API_KEY` - Required. API key for the model endpoint.
//! - `ANTHROPIC_BASE_URL` - Optional. Endpoint base URL. Defaults to `https://api.anthropic.com`.
//! - `ANTHROPIC_MODEL` - Optional. Model identifier. Defaults to `claude-sonnet-4-20250514`.
//! - `WORKSPACE_PATH` - Optional. Directory relative tool paths resolve against. Defaults to current directory.
//! - `MAX_TOKENS` - Optional. Completion token limit per model call. Defaults to `2000`.
//! - `TEMPERATURE` - Optional. Sampling temperature. Defaults to `0.0`.
//! - `MODEL_TIMEOUT_SECS` - Optional. Per model call timeout. Unbounded when unset.
//! - `MAX_TOOL_CYCLES` - Optional. Tool cycles allowed per turn. Unbounded when unset.
//! - `TOOL_CONCURRENCY` - Optional. Tool calls run in parallel within one cycle. Defaults to `4`.
//! - `SYSTEM_PROMPT` - Optional. Replaces the built-in system prompt.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
pub const DEFAULT_MAX_TOKENS: u32 = 2000;
pub const DEFAULT_TOOL_CONCURRENCY: usize = 4;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Model endpoint settings.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// API key sent with every request
    pub api_key: String,

    /// Endpoint base URL, without the `/v1/messages` suffix
    pub base_url: String,

    /// Model identifier
    pub model: String,

    /// Completion token limit per call
    pub max_tokens: u32,

    /// Sampling temperature
    pub temperature: f32,

    /// Timeout applied to each model call
    pub timeout: Option<Duration>,
}

/// Agent configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Model endpoint settings
    pub model: ModelConfig,

    /// Working directory that relative tool paths resolve against
    pub workspace_path: PathBuf,

    /// Upper bound on tool cycles per turn
    pub max_tool_cycles: Option<usize>,

    /// Maximum tool calls executing at once within one cycle
    pub tool_concurrency: usize,

    /// System prompt override
    pub system_prompt: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` if `ANTHROPIC_API_KEY` is not set,
    /// and `ConfigError::InvalidValue` for unparseable numbers or a workspace
    /// that is not an existing directory.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                tracing::warn!("Failed to load .env file: {}", e);
            }
        }

        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar("ANTHROPIC_API_KEY".to_string()))?;

        let base_url = std::env::var("ANTHROPIC_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());

        let model = std::env::var("ANTHROPIC_MODEL")
            .unwrap_or_else(|_| DEFAULT_MODEL.to_string());

        let workspace_path = match std::env::var("WORKSPACE_PATH") {
            Ok(path) => PathBuf::from(path),
            Err(_) => std::env::current_dir().map_err(|e| {
                ConfigError::InvalidValue("WORKSPACE_PATH".to_string(), format!("{}", e))
            })?,
        };
        let workspace_path = validate_workspace(workspace_path)?;

        let max_tokens = parse_var("MAX_TOKENS")?.unwrap_or(DEFAULT_MAX_TOKENS);
        let temperature = parse_var("TEMPERATURE")?.unwrap_or(0.0);
        let timeout = parse_var::<u64>("MODEL_TIMEOUT_SECS")?.map(Duration::from_secs);
        let max_tool_cycles = parse_var("MAX_TOOL_CYCLES")?;

        let tool_concurrency = parse_var("TOOL_CONCURRENCY")?.unwrap_or(DEFAULT_TOOL_CONCURRENCY);
        if tool_concurrency == 0 {
            return Err(ConfigError::InvalidValue(
                "TOOL_CONCURRENCY".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        let system_prompt = std::env::var("SYSTEM_PROMPT")
            .ok()
            .filter(|v| !v.trim().is_empty());

        Ok(Self {
            model: ModelConfig {
                api_key,
                base_url,
                model,
                max_tokens,
                temperature,
                timeout,
            },
            workspace_path,
            max_tool_cycles,
            tool_concurrency,
            system_prompt,
        })
    }

    /// Create a config with custom values (useful for testing).
    pub fn new(api_key: String, base_url: String, workspace_path: PathBuf) -> Self {
        Self {
            model: ModelConfig {
                api_key,
                base_url,
                model: DEFAULT_MODEL.to_string(),
                max_tokens: DEFAULT_MAX_TOKENS,
                temperature: 0.0,
                timeout: None,
            },
            workspace_path,
            max_tool_cycles: None,
            tool_concurrency: DEFAULT_TOOL_CONCURRENCY,
            system_prompt: None,
        }
    }
}

/// Parse an optional environment variable, failing on malformed values.
fn parse_var<T>(name: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), format!("{}", e))),
        _ => Ok(None),
    }
}

/// The working directory is fixed for the process lifetime, so it is made
/// absolute here once.
fn validate_workspace(path: PathBuf) -> Result<PathBuf, ConfigError> {
    let absolute = if path.is_absolute() {
        path
    } else {
        std::env::current_dir()
            .map_err(|e| ConfigError::InvalidValue("WORKSPACE_PATH".to_string(), format!("{}", e)))?
            .join(path)
    };

    if !absolute.is_dir() {
        return Err(ConfigError::InvalidValue(
            "WORKSPACE_PATH".to_string(),
            format!("{} is not a directory", absolute.display()),
        ));
    }

    Ok(crate::tools::path::normalize(&absolute))
}
