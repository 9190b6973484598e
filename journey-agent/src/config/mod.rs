//! Runtime configuration.
//!
//! Everything is read once at startup and handed to the client, the tools and
//! the HTTP server. Recognised variables:
//! - `AI_PROVIDER` - `stub` (default) or `openai`, used by the HTTP service.
//! - `OPENAI_API_KEY` / `API_KEY` - credential for the chat-completion backend.
//! - `OPENAI_BASE_URL` / `BASE_URL` - backend base URL. Defaults to `https://api.deepseek.com`.
//! - `OPENAI_MODEL` / `MODEL_ID` - model id. Defaults to `deepseek-reasoner`.
//! - `OPENAI_TIMEOUT_S` - per-request timeout in seconds. Defaults to `30`.
//! - `TAVILY_API_KEY` - credential for the attraction search tool.
//! - `WEATHER_BASE_URL` - weather service. Defaults to `https://wttr.in`.
//! - `TAVILY_BASE_URL` - search service. Defaults to `https://api.tavily.com`.
//! - `AGENT_MAX_ITERATIONS` - agent loop ceiling. Defaults to `5`.
//! - `HOST` / `PORT` - HTTP bind address. Defaults to `127.0.0.1:8000`.
//! - `LOG_LEVEL` / `LOG_FORMAT` - `info` and `text` by default, `json` for structured lines.

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_BASE_URL: &str = "https://api.deepseek.com";
pub const DEFAULT_MODEL: &str = "deepseek-reasoner";
pub const DEFAULT_WEATHER_BASE_URL: &str = "https://wttr.in";
pub const DEFAULT_TAVILY_BASE_URL: &str = "https://api.tavily.com";
pub const DEFAULT_MAX_ITERATIONS: usize = 5;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
    #[error("Failed to read env file: {0}")]
    EnvFile(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProviderKind {
    #[default]
    Stub,
    OpenAI,
}

impl FromStr for ProviderKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stub" => Ok(ProviderKind::Stub),
            "openai" => Ok(ProviderKind::OpenAI),
            other => Err(ConfigError::InvalidValue(
                "AI_PROVIDER".to_string(),
                other.to_string(),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Chat-completion backend settings.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
}

/// Settings for the two lookup tools.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolsConfig {
    pub weather_base_url: String,
    pub tavily_base_url: String,
    pub tavily_api_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub provider: ProviderKind,
    pub llm: LlmConfig,
    pub tools: ToolsConfig,
    pub max_iterations: usize,
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Stub,
            llm: LlmConfig {
                api_key: None,
                base_url: DEFAULT_BASE_URL.to_string(),
                model: DEFAULT_MODEL.to_string(),
                timeout: Duration::from_secs(30),
            },
            tools: ToolsConfig {
                weather_base_url: DEFAULT_WEATHER_BASE_URL.to_string(),
                tavily_base_url: DEFAULT_TAVILY_BASE_URL.to_string(),
                tavily_api_key: None,
            },
            max_iterations: DEFAULT_MAX_ITERATIONS,
            host: "127.0.0.1".to_string(),
            port: 8000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
        }
    }
}

impl Config {
    /// Load `.env` (or the given file) into the process environment, then read it.
    ///
    /// A missing default `.env` is not an error; a missing explicit file is.
    pub fn load(env_file: Option<&Path>) -> Result<Self, ConfigError> {
        match env_file {
            Some(path) => {
                dotenvy::from_path(path).map_err(|e| ConfigError::EnvFile(e.to_string()))?;
            }
            None => {
                let _ = dotenvy::dotenv();
            }
        }
        Self::from_env()
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read a dotenv-formatted file without touching the process environment.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let mut vars = HashMap::new();
        let iter = dotenvy::from_path_iter(path).map_err(|e| ConfigError::EnvFile(e.to_string()))?;
        for item in iter {
            let (key, value) = item.map_err(|e| ConfigError::EnvFile(e.to_string()))?;
            vars.insert(key, value);
        }
        Self::from_lookup(|key| vars.get(key).cloned())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |keys: &[&str]| {
            keys.iter()
                .filter_map(|&key| lookup(key))
                .map(|value| value.trim().to_string())
                .find(|value| !value.is_empty())
        };

        let defaults = Self::default();

        let provider = match get(&["AI_PROVIDER"]) {
            Some(value) => value.parse()?,
            None => defaults.provider,
        };

        let timeout_secs: f64 = parse_or(get(&["OPENAI_TIMEOUT_S"]), "OPENAI_TIMEOUT_S", 30.0)?;
        let timeout = Duration::try_from_secs_f64(timeout_secs)
            .ok()
            .filter(|timeout| !timeout.is_zero())
            .ok_or_else(|| {
                ConfigError::InvalidValue("OPENAI_TIMEOUT_S".to_string(), timeout_secs.to_string())
            })?;

        let max_iterations = parse_or(
            get(&["AGENT_MAX_ITERATIONS"]),
            "AGENT_MAX_ITERATIONS",
            DEFAULT_MAX_ITERATIONS,
        )?;
        if max_iterations == 0 {
            return Err(ConfigError::InvalidValue(
                "AGENT_MAX_ITERATIONS".to_string(),
                "0".to_string(),
            ));
        }

        let log_format = match get(&["LOG_FORMAT"]).as_deref() {
            None | Some("text") => LogFormat::Text,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError::InvalidValue(
                    "LOG_FORMAT".to_string(),
                    other.to_string(),
                ));
            }
        };

        Ok(Self {
            provider,
            llm: LlmConfig {
                api_key: get(&["OPENAI_API_KEY", "API_KEY"]),
                base_url: get(&["OPENAI_BASE_URL", "BASE_URL"]).unwrap_or(defaults.llm.base_url),
                model: get(&["OPENAI_MODEL", "MODEL_ID"]).unwrap_or(defaults.llm.model),
                timeout,
            },
            tools: ToolsConfig {
                weather_base_url: get(&["WEATHER_BASE_URL"])
                    .unwrap_or(defaults.tools.weather_base_url),
                tavily_base_url: get(&["TAVILY_BASE_URL"])
                    .unwrap_or(defaults.tools.tavily_base_url),
                tavily_api_key: get(&["TAVILY_API_KEY"]),
            },
            max_iterations,
            host: get(&["HOST"]).unwrap_or(defaults.host),
            port: parse_or(get(&["PORT"]), "PORT", defaults.port)?,
            log_level: get(&["LOG_LEVEL"])
                .map(|level| level.to_ascii_lowercase())
                .unwrap_or(defaults.log_level),
            log_format,
        })
    }
}

fn parse_or<T: FromStr>(value: Option<String>, key: &str, default: T) -> Result<T, ConfigError> {
    match value {
        Some(raw) => raw
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key.to_string(), raw)),
        None => Ok(default),
    }
}
