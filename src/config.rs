//! Configuration for the debate bot.
//!
//! Settings come from three layers, later ones winning: built-in defaults,
//! an optional YAML file, and environment variables. The provider section is
//! read once when the generation client is constructed.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// Default chat-completions endpoint.
pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

/// Default model identifier.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Default SQLite database location.
pub const DEFAULT_DATABASE_URL: &str = "sqlite://kopi.db";

/// Upper bound for `max_retries`.
pub const MAX_RETRIES_LIMIT: u32 = 10;

/// Settings for the generation provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Provider credential. Never written back out.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Base URL of the OpenAI-compatible API.
    pub api_base: String,
    /// Model identifier sent with every request.
    pub model: String,
    /// Maximum output tokens for debate replies.
    pub max_tokens: u32,
    /// Sampling temperature (0.0 - 2.0).
    pub temperature: f64,
    /// Nucleus sampling parameter (0.0 - 1.0).
    pub top_p: f64,
    /// Penalty on repeated tokens.
    pub frequency_penalty: f64,
    /// Penalty encouraging new topics.
    pub presence_penalty: f64,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Transport-level retries after the first attempt.
    pub max_retries: u32,
    /// Substitute a placeholder credential when none is configured.
    pub test_mode: bool,
    /// Maximum output tokens for topic/stance extraction.
    pub extraction_max_tokens: u32,
    /// Sampling temperature for topic/stance extraction.
    pub extraction_temperature: f64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: DEFAULT_API_BASE.to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: 500,
            temperature: 0.8,
            top_p: 0.9,
            frequency_penalty: 0.1,
            presence_penalty: 0.1,
            timeout_secs: 30,
            max_retries: 2,
            test_mode: false,
            extraction_max_tokens: 150,
            extraction_temperature: 0.2,
        }
    }
}

impl ProviderConfig {
    /// Request timeout as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_test_mode(mut self, test_mode: bool) -> Self {
        self.test_mode = test_mode;
        self
    }
}

/// Settings for context construction and turn handling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DebateSettings {
    /// Number of most recent messages given to the model as history.
    pub history_window: usize,
    /// Tokens held back from `max_tokens` when stating the reply budget.
    pub response_token_reserve: u32,
    /// Number of messages echoed back to the caller after a turn.
    pub max_messages: usize,
}

impl Default for DebateSettings {
    fn default() -> Self {
        Self {
            history_window: 7,
            response_token_reserve: 100,
            max_messages: 10,
        }
    }
}

impl DebateSettings {
    pub fn with_history_window(mut self, history_window: usize) -> Self {
        self.history_window = history_window;
        self
    }

    pub fn with_max_messages(mut self, max_messages: usize) -> Self {
        self.max_messages = max_messages;
        self
    }
}

/// Complete application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// SQLite connection URL.
    pub database_url: String,
    /// Generation provider settings.
    pub provider: ProviderConfig,
    /// Context and turn settings.
    pub debate: DebateSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            provider: ProviderConfig::default(),
            debate: DebateSettings::default(),
        }
    }
}

impl AppConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a YAML configuration file. Missing keys take their defaults.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }

    /// Parses YAML configuration text.
    pub fn from_yaml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(contents)?;
        Ok(config)
    }

    /// Creates configuration from defaults overlaid with environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `OPENAI_API_KEY`: provider credential
    /// - `OPENAI_API_BASE`: API base URL (default: https://api.openai.com/v1)
    /// - `OPENAI_MODEL`: model identifier (default: gpt-4o-mini)
    /// - `AI_MAX_TOKENS`, `AI_TEMPERATURE`, `AI_TOP_P`,
    ///   `AI_FREQUENCY_PENALTY`, `AI_PRESENCE_PENALTY`: sampling parameters
    /// - `AI_TIMEOUT`: request timeout in seconds (default: 30)
    /// - `AI_MAX_RETRIES`: transport retries (default: 2)
    /// - `DEBATE_TESTING`: use a placeholder credential when none is set
    /// - `DEBATE_HISTORY_WINDOW`, `DEBATE_TOKEN_RESERVE`, `DEBATE_MAX_MESSAGES`
    /// - `DATABASE_URL`: SQLite URL (default: sqlite://kopi.db)
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Applies environment-style overrides from `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup("OPENAI_API_KEY").filter(|v| !v.trim().is_empty()) {
            self.provider.api_key = Some(val);
        }
        if let Some(val) = lookup("OPENAI_API_BASE") {
            self.provider.api_base = val;
        }
        if let Some(val) = lookup("OPENAI_MODEL") {
            self.provider.model = val;
        }
        if let Some(val) = lookup("AI_MAX_TOKENS") {
            self.provider.max_tokens = parse_env_value(&val, "AI_MAX_TOKENS")?;
        }
        if let Some(val) = lookup("AI_TEMPERATURE") {
            self.provider.temperature = parse_env_value(&val, "AI_TEMPERATURE")?;
        }
        if let Some(val) = lookup("AI_TOP_P") {
            self.provider.top_p = parse_env_value(&val, "AI_TOP_P")?;
        }
        if let Some(val) = lookup("AI_FREQUENCY_PENALTY") {
            self.provider.frequency_penalty = parse_env_value(&val, "AI_FREQUENCY_PENALTY")?;
        }
        if let Some(val) = lookup("AI_PRESENCE_PENALTY") {
            self.provider.presence_penalty = parse_env_value(&val, "AI_PRESENCE_PENALTY")?;
        }
        if let Some(val) = lookup("AI_TIMEOUT") {
            self.provider.timeout_secs = parse_env_value(&val, "AI_TIMEOUT")?;
        }
        if let Some(val) = lookup("AI_MAX_RETRIES") {
            self.provider.max_retries = parse_env_value(&val, "AI_MAX_RETRIES")?;
        }
        if let Some(val) = lookup("DEBATE_TESTING") {
            self.provider.test_mode = parse_env_bool(&val, "DEBATE_TESTING")?;
        }
        if let Some(val) = lookup("DEBATE_HISTORY_WINDOW") {
            self.debate.history_window = parse_env_value(&val, "DEBATE_HISTORY_WINDOW")?;
        }
        if let Some(val) = lookup("DEBATE_TOKEN_RESERVE") {
            self.debate.response_token_reserve = parse_env_value(&val, "DEBATE_TOKEN_RESERVE")?;
        }
        if let Some(val) = lookup("DEBATE_MAX_MESSAGES") {
            self.debate.max_messages = parse_env_value(&val, "DEBATE_MAX_MESSAGES")?;
        }
        if let Some(val) = lookup("DATABASE_URL") {
            self.database_url = val;
        }
        Ok(())
    }

    /// Validates the configuration values.
    ///
    /// The credential is not checked here; its absence is reported when the
    /// provider is constructed.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let p = &self.provider;

        if p.model.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "model cannot be empty".to_string(),
            ));
        }

        if p.api_base.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "api_base cannot be empty".to_string(),
            ));
        }

        if p.max_tokens == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_tokens must be greater than 0".to_string(),
            ));
        }

        if !(0.0..=2.0).contains(&p.temperature) {
            return Err(ConfigError::ValidationFailed(
                "temperature must be between 0.0 and 2.0".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&p.top_p) {
            return Err(ConfigError::ValidationFailed(
                "top_p must be between 0.0 and 1.0".to_string(),
            ));
        }

        for (name, value) in [
            ("frequency_penalty", p.frequency_penalty),
            ("presence_penalty", p.presence_penalty),
        ] {
            if !(-2.0..=2.0).contains(&value) {
                return Err(ConfigError::ValidationFailed(format!(
                    "{} must be between -2.0 and 2.0",
                    name
                )));
            }
        }

        if p.timeout_secs == 0 {
            return Err(ConfigError::ValidationFailed(
                "timeout must be greater than 0".to_string(),
            ));
        }

        if p.max_retries > MAX_RETRIES_LIMIT {
            return Err(ConfigError::ValidationFailed(format!(
                "max_retries must be at most {}",
                MAX_RETRIES_LIMIT
            )));
        }

        if self.debate.history_window == 0 {
            return Err(ConfigError::ValidationFailed(
                "history_window must be greater than 0".to_string(),
            ));
        }

        if self.debate.response_token_reserve >= p.max_tokens {
            return Err(ConfigError::ValidationFailed(format!(
                "response_token_reserve ({}) must be below max_tokens ({})",
                self.debate.response_token_reserve, p.max_tokens
            )));
        }

        if self.database_url.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "database_url cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = url.into();
        self
    }

    pub fn with_provider(mut self, provider: ProviderConfig) -> Self {
        self.provider = provider;
        self
    }

    pub fn with_debate(mut self, debate: DebateSettings) -> Self {
        self.debate = debate;
        self
    }
}

fn parse_env_value<T: FromStr>(value: &str, key: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })
}

fn parse_env_bool(value: &str, key: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" | "" => Ok(false),
        other => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected a boolean, got '{}'", other),
        }),
    }
}
