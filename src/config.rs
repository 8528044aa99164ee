//! Runtime configuration for the poller and the worker.
//!
//! Both processes build the same [`AppConfig`] from the environment, so a
//! worker spawned by the poller sees exactly the settings its parent used.

use std::time::Duration;
use thiserror::Error;

use crate::retry::RetryPolicy;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration shared by the poller, the supervisor and the worker.
#[derive(Debug, Clone)]
pub struct AppConfig {
    // Storage settings
    /// PostgreSQL database connection URL.
    pub database_url: String,

    // LLM settings
    /// Base URL of the OpenAI-compatible API.
    pub llm_api_base: String,
    /// API key sent as a bearer token.
    pub llm_api_key: Option<String>,
    /// Model used for planning, TOC, slide and text generation.
    pub default_model: String,
    /// Model used to summarize prior outputs and feedback.
    pub summary_model: String,
    /// Model used for streamed section research.
    pub research_model: String,
    /// Per-call timeout for regular completions.
    pub llm_timeout: Duration,
    /// Per-call timeout for streamed research.
    pub research_timeout: Duration,

    // Polling settings
    /// Sleep between lease attempts.
    pub poll_interval: Duration,
    /// Sleep between cancellation status checks.
    pub cancel_check_interval: Duration,
    /// Identity written to the `consumer` column when leasing.
    pub consumer_id: String,

    // Retry settings
    /// Maximum number of attempts per remote call.
    pub retry_max_attempts: u32,
    /// Base delay for exponential backoff.
    pub retry_base_delay: Duration,
    /// Upper bound of the uniform jitter added to each delay.
    pub retry_max_jitter: Duration,

    // Output settings
    /// Separator placed between merged report sections.
    pub section_separator: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: "postgres://localhost/draft_forge".to_string(),

            llm_api_base: "https://api.openai.com/v1".to_string(),
            llm_api_key: None,
            default_model: "gpt-4o-mini".to_string(),
            summary_model: "gpt-4.1".to_string(),
            research_model: "o3-deep-research".to_string(),
            llm_timeout: Duration::from_secs(120),
            research_timeout: Duration::from_secs(600),

            poll_interval: Duration::from_secs(7),
            cancel_check_interval: Duration::from_secs(5),
            consumer_id: default_consumer_id(),

            retry_max_attempts: 3,
            retry_base_delay: Duration::from_millis(800),
            retry_max_jitter: Duration::from_millis(300),

            section_separator: "\n\n---\n\n".to_string(),
        }
    }
}

impl AppConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `DATABASE_URL`: PostgreSQL connection URL (required)
    /// - `LLM_API_BASE`: OpenAI-compatible base URL (default: https://api.openai.com/v1)
    /// - `LLM_API_KEY` or `OPENAI_API_KEY`: API key
    /// - `LLM_MODEL`: Generation model (default: gpt-4o-mini)
    /// - `LLM_SUMMARY_MODEL`: Summary model (default: gpt-4.1)
    /// - `LLM_RESEARCH_MODEL`: Research model (default: o3-deep-research)
    /// - `LLM_TIMEOUT_SECS`: Completion timeout (default: 120)
    /// - `LLM_RESEARCH_TIMEOUT_SECS`: Research timeout (default: 600)
    /// - `POLL_INTERVAL_SECS`: Poll interval (default: 7)
    /// - `CANCEL_CHECK_INTERVAL_SECS`: Cancellation check interval (default: 5)
    /// - `CONSUMER_ID`: Lease identity (default: `HOSTNAME`, else `draft-forge-<pid>`)
    /// - `RETRY_MAX_ATTEMPTS`: Attempts per remote call (default: 3)
    /// - `RETRY_BASE_DELAY_MS`: Backoff base delay (default: 800)
    /// - `RETRY_MAX_JITTER_MS`: Backoff jitter bound (default: 300)
    /// - `REPORT_SECTION_SEPARATOR`: Section separator (default: blank line, `---`, blank line)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or have invalid values.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        config.database_url = std::env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingEnvVar("DATABASE_URL".to_string()))?;

        // LLM settings
        if let Ok(val) = std::env::var("LLM_API_BASE") {
            config.llm_api_base = val.trim_end_matches('/').to_string();
        }

        config.llm_api_key = std::env::var("LLM_API_KEY")
            .or_else(|_| std::env::var("OPENAI_API_KEY"))
            .ok()
            .filter(|key| !key.is_empty());

        if let Ok(val) = std::env::var("LLM_MODEL") {
            config.default_model = val;
        }

        if let Ok(val) = std::env::var("LLM_SUMMARY_MODEL") {
            config.summary_model = val;
        }

        if let Ok(val) = std::env::var("LLM_RESEARCH_MODEL") {
            config.research_model = val;
        }

        if let Ok(val) = std::env::var("LLM_TIMEOUT_SECS") {
            let secs: u64 = parse_env_value(&val, "LLM_TIMEOUT_SECS")?;
            config.llm_timeout = Duration::from_secs(secs);
        }

        if let Ok(val) = std::env::var("LLM_RESEARCH_TIMEOUT_SECS") {
            let secs: u64 = parse_env_value(&val, "LLM_RESEARCH_TIMEOUT_SECS")?;
            config.research_timeout = Duration::from_secs(secs);
        }

        // Polling settings
        if let Ok(val) = std::env::var("POLL_INTERVAL_SECS") {
            let secs: u64 = parse_env_value(&val, "POLL_INTERVAL_SECS")?;
            config.poll_interval = Duration::from_secs(secs);
        }

        if let Ok(val) = std::env::var("CANCEL_CHECK_INTERVAL_SECS") {
            let secs: u64 = parse_env_value(&val, "CANCEL_CHECK_INTERVAL_SECS")?;
            config.cancel_check_interval = Duration::from_secs(secs);
        }

        if let Ok(val) = std::env::var("CONSUMER_ID") {
            config.consumer_id = val;
        }

        // Retry settings
        if let Ok(val) = std::env::var("RETRY_MAX_ATTEMPTS") {
            config.retry_max_attempts = parse_env_value(&val, "RETRY_MAX_ATTEMPTS")?;
        }

        if let Ok(val) = std::env::var("RETRY_BASE_DELAY_MS") {
            let ms: u64 = parse_env_value(&val, "RETRY_BASE_DELAY_MS")?;
            config.retry_base_delay = Duration::from_millis(ms);
        }

        if let Ok(val) = std::env::var("RETRY_MAX_JITTER_MS") {
            let ms: u64 = parse_env_value(&val, "RETRY_MAX_JITTER_MS")?;
            config.retry_max_jitter = Duration::from_millis(ms);
        }

        if let Ok(val) = std::env::var("REPORT_SECTION_SEPARATOR") {
            config.section_separator = val;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database_url.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "database_url cannot be empty".to_string(),
            ));
        }

        if self.llm_api_base.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "llm_api_base cannot be empty".to_string(),
            ));
        }

        for (name, model) in [
            ("default_model", &self.default_model),
            ("summary_model", &self.summary_model),
            ("research_model", &self.research_model),
        ] {
            if model.is_empty() {
                return Err(ConfigError::ValidationFailed(format!(
                    "{} cannot be empty",
                    name
                )));
            }
        }

        if self.poll_interval.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "poll_interval must be greater than 0".to_string(),
            ));
        }

        if self.cancel_check_interval.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "cancel_check_interval must be greater than 0".to_string(),
            ));
        }

        if self.consumer_id.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "consumer_id cannot be empty".to_string(),
            ));
        }

        if self.retry_max_attempts == 0 {
            return Err(ConfigError::ValidationFailed(
                "retry_max_attempts must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Retry policy built from the retry settings.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_max_attempts, self.retry_base_delay)
            .with_max_jitter(self.retry_max_jitter)
    }

    /// Builder method to set the database URL.
    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = url.into();
        self
    }

    /// Builder method to set the default generation model.
    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    /// Builder method to set the poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Builder method to set the cancellation check interval.
    pub fn with_cancel_check_interval(mut self, interval: Duration) -> Self {
        self.cancel_check_interval = interval;
        self
    }

    /// Builder method to set the consumer identity.
    pub fn with_consumer_id(mut self, consumer_id: impl Into<String>) -> Self {
        self.consumer_id = consumer_id.into();
        self
    }

    /// Builder method to set the retry attempts.
    pub fn with_retry_max_attempts(mut self, attempts: u32) -> Self {
        self.retry_max_attempts = attempts;
        self
    }
}

/// Lease identity used when `CONSUMER_ID` is not set.
fn default_consumer_id() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .filter(|host| !host.is_empty())
        .unwrap_or_else(|| format!("draft-forge-{}", std::process::id()))
}

/// Parse an environment variable value into the target type.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{}'", value),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.poll_interval, Duration::from_secs(7));
        assert_eq!(config.cancel_check_interval, Duration::from_secs(5));
        assert_eq!(config.retry_max_attempts, 3);
        assert_eq!(config.retry_base_delay, Duration::from_millis(800));
        assert_eq!(config.retry_max_jitter, Duration::from_millis(300));
        assert_eq!(config.section_separator, "\n\n---\n\n");
        assert_eq!(config.default_model, "gpt-4o-mini");
        assert!(!config.consumer_id.is_empty());
    }

    #[test]
    fn test_config_builder() {
        let config = AppConfig::new()
            .with_database_url("postgres://test/db")
            .with_default_model("gpt-4.1-mini")
            .with_poll_interval(Duration::from_secs(2))
            .with_cancel_check_interval(Duration::from_secs(1))
            .with_consumer_id("host-a")
            .with_retry_max_attempts(5);

        assert_eq!(config.database_url, "postgres://test/db");
        assert_eq!(config.default_model, "gpt-4.1-mini");
        assert_eq!(config.poll_interval, Duration::from_secs(2));
        assert_eq!(config.cancel_check_interval, Duration::from_secs(1));
        assert_eq!(config.consumer_id, "host-a");
        assert_eq!(config.retry_max_attempts, 5);
    }

    #[test]
    fn test_validation_valid_config() {
        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validation_zero_poll_interval() {
        let config = AppConfig::default().with_poll_interval(Duration::ZERO);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("poll_interval"));
    }

    #[test]
    fn test_validation_zero_attempts() {
        let config = AppConfig::default().with_retry_max_attempts(0);
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::ValidationFailed(_)));
        assert!(err.to_string().contains("retry_max_attempts"));
    }

    #[test]
    fn test_validation_empty_model() {
        let config = AppConfig::default().with_default_model("");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_retry_policy_from_config() {
        let policy = AppConfig::default().with_retry_max_attempts(4).retry_policy();
        assert_eq!(policy.max_attempts(), 4);
    }

    #[test]
    fn test_parse_env_value() {
        let parsed: u64 = parse_env_value(" 42 ", "TEST").unwrap();
        assert_eq!(parsed, 42);

        let err = parse_env_value::<u64>("abc", "TEST").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }
}
