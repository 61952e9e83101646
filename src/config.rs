//! Configuration types.

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::llm::{DEFAULT_MODEL, LlmBackend, LlmConfig};
use crate::notify::{DEFAULT_REVIEW_BASE_URL, EmailConfig};
use crate::pipeline::classifier::DEFAULT_MAX_TOKENS;

/// Default port for the invoke endpoint.
pub const DEFAULT_PORT: u16 = 9000;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Local path or remote libSQL URL.
    pub database_url: String,
    pub database_auth_token: Option<SecretString>,
    /// Create the domain tables on start-up (local use only).
    pub init_schema: bool,
    pub llm: LlmConfig,
    /// Output budget for the judge call.
    pub max_tokens: u32,
    pub port: u16,
    /// Base of the links in reviewer alerts.
    pub review_base_url: String,
    /// SMTP relay; alerts only go to the log when absent.
    pub email: Option<EmailConfig>,
    /// Directory for daily-rotated log files.
    pub log_dir: Option<String>,
}

impl WorkerConfig {
    /// Build config from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from a variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let database_url = lookup("DATABASE_URL")
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar("DATABASE_URL".to_string()))?;

        let backend = match lookup("INSPECTOR_LLM_BACKEND") {
            Some(raw) => raw.parse::<LlmBackend>()?,
            None => LlmBackend::Anthropic,
        };
        let key_var = match backend {
            LlmBackend::Anthropic => "ANTHROPIC_API_KEY",
            LlmBackend::OpenAi => "OPENAI_API_KEY",
        };
        let api_key = lookup(key_var).ok_or_else(|| ConfigError::MissingEnvVar(key_var.to_string()))?;

        Ok(Self {
            database_url,
            database_auth_token: lookup("DATABASE_AUTH_TOKEN").map(SecretString::from),
            init_schema: parse_bool(lookup("INSPECTOR_INIT_SCHEMA")),
            llm: LlmConfig {
                backend,
                api_key: SecretString::from(api_key),
                model: lookup("INSPECTOR_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            },
            max_tokens: parse_number(&lookup, "INSPECTOR_MAX_TOKENS", DEFAULT_MAX_TOKENS)?,
            port: parse_number(&lookup, "INSPECTOR_PORT", DEFAULT_PORT)?,
            review_base_url: lookup("INSPECTOR_REVIEW_BASE_URL")
                .unwrap_or_else(|| DEFAULT_REVIEW_BASE_URL.to_string()),
            email: EmailConfig::from_lookup(&lookup),
            log_dir: lookup("INSPECTOR_LOG_DIR").filter(|s| !s.is_empty()),
        })
    }
}

fn parse_bool(raw: Option<String>) -> bool {
    raw.is_some_and(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}

fn parse_number<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
        None => Ok(default),
    }
}
