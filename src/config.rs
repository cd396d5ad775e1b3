//! Configuration types.

use secrecy::SecretString;

use crate::error::ConfigError;

/// Default system prompt for the assistant.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are TaskMaster AI, a friendly productivity assistant. \
Help the user plan their day, break goals into concrete tasks, and stay on track. \
Keep answers short and practical.\n\n\
When you suggest tasks the user should add to their list, append a fenced ```json block \
of the form {\"tasks\": [{\"title\": \"...\", \"description\": \"...\", \
\"priority\": \"low|medium|high\", \"due_date\": \"YYYY-MM-DD\"}]}. \
Only include the block when you are proposing new tasks. Never mention the block in prose.";

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";

/// Assistant configuration.
#[derive(Debug, Clone)]
pub struct AssistantConfig {
    /// API key for the generative-language API.
    pub api_key: SecretString,
    /// Model id, e.g. `gemini-1.5-flash`.
    pub model: String,
    /// Endpoint base URL (overridable for local stubs).
    pub api_base: String,
    /// Sampling temperature for chat replies.
    pub temperature: f32,
    /// Max output tokens per reply.
    pub max_output_tokens: u32,
    /// Number of past messages sent as context.
    pub history_limit: usize,
    /// Stream replies instead of waiting for the full response.
    pub stream: bool,
    /// Owner id for tasks created from chat.
    pub user_id: String,
    /// System prompt.
    pub system_prompt: String,
}

impl AssistantConfig {
    /// Build configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup("GEMINI_API_KEY")
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar("GEMINI_API_KEY".to_string()))?;

        let temperature: f32 = parse_or(&lookup, "TASKMASTER_TEMPERATURE", 0.7)?;
        if !(0.0..=2.0).contains(&temperature) {
            return Err(ConfigError::InvalidValue {
                key: "TASKMASTER_TEMPERATURE".to_string(),
                message: format!("{} is outside 0.0..=2.0", temperature),
            });
        }

        let max_output_tokens: u32 = parse_or(&lookup, "TASKMASTER_MAX_OUTPUT_TOKENS", 2048)?;
        if max_output_tokens == 0 {
            return Err(ConfigError::InvalidValue {
                key: "TASKMASTER_MAX_OUTPUT_TOKENS".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }

        let history_limit: usize = parse_or(&lookup, "TASKMASTER_HISTORY_LIMIT", 20)?;
        if history_limit == 0 {
            return Err(ConfigError::InvalidValue {
                key: "TASKMASTER_HISTORY_LIMIT".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }

        let stream = match lookup("TASKMASTER_STREAM") {
            Some(raw) => parse_bool(&raw).ok_or_else(|| ConfigError::InvalidValue {
                key: "TASKMASTER_STREAM".to_string(),
                message: format!("expected true/false, got {:?}", raw),
            })?,
            None => true,
        };

        Ok(Self {
            api_key: SecretString::from(api_key),
            model: lookup("TASKMASTER_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            api_base: lookup("TASKMASTER_API_BASE")
                .map(|b| b.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            temperature,
            max_output_tokens,
            history_limit,
            stream,
            user_id: lookup("TASKMASTER_USER").unwrap_or_else(|| "local-user".to_string()),
            system_prompt: lookup("TASKMASTER_SYSTEM_PROMPT")
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
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

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
