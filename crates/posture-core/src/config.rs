//! Environment-bound configuration for the orchestrator.

use std::path::PathBuf;
use std::time::Duration;

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    env_var(name)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_bool(name: &str, default: bool) -> bool {
    env_var(name)
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Base64 key material for credential storage; checked before env/file.
    pub encryption_key: Option<String>,
    /// File fallback for the encryption key.
    pub encryption_key_file: Option<PathBuf>,

    pub model: String,
    pub fallback_model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub synthesis_temperature: f32,
    pub synthesis_max_tokens: u32,

    pub prompt_version: String,
    pub schema_version: String,

    pub request_timeout: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub max_concurrent_sections: usize,
    /// Soft requests-per-second cap, enforced per credential at acquire.
    pub per_key_rps: u32,

    pub redact_pii: bool,
    pub include_comments: bool,
    pub include_context: bool,
    pub max_comment_chars: usize,
    pub max_context_chars: usize,

    /// Pricing override as JSON: `{"model": {"prompt": x, "completion": y}}`
    /// in USD per 1K tokens.
    pub pricing_override: Option<String>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            encryption_key: None,
            encryption_key_file: None,
            model: "gpt-4-turbo".to_string(),
            fallback_model: "gpt-3.5-turbo".to_string(),
            temperature: 0.7,
            max_tokens: 1600,
            synthesis_temperature: 0.5,
            synthesis_max_tokens: 2000,
            prompt_version: "v2".to_string(),
            schema_version: crate::artifact::SECTION_SCHEMA_VERSION.to_string(),
            request_timeout: Duration::from_secs(60),
            max_retries: 3,
            retry_delay: Duration::from_secs(2),
            max_concurrent_sections: 5,
            per_key_rps: 10,
            redact_pii: true,
            include_comments: true,
            include_context: true,
            max_comment_chars: 500,
            max_context_chars: 300,
            pricing_override: None,
        }
    }
}

impl OrchestratorConfig {
    /// Load from `POSTURE_*` environment variables, defaulting every knob.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            encryption_key: env_var("POSTURE_KEYS_ENCRYPTION_KEY"),
            encryption_key_file: env_var("POSTURE_KEYS_ENCRYPTION_KEY_FILE").map(PathBuf::from),
            model: env_var("POSTURE_MODEL").unwrap_or(defaults.model),
            fallback_model: env_var("POSTURE_FALLBACK_MODEL").unwrap_or(defaults.fallback_model),
            temperature: env_parse("POSTURE_TEMPERATURE", defaults.temperature),
            max_tokens: env_parse("POSTURE_MAX_TOKENS", defaults.max_tokens),
            synthesis_temperature: env_parse(
                "POSTURE_SYNTHESIS_TEMPERATURE",
                defaults.synthesis_temperature,
            ),
            synthesis_max_tokens: env_parse(
                "POSTURE_SYNTHESIS_MAX_TOKENS",
                defaults.synthesis_max_tokens,
            ),
            prompt_version: env_var("POSTURE_PROMPT_VERSION").unwrap_or(defaults.prompt_version),
            schema_version: env_var("POSTURE_SCHEMA_VERSION").unwrap_or(defaults.schema_version),
            request_timeout: Duration::from_secs(env_parse(
                "POSTURE_REQUEST_TIMEOUT_SECONDS",
                defaults.request_timeout.as_secs(),
            )),
            max_retries: env_parse("POSTURE_MAX_RETRIES", defaults.max_retries),
            retry_delay: Duration::from_secs(env_parse(
                "POSTURE_RETRY_DELAY_SECONDS",
                defaults.retry_delay.as_secs(),
            )),
            max_concurrent_sections: env_parse(
                "POSTURE_MAX_CONCURRENT_SECTIONS",
                defaults.max_concurrent_sections,
            ),
            per_key_rps: env_parse("POSTURE_PER_KEY_RPS", defaults.per_key_rps),
            redact_pii: env_bool("POSTURE_REDACT_PII", defaults.redact_pii),
            include_comments: env_bool("POSTURE_INCLUDE_COMMENTS", defaults.include_comments),
            include_context: env_bool("POSTURE_INCLUDE_CONTEXT", defaults.include_context),
            max_comment_chars: env_parse("POSTURE_MAX_COMMENT_CHARS", defaults.max_comment_chars),
            max_context_chars: env_parse("POSTURE_MAX_CONTEXT_CHARS", defaults.max_context_chars),
            pricing_override: env_var("POSTURE_PRICING_OVERRIDE"),
        }
    }
}
