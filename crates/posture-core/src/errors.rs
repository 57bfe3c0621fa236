use thiserror::Error;

/// Terminal classification of a single outbound LLM call attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallErrorKind {
    RateLimit,
    Auth,
    Timeout,
    Server,
    Network,
    MalformedJson,
    SchemaViolation,
    NoCredentialAvailable,
    Persistence,
    Other,
}

impl CallErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RateLimit => "rate_limit",
            Self::Auth => "auth",
            Self::Timeout => "timeout",
            Self::Server => "server",
            Self::Network => "network",
            Self::MalformedJson => "malformed_json",
            Self::SchemaViolation => "schema_violation",
            Self::NoCredentialAvailable => "no_credential",
            Self::Persistence => "persistence",
            Self::Other => "other",
        }
    }
}

#[derive(Debug, Error)]
pub enum CallError {
    #[error("provider rate limit (status {status:?}): {detail}")]
    RateLimit { status: Option<u16>, detail: String },

    #[error("authentication rejected (status {status:?}): {detail}")]
    Auth { status: Option<u16>, detail: String },

    #[error("request timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("provider server error (status {status:?}): {detail}")]
    Server { status: Option<u16>, detail: String },

    #[error("network error: {detail}")]
    Network { detail: String },

    #[error("response was not valid JSON: {detail}")]
    MalformedJson { detail: String },

    #[error("artifact failed schema validation: {detail}")]
    SchemaViolation { detail: String },

    #[error("no active credential available")]
    NoCredentialAvailable,

    #[error("persistence error: {0}")]
    Persistence(#[from] rusqlite::Error),

    #[error("{0}")]
    Other(String),
}

impl CallError {
    pub fn kind(&self) -> CallErrorKind {
        match self {
            Self::RateLimit { .. } => CallErrorKind::RateLimit,
            Self::Auth { .. } => CallErrorKind::Auth,
            Self::Timeout { .. } => CallErrorKind::Timeout,
            Self::Server { .. } => CallErrorKind::Server,
            Self::Network { .. } => CallErrorKind::Network,
            Self::MalformedJson { .. } => CallErrorKind::MalformedJson,
            Self::SchemaViolation { .. } => CallErrorKind::SchemaViolation,
            Self::NoCredentialAvailable => CallErrorKind::NoCredentialAvailable,
            Self::Persistence(_) => CallErrorKind::Persistence,
            Self::Other(_) => CallErrorKind::Other,
        }
    }

    /// Retriable errors may be attempted again (possibly with a fresh
    /// credential). Schema violations count as retriable: the model is
    /// nondeterministic and a second sample often validates.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::RateLimit { .. }
                | Self::Auth { .. }
                | Self::Timeout { .. }
                | Self::Server { .. }
                | Self::Network { .. }
                | Self::MalformedJson { .. }
                | Self::SchemaViolation { .. }
        )
    }

    /// Rate-limit detection drives credential cooldown: HTTP 429 first,
    /// free-form "rate limit" text second.
    pub fn is_rate_limit(&self) -> bool {
        match self {
            Self::RateLimit { .. } => true,
            _ => self.to_string().to_lowercase().contains("rate limit"),
        }
    }

    /// Classify a provider HTTP status + body into the taxonomy.
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        let detail = body.into();
        match status {
            429 => Self::RateLimit {
                status: Some(status),
                detail,
            },
            401 | 403 => Self::Auth {
                status: Some(status),
                detail,
            },
            500..=599 => Self::Server {
                status: Some(status),
                detail,
            },
            _ => Self::Other(format!("unexpected status {status}: {detail}")),
        }
    }

    /// Fallback classification for free-form error text.
    pub fn classify_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let msg = message.to_lowercase();
        if msg.contains("rate limit") || msg.contains("429") {
            Self::RateLimit {
                status: None,
                detail: message,
            }
        } else if msg.contains("401") || msg.contains("unauthorized") || msg.contains("invalid api key")
        {
            Self::Auth {
                status: None,
                detail: message,
            }
        } else if msg.contains("timeout") || msg.contains("timed out") {
            Self::Timeout { seconds: 0 }
        } else if msg.contains("500")
            || msg.contains("502")
            || msg.contains("503")
            || msg.contains("504")
        {
            Self::Server {
                status: None,
                detail: message,
            }
        } else if msg.contains("network") || msg.contains("connection") || msg.contains("dns") {
            Self::Network { detail: message }
        } else {
            Self::Other(message)
        }
    }
}
