use thiserror::Error;

/// Bound applied to upstream bodies quoted in errors and logs.
pub const ERROR_BODY_LIMIT: usize = 200;

/// Failure of a single chat-completion call.
#[derive(Debug, Error)]
pub enum CallError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("timeout after {0}ms")]
    Timeout(u64),

    #[error("http {status}: {body}")]
    Http { status: u16, body: String },

    #[error("unexpected response format: {0}")]
    ResponseFormat(String),

    #[error("network error: {0}")]
    Network(String),
}

impl CallError {
    /// Returns true for transient errors that may succeed on a later attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Network(_) => true,
            // 5xx = server error, 4xx = caller error
            Self::Http { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// Short reason tag for progress messages and structured logs.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::Timeout(_) => "timeout",
            Self::Http { .. } => "http_error",
            Self::ResponseFormat(_) => "response_format",
            Self::Network(_) => "network",
        }
    }

    /// Message safe to hand back to a caller. Never contains credentials.
    pub fn user_message(&self) -> String {
        match self {
            Self::Configuration(msg) => format!("configuration error: {msg}"),
            Self::Timeout(ms) => format!("request timed out after {ms}ms"),
            Self::Http { status, body } if body.is_empty() => format!("provider returned HTTP {status}"),
            Self::Http { status, body } => format!("provider returned HTTP {status}: {body}"),
            Self::ResponseFormat(_) => "provider response did not contain any content".to_string(),
            Self::Network(_) => "request to provider failed".to_string(),
        }
    }
}

/// Failure while listing a provider's models.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("model listing is not supported for {0}")]
    NotSupported(String),

    #[error("missing API key")]
    MissingApiKey,

    #[error("missing API URL")]
    MissingApiUrl,

    #[error("http {status}: {body}")]
    Http { status: u16, body: String },

    #[error("empty or invalid model list")]
    EmptyOrInvalidResponse,

    #[error("timeout after {0}ms")]
    Timeout(u64),

    #[error("network error: {0}")]
    Network(String),
}

impl DiscoveryError {
    pub fn user_message(&self) -> String {
        match self {
            Self::NotSupported(provider) => format!("{provider} does not expose a model list"),
            Self::MissingApiKey => "an API key is required to list models".to_string(),
            Self::MissingApiUrl => "an API URL is required to list models".to_string(),
            Self::Http { status, .. } => format!("model listing failed with HTTP {status}"),
            Self::EmptyOrInvalidResponse => "provider returned no models".to_string(),
            Self::Timeout(ms) => format!("model listing timed out after {ms}ms"),
            Self::Network(_) => "request to provider failed".to_string(),
        }
    }
}

/// Failure of one organize batch. Always recovered inside the orchestrator.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error(transparent)]
    Call(#[from] CallError),

    #[error("could not parse batch result: {0}")]
    Parse(String),
}

impl BatchError {
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Call(e) => e.reason(),
            Self::Parse(_) => "json_parse",
        }
    }
}

/// Whole-job failure of an organize run.
#[derive(Debug, Error)]
pub enum OrganizeError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("organize job cancelled")]
    Cancelled,
}

/// Take at most `limit` characters of `text`, appending "..." when cut.
pub fn truncate_chars(text: &str, limit: usize) -> String {
    let mut out: String = text.chars().take(limit).collect();
    if out.len() < text.len() {
        out.push_str("...");
    }
    out
}
