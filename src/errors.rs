use thiserror::Error;

/// Run-level errors. Only configuration problems and process setup failures
/// are surfaced to the caller; per-symbol failures never become an `AppError`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Failure reported by a news source for one request.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SourceError {
    #[error("request timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),

    #[error("server error: HTTP {0}")]
    Server(u16),

    #[error("rate limited")]
    RateLimited,

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("malformed symbol: {0}")]
    MalformedSymbol(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("request rejected: HTTP {status}")]
    Rejected { status: u16, body: String },
}

impl SourceError {
    /// Transient failures worth another attempt against the same source.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SourceError::Timeout
                | SourceError::Network(_)
                | SourceError::Server(_)
                | SourceError::RateLimited
        )
    }

    pub fn from_status(status: reqwest::StatusCode, body: String) -> Self {
        match status.as_u16() {
            401 | 403 => SourceError::Auth(body),
            400 | 404 | 422 => SourceError::MalformedSymbol(body),
            429 => SourceError::RateLimited,
            code @ 500..=599 => SourceError::Server(code),
            code => SourceError::Rejected { status: code, body },
        }
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            SourceError::Timeout
        } else if e.is_decode() {
            SourceError::Parse(e.to_string())
        } else {
            SourceError::Network(e.to_string())
        }
    }
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM request timed out")]
    Timeout,
    #[error("LLM rate limit exceeded")]
    RateLimited,
    #[error("LLM authentication failed")]
    Auth,
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("API error: {0}")]
    ApiError(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Error)]
pub enum MailError {
    #[error("mail configuration error: {0}")]
    Config(String),
    #[error("failed to build email: {0}")]
    Build(String),
    #[error("SMTP send failed: {message}")]
    Transport { message: String, transient: bool },
    #[error("mail delivery timed out")]
    Timeout,
}

impl MailError {
    pub fn is_transient(&self) -> bool {
        match self {
            MailError::Transport { transient, .. } => *transient,
            MailError::Timeout => true,
            MailError::Config(_) | MailError::Build(_) => false,
        }
    }
}
