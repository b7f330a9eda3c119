use std::time::Duration;
use thiserror::Error;

pub type GenerationResult<T> = std::result::Result<T, GenerationError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
    Fatal,
}

/// Every way a generation run can fail.
#[derive(Debug, Clone, Error)]
pub enum GenerationError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("missing or invalid field: {field}")]
    InvalidRequest { field: String },

    #[error("could not find a <{root}> element in the model output")]
    Extraction { root: String },

    #[error("generated XML failed validation with {} error(s)", errors.len())]
    Validation { errors: Vec<String> },

    #[error("network error calling model: {0}")]
    Network(String),

    #[error("model provider rate limited the request")]
    RateLimited { retry_after: Option<Duration> },

    #[error("model did not respond within {}s", after.as_secs())]
    Timeout { after: Duration },

    #[error("model provider returned {status}: {message}")]
    Provider { status: u16, message: String },

    #[error("client disconnected, generation abandoned")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),
}

impl GenerationError {
    /// Stable identifier used in API payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            GenerationError::Configuration(_) => "configuration",
            GenerationError::InvalidRequest { .. } => "invalid_request",
            GenerationError::Extraction { .. } => "extraction",
            GenerationError::Validation { .. } => "validation",
            GenerationError::Network(_) => "network",
            GenerationError::RateLimited { .. } => "rate_limit",
            GenerationError::Timeout { .. } => "timeout",
            GenerationError::Provider { .. } => "provider",
            GenerationError::Cancelled => "cancelled",
            GenerationError::Internal(_) => "internal",
        }
    }

    /// Whether the retry loop may spend another attempt on this failure.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GenerationError::Extraction { .. } | GenerationError::Validation { .. }
        )
    }

    pub fn severity(&self) -> Severity {
        match self {
            GenerationError::Extraction { .. } | GenerationError::Validation { .. } => {
                Severity::Warning
            }
            GenerationError::Configuration(_) | GenerationError::InvalidRequest { .. } => {
                Severity::Fatal
            }
            _ => Severity::Error,
        }
    }

    /// True for failures of the model call itself rather than of its output.
    pub fn is_model_failure(&self) -> bool {
        matches!(
            self,
            GenerationError::Network(_)
                | GenerationError::RateLimited { .. }
                | GenerationError::Timeout { .. }
                | GenerationError::Provider { .. }
        )
    }
}

impl From<reqwest::Error> for GenerationError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return GenerationError::Timeout {
                after: Duration::ZERO,
            };
        }
        match err.status() {
            Some(status) => GenerationError::Provider {
                status: status.as_u16(),
                message: err.to_string(),
            },
            None => GenerationError::Network(err.to_string()),
        }
    }
}
