use std::time::Duration;
use thiserror::Error;
use tokio::sync::AcquireError;

/// Why a single request in a batch did not produce a decoded body.
///
/// These never abort a batch; the dispatcher stores them in the
/// request's outcome slot and moves on.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RequestFailure {
    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("HTTP status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Response decoding failed: {0}")]
    Decode(String),

    #[error("Request aborted: {0}")]
    Aborted(String),
}

impl RequestFailure {
    pub fn is_timeout(&self) -> bool {
        matches!(self, RequestFailure::Timeout(_))
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            RequestFailure::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl RequestFailure {
    /// Classify a reqwest error. `deadline` is reported when the client itself
    /// gave up waiting.
    pub fn from_reqwest(err: reqwest::Error, deadline: Duration) -> Self {
        if err.is_timeout() {
            RequestFailure::Timeout(deadline)
        } else if err.is_decode() {
            RequestFailure::Decode(err.to_string())
        } else {
            RequestFailure::Transport(err.to_string())
        }
    }
}

#[derive(Debug, Error)]
pub enum CarbonError {
    #[error("HTTP transport setup failed: {0}")]
    TransportSetup(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Duplicate request key in batch: {0}")]
    DuplicateKey(String),

    #[error("Concurrency limit must be greater than 0")]
    InvalidConcurrency,

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("No outcome returned for request {0}")]
    MissingOutcome(String),

    #[error("Request {key} failed: {failure}")]
    UpstreamFailure { key: String, failure: RequestFailure },

    #[error("Google page speed API results is empty")]
    EmptyAuditData,

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Semaphore acquire error: {0}")]
    SemaphoreError(String),

    #[error("Interrupted before the command finished")]
    Interrupted,
}

impl CarbonError {
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            CarbonError::InvalidUrl(_) => ErrorSeverity::Low,
            CarbonError::UpstreamFailure { .. } | CarbonError::EmptyAuditData => {
                ErrorSeverity::Medium
            }
            CarbonError::InvalidRequest(_)
            | CarbonError::DuplicateKey(_)
            | CarbonError::InvalidConcurrency
            | CarbonError::ConfigurationError(_) => ErrorSeverity::High,
            CarbonError::TransportSetup(_) => ErrorSeverity::Critical,
            _ => ErrorSeverity::Medium,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl From<AcquireError> for CarbonError {
    fn from(err: AcquireError) -> Self {
        CarbonError::SemaphoreError(err.to_string())
    }
}

impl From<std::io::Error> for CarbonError {
    fn from(err: std::io::Error) -> Self {
        CarbonError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for CarbonError {
    fn from(err: serde_json::Error) -> Self {
        CarbonError::SerializationError(err.to_string())
    }
}

impl From<url::ParseError> for CarbonError {
    fn from(err: url::ParseError) -> Self {
        CarbonError::InvalidUrl(err.to_string())
    }
}
