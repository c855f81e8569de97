//! Error types for the bot risk agent.

use serde_json::Value;
use thiserror::Error;

/// Errors raised while building a risk API request.
///
/// These indicate a misuse of the API by the caller and are never retried
/// or swallowed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    /// Client IP is not a valid IPv4/IPv6 address
    #[error("invalid IP address `{0}`")]
    InvalidIp(String),

    /// Value outside of the allowed set for an enumerated field
    #[error("invalid {field} `{value}`, expected one of {expected}")]
    InvalidValue {
        field: &'static str,
        value: String,
        expected: &'static str,
    },

    /// More custom parameters than the API accepts
    #[error("too many custom parameters ({0}), at most 10 are allowed")]
    TooManyCustomParams(usize),
}

/// Why a single response field was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    #[error("field is missing")]
    Missing,

    #[error("expected {0}")]
    WrongType(&'static str),

    #[error("value {0} is outside 0..=100")]
    OutOfRange(i64),

    #[error("unrecognized action code `{0}`")]
    UnknownAction(String),
}

/// Failure to reach the risk API or to read its reply.
#[derive(Debug, Error)]
pub enum TransportError {
    /// HTTP client failure (connect, timeout, body decoding)
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Reply body was not valid JSON
    #[error("invalid JSON in risk API reply: {0}")]
    Json(#[from] serde_json::Error),

    /// Any other transport-specific failure
    #[error("risk API unavailable: {0}")]
    Unavailable(String),
}

/// Errors produced by a risk API call.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The API answered with a non-zero `status`
    #[error("risk API returned status {code}")]
    Status { code: i64, body: Value },

    /// A response field failed validation
    #[error("invalid `{field}` in risk API response: {source}")]
    Validation {
        field: &'static str,
        body: Value,
        #[source]
        source: FieldError,
    },

    /// The call never produced a response
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl ApiError {
    /// Raw response body, when one was received.
    pub fn response_body(&self) -> Option<&Value> {
        match self {
            ApiError::Status { body, .. } | ApiError::Validation { body, .. } => Some(body),
            ApiError::Transport(_) => None,
        }
    }

    /// Status code reported by the API, if this is a status error.
    pub fn status_code(&self) -> Option<i64> {
        match self {
            ApiError::Status { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Invalid agent configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("secret_key must not be empty")]
    MissingSecret,

    #[error("score_threshold {0} is outside 0..=100")]
    ThresholdOutOfRange(u8),

    #[error("api.timeout_ms must be greater than zero")]
    ZeroTimeout,
}

/// Umbrella error for agent entry points that can fail in more than one way.
#[derive(Debug, Error)]
pub enum BotRiskError {
    #[error(transparent)]
    Request(#[from] RequestError),

    #[error(transparent)]
    Api(#[from] ApiError),
}
