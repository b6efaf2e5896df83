use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::classify;
use crate::job::JobKind;

/// Closed taxonomy attached to every error raised by the request and polling layers.
///
/// Callers branch on the category to tell "try again" (`NetworkTransient`)
/// from "fix input" (`RemoteParamsInvalid`, `RemoteContentFiltered`)
/// from "wait longer" (`PollingTimeout`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    /// Connection abort/timeout, DNS miss, connection failure, 5xx or 429.
    NetworkTransient,
    RemoteAuthExpired,
    RemoteQuotaExhausted,
    RemoteContentFiltered,
    RemoteParamsInvalid,
    /// Terminal failure status while polling, or a generation-failed remote code.
    RemoteGenerationFailed,
    /// Any remote code or HTTP status absent from the lookup tables.
    RemoteUnknown,
    /// Poll or time limit reached without a single result.
    PollingTimeout,
    /// Poll or time limit reached with partial results.
    ///
    /// Never attached to an `AppError`: a degraded poll returns normally.
    PollingDegraded,
    /// The surrounding caller cancelled a sleep.
    Cancelled,
    /// Malformed URL, missing date token, bad configuration or undecodable body.
    InvalidRequest,
}

impl FailureCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureCategory::NetworkTransient => "network_transient",
            FailureCategory::RemoteAuthExpired => "remote_auth_expired",
            FailureCategory::RemoteQuotaExhausted => "remote_quota_exhausted",
            FailureCategory::RemoteContentFiltered => "remote_content_filtered",
            FailureCategory::RemoteParamsInvalid => "remote_params_invalid",
            FailureCategory::RemoteGenerationFailed => "remote_generation_failed",
            FailureCategory::RemoteUnknown => "remote_unknown",
            FailureCategory::PollingTimeout => "polling_timeout",
            FailureCategory::PollingDegraded => "polling_degraded",
            FailureCategory::Cancelled => "cancelled",
            FailureCategory::InvalidRequest => "invalid_request",
        }
    }

    /// Operator-facing remediation hint, where one exists.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            FailureCategory::RemoteAuthExpired => {
                Some("session expired; obtain a fresh token and update the configuration")
            }
            FailureCategory::RemoteQuotaExhausted => Some(
                "insufficient credits; try a 1024x1024 resolution or check the account balance",
            ),
            FailureCategory::NetworkTransient => Some("transient network failure; retry later"),
            FailureCategory::PollingTimeout => Some("the job produced nothing in time; retry later"),
            _ => None,
        }
    }
}

impl fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kind of network-layer fault observed by a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkFault {
    /// The request was aborted or timed out.
    Timeout,
    /// The host name could not be resolved.
    NameResolution,
    /// The connection could not be established or was reset.
    Connection,
    /// HTTP 5xx.
    ServerError(u16),
    /// HTTP 429.
    RateLimited,
    /// Any other HTTP status >= 400.
    HttpStatus(u16),
}

impl NetworkFault {
    /// Maps an HTTP status >= 400 to its fault kind.
    pub fn from_status(status: u16) -> Self {
        match status {
            429 => NetworkFault::RateLimited,
            500..=599 => NetworkFault::ServerError(status),
            _ => NetworkFault::HttpStatus(status),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            NetworkFault::ServerError(s) | NetworkFault::HttpStatus(s) => Some(*s),
            NetworkFault::RateLimited => Some(429),
            _ => None,
        }
    }
}

impl fmt::Display for NetworkFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkFault::Timeout => write!(f, "timeout"),
            NetworkFault::NameResolution => write!(f, "name resolution"),
            NetworkFault::Connection => write!(f, "connection"),
            NetworkFault::ServerError(s) => write!(f, "server error {s}"),
            NetworkFault::RateLimited => write!(f, "rate limited"),
            NetworkFault::HttpStatus(s) => write!(f, "HTTP {s}"),
        }
    }
}

/// Application-wide error type for Jimeng Relay.
#[derive(Error, Debug)]
pub enum AppError {
    /// Transport-level failure, or an HTTP status >= 400.
    #[error("Network error ({fault}): {message}")]
    Network { fault: NetworkFault, message: String },

    /// Well-formed envelope carrying a non-success `ret` code.
    #[error("Remote error {code} [{category}]: {message}")]
    Remote {
        category: FailureCategory,
        code: String,
        message: String,
    },

    /// The job reached the terminal failure status while polling.
    #[error(
        "{kind} generation failed [{category}]: status={status}, fail_code={}",
        .fail_code.as_deref().unwrap_or("none")
    )]
    GenerationFailed {
        category: FailureCategory,
        kind: JobKind,
        status: i64,
        fail_code: Option<String>,
        job_id: String,
    },

    /// Poll or time limit reached with zero results.
    #[error(
        "Polling timed out after {poll_count} polls ({elapsed_seconds}s), last status {status}, no results"
    )]
    PollingTimeout {
        poll_count: u32,
        elapsed_seconds: u64,
        status: i64,
        job_id: String,
    },

    /// A sleep was aborted by the caller's cancellation token.
    #[error("Operation cancelled")]
    Cancelled,

    /// The request could not be built or the response could not be decoded.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Configuration value missing or malformed.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl AppError {
    /// The stable category tag of this error.
    pub fn category(&self) -> FailureCategory {
        match self {
            AppError::Network { fault, .. } => classify::classify_fault(*fault),
            AppError::Remote { category, .. } | AppError::GenerationFailed { category, .. } => {
                *category
            }
            AppError::PollingTimeout { .. } => FailureCategory::PollingTimeout,
            AppError::Cancelled => FailureCategory::Cancelled,
            AppError::InvalidRequest(_)
            | AppError::ConfigError(_)
            | AppError::SerializationError(_) => FailureCategory::InvalidRequest,
        }
    }

    /// The raw remote code, fail code or HTTP status carried by this error.
    pub fn code(&self) -> Option<String> {
        match self {
            AppError::Network { fault, .. } => fault.status().map(|s| s.to_string()),
            AppError::Remote { code, .. } => Some(code.clone()),
            AppError::GenerationFailed { fail_code, .. } => fail_code.clone(),
            _ => None,
        }
    }

    /// Returns true if the request layer may retry after this error.
    ///
    /// Only network-layer faults qualify; remote application codes are final.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Network { .. })
    }
}
