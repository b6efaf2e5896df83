//! Error classification.
//!
//! Translates remote application codes, network faults and terminal job
//! fail codes into a [`FailureCategory`], and builds the matching
//! [`AppError`]. Every lookup falls back to a generic category carrying the
//! raw code, so nothing is silently swallowed.

use crate::error::{AppError, FailureCategory, NetworkFault};
use crate::job::JobKind;

/// Remote `ret` codes with a dedicated category.
pub const REMOTE_CODE_TABLE: &[(&str, FailureCategory)] = &[
    ("1015", FailureCategory::RemoteAuthExpired),
    ("5000", FailureCategory::RemoteQuotaExhausted),
    ("4001", FailureCategory::RemoteContentFiltered),
    ("4002", FailureCategory::RemoteParamsInvalid),
    ("5001", FailureCategory::RemoteGenerationFailed),
    ("5002", FailureCategory::RemoteGenerationFailed),
];

/// Fail codes reported alongside the terminal failure status.
pub const FAIL_CODE_TABLE: &[(&str, FailureCategory)] =
    &[("2038", FailureCategory::RemoteContentFiltered)];

/// Category for a remote application code.
pub fn classify_remote(code: &str) -> FailureCategory {
    REMOTE_CODE_TABLE
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, category)| *category)
        .unwrap_or(FailureCategory::RemoteUnknown)
}

/// Category for a network-layer fault.
pub fn classify_fault(fault: NetworkFault) -> FailureCategory {
    match fault {
        NetworkFault::Timeout
        | NetworkFault::NameResolution
        | NetworkFault::Connection
        | NetworkFault::ServerError(_)
        | NetworkFault::RateLimited => FailureCategory::NetworkTransient,
        NetworkFault::HttpStatus(_) => FailureCategory::RemoteUnknown,
    }
}

/// Category for the fail code of a job that reached the terminal failure status.
pub fn classify_fail_code(fail_code: Option<&str>) -> FailureCategory {
    fail_code
        .and_then(|code| FAIL_CODE_TABLE.iter().find(|(c, _)| *c == code))
        .map(|(_, category)| *category)
        .unwrap_or(FailureCategory::RemoteGenerationFailed)
}

/// Builds the error for a non-success envelope.
pub fn remote_error(code: &str, message: &str) -> AppError {
    let category = classify_remote(code);
    tracing::error!(%code, %category, errmsg = %message, "Remote request failed");
    AppError::Remote {
        category,
        code: code.to_string(),
        message: message.to_string(),
    }
}

/// Builds the error for a network-layer fault.
pub fn network_error(fault: NetworkFault, message: impl Into<String>) -> AppError {
    AppError::Network {
        fault,
        message: message.into(),
    }
}

/// Builds the error for a job that reached the terminal failure status.
pub fn generation_failure(
    kind: JobKind,
    status: i64,
    fail_code: Option<&str>,
    job_id: &str,
) -> AppError {
    let category = classify_fail_code(fail_code);
    tracing::error!(
        %kind,
        %status,
        fail_code = fail_code.unwrap_or("none"),
        %job_id,
        %category,
        "Generation failed"
    );
    AppError::GenerationFailed {
        category,
        kind,
        status,
        fail_code: fail_code.map(str::to_owned),
        job_id: job_id.to_string(),
    }
}

/// Builds the error for a poll that hit its limits without any result.
pub fn polling_timeout(poll_count: u32, elapsed_seconds: u64, status: i64, job_id: &str) -> AppError {
    tracing::warn!(
        %poll_count,
        %elapsed_seconds,
        %status,
        %job_id,
        "Polling timed out with no results"
    );
    AppError::PollingTimeout {
        poll_count,
        elapsed_seconds,
        status,
        job_id: job_id.to_string(),
    }
}
