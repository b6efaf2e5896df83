use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Kind of generation job being polled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Image,
    Video,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Image => "image",
            JobKind::Video => "video",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JobKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "image" => Ok(JobKind::Image),
            "video" => Ok(JobKind::Video),
            _ => Err(format!("Unknown job kind: {}", s)),
        }
    }
}

/// Status codes the remote service is known to report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteStatus {
    Processing,
    Success,
    Failed,
    PostProcessing,
    Finalizing,
    Completed,
}

/// One row of the status lookup table.
#[derive(Debug, Clone, Copy)]
pub struct StatusEntry {
    pub status: RemoteStatus,
    pub code: i64,
    pub label: &'static str,
    /// Applied to the base poll interval while the job sits in this status.
    pub delay_multiplier: f64,
}

pub const STATUS_TABLE: [StatusEntry; 6] = [
    StatusEntry {
        status: RemoteStatus::Processing,
        code: 20,
        label: "PROCESSING",
        delay_multiplier: 1.0,
    },
    StatusEntry {
        status: RemoteStatus::Success,
        code: 10,
        label: "SUCCESS",
        delay_multiplier: 0.0,
    },
    StatusEntry {
        status: RemoteStatus::Failed,
        code: 30,
        label: "FAILED",
        delay_multiplier: 0.0,
    },
    StatusEntry {
        status: RemoteStatus::PostProcessing,
        code: 42,
        label: "POST_PROCESSING",
        delay_multiplier: 1.2,
    },
    StatusEntry {
        status: RemoteStatus::Finalizing,
        code: 45,
        label: "FINALIZING",
        delay_multiplier: 1.5,
    },
    StatusEntry {
        status: RemoteStatus::Completed,
        code: 50,
        label: "COMPLETED",
        delay_multiplier: 0.5,
    },
];

/// Multiplier used for codes outside [`STATUS_TABLE`].
pub const UNKNOWN_STATUS_MULTIPLIER: f64 = 1.0;

impl RemoteStatus {
    fn entry(code: i64) -> Option<&'static StatusEntry> {
        STATUS_TABLE.iter().find(|e| e.code == code)
    }

    pub fn from_code(code: i64) -> Option<Self> {
        Self::entry(code).map(|e| e.status)
    }

    pub fn code(&self) -> i64 {
        self.table_entry().code
    }

    pub fn label(&self) -> &'static str {
        self.table_entry().label
    }

    pub fn delay_multiplier(&self) -> f64 {
        self.table_entry().delay_multiplier
    }

    /// `Success` and `Completed` both end a job successfully.
    pub fn is_terminal_success(&self) -> bool {
        matches!(self, RemoteStatus::Success | RemoteStatus::Completed)
    }

    pub fn is_terminal_failure(&self) -> bool {
        matches!(self, RemoteStatus::Failed)
    }

    fn table_entry(&self) -> &'static StatusEntry {
        match self {
            RemoteStatus::Processing => &STATUS_TABLE[0],
            RemoteStatus::Success => &STATUS_TABLE[1],
            RemoteStatus::Failed => &STATUS_TABLE[2],
            RemoteStatus::PostProcessing => &STATUS_TABLE[3],
            RemoteStatus::Finalizing => &STATUS_TABLE[4],
            RemoteStatus::Completed => &STATUS_TABLE[5],
        }
    }
}

/// Human-readable label for a status code, `UNKNOWN(<code>)` when unrecognised.
pub fn status_label(code: i64) -> Cow<'static, str> {
    match RemoteStatus::from_code(code) {
        Some(status) => Cow::Borrowed(status.label()),
        None => Cow::Owned(format!("UNKNOWN({code})")),
    }
}

/// Delay multiplier for a status code.
pub fn delay_multiplier(code: i64) -> f64 {
    RemoteStatus::from_code(code)
        .map(|s| s.delay_multiplier())
        .unwrap_or(UNKNOWN_STATUS_MULTIPLIER)
}

/// Snapshot of a remote job, produced once per probe round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatus {
    pub status_code: i64,
    pub fail_code: Option<String>,
    pub item_count: u32,
    pub finish_timestamp: Option<i64>,
    pub job_id: String,
}

impl JobStatus {
    pub fn new(job_id: impl Into<String>, status_code: i64, item_count: u32) -> Self {
        Self {
            status_code,
            fail_code: None,
            item_count,
            finish_timestamp: None,
            job_id: job_id.into(),
        }
    }

    pub fn with_fail_code(mut self, fail_code: impl Into<String>) -> Self {
        self.fail_code = Some(fail_code.into());
        self
    }

    pub fn with_finish_timestamp(mut self, finish_timestamp: i64) -> Self {
        self.finish_timestamp = Some(finish_timestamp);
        self
    }

    pub fn remote_status(&self) -> Option<RemoteStatus> {
        RemoteStatus::from_code(self.status_code)
    }
}
