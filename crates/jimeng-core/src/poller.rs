//! Adaptive polling of a single remote generation job.
//!
//! A [`SmartPoller`] drives a caller-supplied probe until the job reaches a
//! terminal status, delivers its full result set, stops changing, or runs
//! out of rounds or time. The wait between rounds scales with the status the
//! remote service last reported.
//!
//! Polling events are reported through the [`PollReporter`] trait, so the
//! same loop can log via `tracing` in production and record events in tests.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::classify;
use crate::config::PollingConfig;
use crate::error::AppError;
use crate::job::{self, JobKind, JobStatus, RemoteStatus};

/// A progress event is reported every this many rounds.
pub const PROGRESS_EVERY: u32 = 30;

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Why the polling loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExitReason {
    Success,
    Failure,
    CompleteResultSet,
    StableResult,
    PollLimit,
    TimeLimitPartial,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::Success => "success",
            ExitReason::Failure => "failure",
            ExitReason::CompleteResultSet => "complete-result-set",
            ExitReason::StableResult => "stable-result",
            ExitReason::PollLimit => "poll-limit",
            ExitReason::TimeLimitPartial => "time-limit-partial",
        }
    }

    /// True for the resource-limit exits.
    pub fn is_limit(&self) -> bool {
        matches!(self, ExitReason::PollLimit | ExitReason::TimeLimitPartial)
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Final outcome of one polling loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PollingResult {
    pub final_status_code: i64,
    pub fail_code: Option<String>,
    pub item_count: u32,
    pub elapsed_seconds: u64,
    pub poll_count: u32,
    pub exit_reason: ExitReason,
}

impl PollingResult {
    /// A limit was hit but partial results are available.
    pub fn is_degraded(&self) -> bool {
        self.exit_reason.is_limit() && self.item_count > 0
    }
}

// ---------------------------------------------------------------------------
// Reporter
// ---------------------------------------------------------------------------

/// Events emitted during polling.
#[derive(Debug)]
pub enum PollEvent<'a> {
    Started {
        job_id: &'a str,
        kind: JobKind,
        config: &'a PollingConfig,
    },
    Round {
        job_id: &'a str,
        poll_count: u32,
        status: &'a JobStatus,
        elapsed_seconds: u64,
        next_delay: Duration,
    },
    ItemsDetected {
        job_id: &'a str,
        item_count: u32,
        expected: u32,
    },
    UnknownStatus {
        job_id: &'a str,
        status_code: i64,
    },
    Progress {
        job_id: &'a str,
        poll_count: u32,
        max_poll_count: u32,
        status_code: i64,
        item_count: u32,
        elapsed_seconds: u64,
    },
    Degraded {
        job_id: &'a str,
        result: &'a PollingResult,
    },
    Finished {
        job_id: &'a str,
        result: &'a PollingResult,
    },
}

impl PollEvent<'_> {
    pub fn name(&self) -> &'static str {
        match self {
            PollEvent::Started { .. } => "started",
            PollEvent::Round { .. } => "round",
            PollEvent::ItemsDetected { .. } => "items_detected",
            PollEvent::UnknownStatus { .. } => "unknown_status",
            PollEvent::Progress { .. } => "progress",
            PollEvent::Degraded { .. } => "degraded",
            PollEvent::Finished { .. } => "finished",
        }
    }
}

/// Receives polling events. The default implementation ignores them.
pub trait PollReporter: Send + Sync {
    fn report(&self, event: PollEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingPollReporter;

impl PollReporter for TracingPollReporter {
    fn report(&self, event: PollEvent<'_>) {
        match event {
            PollEvent::Started {
                job_id,
                kind,
                config,
            } => {
                tracing::info!(
                    %job_id,
                    %kind,
                    max_poll_count = config.max_poll_count,
                    poll_interval_ms = config.poll_interval.as_millis() as u64,
                    timeout_seconds = config.timeout_seconds,
                    expected_items = config.expected_item_count,
                    "Polling started"
                );
            }
            PollEvent::Round {
                job_id,
                poll_count,
                status,
                elapsed_seconds,
                next_delay,
            } => {
                tracing::debug!(
                    %job_id,
                    %poll_count,
                    status = %job::status_label(status.status_code),
                    item_count = status.item_count,
                    %elapsed_seconds,
                    next_delay_ms = next_delay.as_millis() as u64,
                    "Poll round"
                );
            }
            PollEvent::ItemsDetected {
                job_id,
                item_count,
                expected,
            } => {
                tracing::info!(%job_id, %item_count, %expected, "Results detected");
            }
            PollEvent::UnknownStatus {
                job_id,
                status_code,
            } => {
                tracing::warn!(%job_id, %status_code, "Unknown status code, polling continues");
            }
            PollEvent::Progress {
                job_id,
                poll_count,
                max_poll_count,
                status_code,
                item_count,
                elapsed_seconds,
            } => {
                tracing::info!(
                    %job_id,
                    "Polling progress: {poll_count}/{max_poll_count}, status {}, {item_count} items, {elapsed_seconds}s",
                    job::status_label(status_code)
                );
            }
            PollEvent::Degraded { job_id, result } => {
                tracing::warn!(
                    %job_id,
                    exit_reason = %result.exit_reason,
                    item_count = result.item_count,
                    poll_count = result.poll_count,
                    elapsed_seconds = result.elapsed_seconds,
                    "Polling limit reached, returning partial results"
                );
            }
            PollEvent::Finished { job_id, result } => {
                tracing::info!(
                    %job_id,
                    exit_reason = %result.exit_reason,
                    status = %job::status_label(result.final_status_code),
                    item_count = result.item_count,
                    poll_count = result.poll_count,
                    elapsed_seconds = result.elapsed_seconds,
                    "Polling finished"
                );
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Poller
// ---------------------------------------------------------------------------

/// Polls one job. Consumed by [`SmartPoller::poll`]; build a new one per job.
pub struct SmartPoller<R = TracingPollReporter> {
    config: PollingConfig,
    reporter: R,
    job_id: Option<String>,
    poll_count: u32,
    last_item_count: u32,
    stable_item_count_rounds: u32,
    start_time: Option<Instant>,
}

impl SmartPoller<TracingPollReporter> {
    pub fn new(config: PollingConfig) -> Self {
        Self::with_reporter(config, TracingPollReporter)
    }
}

impl<R: PollReporter> SmartPoller<R> {
    pub fn with_reporter(mut config: PollingConfig, reporter: R) -> Self {
        config.max_poll_count = config.max_poll_count.max(1);
        Self {
            config,
            reporter,
            job_id: None,
            poll_count: 0,
            last_item_count: 0,
            stable_item_count_rounds: 0,
            start_time: None,
        }
    }

    /// Tags log lines and errors with `job_id`.
    pub fn for_job(mut self, job_id: impl Into<String>) -> Self {
        self.job_id = Some(job_id.into());
        self
    }

    pub fn config(&self) -> &PollingConfig {
        &self.config
    }

    /// Wait before the next round given the last reported status.
    pub fn next_interval(&self, status_code: i64) -> Duration {
        self.config
            .poll_interval
            .mul_f64(job::delay_multiplier(status_code))
    }

    fn update_stability(&mut self, item_count: u32) {
        if item_count == self.last_item_count {
            self.stable_item_count_rounds += 1;
        } else {
            self.stable_item_count_rounds = 0;
            self.last_item_count = item_count;
        }
    }

    /// First matching exit condition for this round, in priority order.
    fn evaluate(&self, status: &JobStatus, elapsed_seconds: u64) -> Option<ExitReason> {
        let remote = status.remote_status();
        if remote.is_some_and(|s| s.is_terminal_success()) {
            return Some(ExitReason::Success);
        }
        if remote.is_some_and(|s| s.is_terminal_failure()) {
            return Some(ExitReason::Failure);
        }
        if status.item_count >= self.config.expected_item_count {
            return Some(ExitReason::CompleteResultSet);
        }
        if self.stable_item_count_rounds >= self.config.stable_rounds && status.item_count > 0 {
            return Some(ExitReason::StableResult);
        }
        if self.poll_count >= self.config.max_poll_count {
            return Some(ExitReason::PollLimit);
        }
        if elapsed_seconds >= self.config.timeout_seconds && status.item_count > 0 {
            return Some(ExitReason::TimeLimitPartial);
        }
        None
    }

    fn elapsed_seconds(&self) -> u64 {
        self.start_time
            .map(|start| start.elapsed().as_secs_f64().round() as u64)
            .unwrap_or(0)
    }

    /// Runs the polling loop until an exit condition matches.
    ///
    /// `probe` performs one status check and returns the decoded status plus
    /// an opaque payload; the payload of the final round is returned next to
    /// the [`PollingResult`]. Probe errors propagate unchanged.
    ///
    /// # Errors
    ///
    /// - [`AppError::GenerationFailed`] when the job reports the failure status
    /// - [`AppError::PollingTimeout`] when a limit is hit with zero results
    /// - [`AppError::Cancelled`] when `cancel` fires before a probe or during a sleep
    pub async fn poll<T, F, Fut>(
        mut self,
        mut probe: F,
        cancel: &CancellationToken,
    ) -> Result<(PollingResult, T), AppError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(JobStatus, T), AppError>>,
    {
        let kind = self.config.job_kind;
        let configured_id = self.job_id.clone();
        self.reporter.report(PollEvent::Started {
            job_id: configured_id.as_deref().unwrap_or("-"),
            kind,
            config: &self.config,
        });

        loop {
            if cancel.is_cancelled() {
                return Err(AppError::Cancelled);
            }

            self.poll_count += 1;
            self.start_time.get_or_insert_with(Instant::now);

            let (status, payload) = match probe().await {
                Ok(round) => round,
                Err(e) => {
                    tracing::error!(
                        job_id = configured_id.as_deref().unwrap_or("-"),
                        poll_count = self.poll_count,
                        category = %e.category(),
                        error = %e,
                        "Status probe failed"
                    );
                    return Err(e);
                }
            };
            let job_id = configured_id.as_deref().unwrap_or(&status.job_id);

            self.update_stability(status.item_count);
            let elapsed_seconds = self.elapsed_seconds();

            if status.item_count > 0 {
                self.reporter.report(PollEvent::ItemsDetected {
                    job_id,
                    item_count: status.item_count,
                    expected: self.config.expected_item_count,
                });
            }

            if let Some(exit_reason) = self.evaluate(&status, elapsed_seconds) {
                let result = PollingResult {
                    final_status_code: status.status_code,
                    fail_code: status.fail_code.clone(),
                    item_count: status.item_count,
                    elapsed_seconds,
                    poll_count: self.poll_count,
                    exit_reason,
                };
                self.reporter.report(PollEvent::Finished {
                    job_id,
                    result: &result,
                });
                return self.finish(result, payload, kind, job_id);
            }

            if RemoteStatus::from_code(status.status_code).is_none() {
                self.reporter.report(PollEvent::UnknownStatus {
                    job_id,
                    status_code: status.status_code,
                });
            }

            if self.poll_count % PROGRESS_EVERY == 0 {
                self.reporter.report(PollEvent::Progress {
                    job_id,
                    poll_count: self.poll_count,
                    max_poll_count: self.config.max_poll_count,
                    status_code: status.status_code,
                    item_count: status.item_count,
                    elapsed_seconds,
                });
            }

            let delay = self.next_interval(status.status_code);
            self.reporter.report(PollEvent::Round {
                job_id,
                poll_count: self.poll_count,
                status: &status,
                elapsed_seconds,
                next_delay: delay,
            });

            if !delay.is_zero() {
                tokio::select! {
                    () = tokio::time::sleep(delay) => {}
                    () = cancel.cancelled() => {
                        tracing::info!(%job_id, poll_count = self.poll_count, "Polling cancelled");
                        return Err(AppError::Cancelled);
                    }
                }
            }
        }
    }

    fn finish<T>(
        &self,
        result: PollingResult,
        payload: T,
        kind: JobKind,
        job_id: &str,
    ) -> Result<(PollingResult, T), AppError> {
        match result.exit_reason {
            ExitReason::Failure => Err(classify::generation_failure(
                kind,
                result.final_status_code,
                result.fail_code.as_deref(),
                job_id,
            )),
            reason if reason.is_limit() && result.item_count == 0 => Err(classify::polling_timeout(
                result.poll_count,
                result.elapsed_seconds,
                result.final_status_code,
                job_id,
            )),
            _ => {
                if result.is_degraded() {
                    self.reporter.report(PollEvent::Degraded {
                        job_id,
                        result: &result,
                    });
                }
                Ok((result, payload))
            }
        }
    }
}
