//! Test utilities: in-memory transport, scripted probes and a recording reporter.
//!
//! All mocks use `Arc<Mutex<_>>` for interior mutability, allowing
//! test assertions on recorded calls.

use std::collections::VecDeque;
use std::future::{Ready, ready};
use std::sync::{Arc, Mutex};

use serde_json::{Value, json};

use crate::classify;
use crate::error::{AppError, NetworkFault};
use crate::job::JobStatus;
use crate::models::{OutgoingRequest, RawResponse};
use crate::poller::{PollEvent, PollReporter};
use crate::traits::Transport;

// ---------------------------------------------------------------------------
// MockTransport
// ---------------------------------------------------------------------------

/// Transport returning queued responses and recording every request.
///
/// An empty queue answers with a successful envelope carrying `null` data.
#[derive(Clone, Default)]
pub struct MockTransport {
    responses: Arc<Mutex<VecDeque<Result<RawResponse, AppError>>>>,
    requests: Arc<Mutex<Vec<OutgoingRequest>>>,
    fault: Option<NetworkFault>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every send fails with `fault`.
    pub fn always_failing(fault: NetworkFault) -> Self {
        Self {
            fault: Some(fault),
            ..Self::default()
        }
    }

    pub fn push_response(&self, response: RawResponse) {
        self.responses.lock().unwrap().push_back(Ok(response));
    }

    pub fn push_json(&self, body: Value) {
        self.push_response(RawResponse::ok_json(&body));
    }

    pub fn push_error(&self, error: AppError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    pub fn requests(&self) -> Vec<OutgoingRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Transport for MockTransport {
    async fn send(&self, request: &OutgoingRequest) -> Result<RawResponse, AppError> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(fault) = self.fault {
            return Err(classify::network_error(fault, "mock transport fault"));
        }
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(RawResponse::ok_json(&json!({"ret": "0", "data": null}))))
    }
}

// ---------------------------------------------------------------------------
// ProbeScript
// ---------------------------------------------------------------------------

/// Scripted status probe. Returns each status in turn, then repeats the last.
///
/// The payload of each round is its item count.
pub struct ProbeScript {
    statuses: Mutex<VecDeque<JobStatus>>,
    last: Mutex<Option<JobStatus>>,
    calls: Mutex<u32>,
}

impl ProbeScript {
    pub fn new(statuses: Vec<JobStatus>) -> Self {
        Self {
            statuses: Mutex::new(statuses.into()),
            last: Mutex::new(None),
            calls: Mutex::new(0),
        }
    }

    pub fn repeating(status: JobStatus) -> Self {
        Self::new(vec![status])
    }

    pub fn next(&self) -> Ready<Result<(JobStatus, u32), AppError>> {
        *self.calls.lock().unwrap() += 1;
        let mut last = self.last.lock().unwrap();
        if let Some(status) = self.statuses.lock().unwrap().pop_front() {
            *last = Some(status);
        }
        let status = last.clone().expect("probe script must not be empty");
        let items = status.item_count;
        ready(Ok((status, items)))
    }

    pub fn calls(&self) -> u32 {
        *self.calls.lock().unwrap()
    }
}

// ---------------------------------------------------------------------------
// RecordingReporter
// ---------------------------------------------------------------------------

/// Poll reporter that records event names in order.
#[derive(Clone, Default)]
pub struct RecordingReporter {
    events: Arc<Mutex<Vec<String>>>,
}

impl RecordingReporter {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

impl PollReporter for RecordingReporter {
    fn report(&self, event: PollEvent<'_>) {
        self.events.lock().unwrap().push(event.name().to_string());
    }
}
