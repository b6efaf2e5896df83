pub mod classify;
pub mod client;
pub mod config;
pub mod error;
pub mod job;
pub mod models;
pub mod poller;
pub mod retry;
pub mod signature;
pub mod traits;

#[cfg(test)]
mod testutil;

pub use client::RequestClient;
pub use config::{ClientConfig, PollingConfig, Region};
pub use error::{AppError, FailureCategory, NetworkFault};
pub use job::{JobKind, JobStatus};
pub use models::{CallOptions, Method, OutgoingRequest, RawResponse};
pub use poller::{ExitReason, PollReporter, PollingResult, SmartPoller, TracingPollReporter};
pub use retry::RetryPolicy;
pub use signature::{Credentials, SignatureContext};
pub use traits::Transport;
