use std::error::Error as _;
use std::time::Duration;

use jimeng_core::classify;
use jimeng_core::error::{AppError, NetworkFault};
use jimeng_core::models::{Method, OutgoingRequest, RawResponse};
use jimeng_core::traits::Transport;
use reqwest::Client;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};

const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36";

/// HTTP transport using reqwest.
///
/// Sends signed requests and hands back every response regardless of
/// status. Failures before a response arrives become
/// [`AppError::Network`] with the matching [`NetworkFault`].
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, AppError> {
        Self::with_timeout(Duration::from_secs(45))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, AppError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json, text/plain, */*"));

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::ConfigError(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self { client })
    }
}

impl Transport for ReqwestTransport {
    async fn send(&self, request: &OutgoingRequest) -> Result<RawResponse, AppError> {
        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| classify::network_error(fault_of(&e), e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| classify::network_error(fault_of(&e), format!("Failed to read response body: {e}")))?;

        Ok(RawResponse::new(status, body))
    }
}

fn fault_of(e: &reqwest::Error) -> NetworkFault {
    if e.is_timeout() {
        NetworkFault::Timeout
    } else if e.is_connect() && is_name_resolution(e) {
        NetworkFault::NameResolution
    } else {
        NetworkFault::Connection
    }
}

/// Whether a connect error was caused by a DNS lookup failure.
fn is_name_resolution(e: &reqwest::Error) -> bool {
    let mut source = e.source();
    while let Some(cause) = source {
        let text = cause.to_string().to_lowercase();
        if text.contains("dns error") || text.contains("failed to lookup address") {
            return true;
        }
        source = cause.source();
    }
    false
}
