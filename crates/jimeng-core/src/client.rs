use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::classify;
use crate::config::ClientConfig;
use crate::error::{AppError, NetworkFault};
use crate::models::{CallOptions, Method, OutgoingRequest, RawResponse};
use crate::retry::with_retry;
use crate::signature::{self, Credentials, SignatureContext};
use crate::traits::Transport;

/// `ret` value denoting application-level success.
pub const SUCCESS_RET: &str = "0";

/// Issues signed, retrying calls to the remote service.
///
/// Stateless per call apart from its immutable configuration; clones share
/// the configuration and the transport, so one client can serve many
/// concurrent pollers.
#[derive(Clone)]
pub struct RequestClient<T> {
    transport: T,
    config: Arc<ClientConfig>,
}

impl<T: Transport> RequestClient<T> {
    pub fn new(transport: T, config: ClientConfig) -> Self {
        Self {
            transport,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Performs one logical call and returns the envelope's `data`.
    ///
    /// Network faults and HTTP statuses >= 400 are retried per the configured
    /// policy. A well-formed envelope with a non-success `ret` is classified
    /// and returned immediately, as is one carried by the final HTTP error.
    pub async fn call(
        &self,
        method: Method,
        uri: &str,
        credentials: &Credentials,
        options: &CallOptions,
        cancel: &CancellationToken,
    ) -> Result<Value, AppError> {
        let url = self.config.build_url(uri, options)?;
        let body = match (&options.body, method) {
            (Some(body), Method::Post) => Some(serde_json::to_string(body)?),
            _ => None,
        };

        tracing::info!(%method, %url, "Sending request");

        let context = format!("{method} {uri}");
        let url = &url;
        let body = body.as_deref();
        let headers = options.headers.as_slice();
        let max_retries = self.config.retry.max_retries;
        let response = with_retry(&self.config.retry, cancel, &context, move |attempt| async move {
            if attempt > 0 {
                tracing::info!(%method, %url, %attempt, "Retrying request");
            }
            let request = self.prepare(method, url, credentials, body, headers)?;
            let response = self.transport.send(&request).await?;
            tracing::debug!(status = response.status, body = %response.summary(), "Response received");
            // The last attempt keeps its error response for the envelope check.
            if response.status >= 400 && attempt < max_retries {
                return Err(http_error(&response, url));
            }
            Ok(response)
        })
        .await?;

        if response.status >= 400 {
            return Err(exhausted_http_error(&response, url));
        }
        check_result(&response)
    }

    fn prepare(
        &self,
        method: Method,
        url: &Url,
        credentials: &Credentials,
        body: Option<&str>,
        extra_headers: &[(String, String)],
    ) -> Result<OutgoingRequest, AppError> {
        let date = vec![(signature::DATE_HEADER.to_string(), signature::amz_date(Utc::now()))];
        let ctx = SignatureContext {
            method,
            url: url.as_str(),
            headers: &date,
            credentials,
            payload: body,
            scope: &self.config.signing_scope,
        };

        let mut headers = signature::signed_headers(&ctx)?;
        if body.is_some() {
            headers.push(("content-type".to_string(), "application/json".to_string()));
        }
        headers.extend(extra_headers.iter().cloned());

        Ok(OutgoingRequest {
            method,
            url: url.to_string(),
            headers,
            body: body.map(str::to_owned),
        })
    }
}

fn http_error(response: &RawResponse, url: &Url) -> AppError {
    classify::network_error(
        NetworkFault::from_status(response.status),
        format!("HTTP {} for {}: {}", response.status, url, response.summary()),
    )
}

/// Error for an HTTP failure status once retries are spent. A failing
/// envelope in the body wins over the bare status.
fn exhausted_http_error(response: &RawResponse, url: &Url) -> AppError {
    match check_result(response) {
        Err(e @ AppError::Remote { .. }) => e,
        _ => http_error(response, url),
    }
}

/// Unwraps the `{ ret, errmsg, data }` envelope.
///
/// - `ret == "0"` (string or number): returns `data`, or `null` when absent
/// - `ret` missing or non-numeric: returns the whole body unchanged
/// - any other `ret`, including a blank string: classified remote error
pub fn check_result(response: &RawResponse) -> Result<Value, AppError> {
    let mut body: Value = serde_json::from_str(&response.body).map_err(|e| {
        AppError::InvalidRequest(format!(
            "Undecodable response body ({e}): {}",
            response.summary()
        ))
    })?;

    let ret = match body.get("ret") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => return Ok(body),
    };
    let numeric = ret.trim().is_empty() || ret.trim().parse::<f64>().is_ok_and(f64::is_finite);
    if !numeric {
        return Ok(body);
    }
    if ret == SUCCESS_RET {
        return Ok(body.get_mut("data").map(Value::take).unwrap_or(Value::Null));
    }

    let errmsg = body.get("errmsg").and_then(Value::as_str).unwrap_or_default();
    Err(classify::remote_error(&ret, errmsg))
}
