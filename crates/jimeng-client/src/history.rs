//! Generation history lookups and the polling loop built on them.

use jimeng_core::client::RequestClient;
use jimeng_core::config::PollingConfig;
use jimeng_core::error::{AppError, FailureCategory};
use jimeng_core::job::JobStatus;
use jimeng_core::models::{CallOptions, Method};
use jimeng_core::poller::{PollingResult, SmartPoller};
use jimeng_core::signature::Credentials;
use jimeng_core::traits::Transport;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

pub const HISTORY_URI: &str = "/mweb/v1/get_history_by_ids";

/// Extracts the status snapshot and raw record for `history_id` from the
/// `data` of a history lookup.
pub fn parse_history(data: &Value, history_id: &str) -> Result<(JobStatus, Value), AppError> {
    let record = data
        .get(history_id)
        .filter(|r| r.is_object())
        .ok_or_else(|| AppError::Remote {
            category: FailureCategory::RemoteGenerationFailed,
            code: "record_not_found".to_string(),
            message: format!("History record not found: {history_id}"),
        })?;

    let status_code = record.get("status").and_then(as_i64).unwrap_or_default();
    let item_count = record
        .get("item_list")
        .and_then(Value::as_array)
        .map_or(0, |items| items.len() as u32);

    let mut status = JobStatus::new(history_id, status_code, item_count);
    if let Some(fail_code) = record.get("fail_code").and_then(as_code) {
        status = status.with_fail_code(fail_code);
    }
    if let Some(finish) = record.pointer("/task/finish_time").and_then(as_i64) {
        status = status.with_finish_timestamp(finish);
    }

    Ok((status, record.clone()))
}

fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Fail codes arrive as strings or numbers; empty and zero mean none.
fn as_code(value: &Value) -> Option<String> {
    let code = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!code.is_empty() && code != "0").then_some(code)
}

/// One status probe for `history_id`.
pub async fn probe_history<T: Transport>(
    client: &RequestClient<T>,
    credentials: &Credentials,
    history_id: &str,
    cancel: &CancellationToken,
) -> Result<(JobStatus, Value), AppError> {
    let body = json!({
        "history_ids": [history_id],
        "http_common_info": { "aid": client.config().region.assistant_id() },
    });
    let data = client
        .call(Method::Post, HISTORY_URI, credentials, &CallOptions::json(body), cancel)
        .await?;
    parse_history(&data, history_id)
}

/// Polls `history_id` until it finishes, returning the final record.
pub async fn wait_for_history<T: Transport>(
    client: &RequestClient<T>,
    credentials: &Credentials,
    history_id: &str,
    config: PollingConfig,
    cancel: &CancellationToken,
) -> Result<(PollingResult, Value), AppError> {
    SmartPoller::new(config)
        .for_job(history_id)
        .poll(
            || probe_history(client, credentials, history_id, cancel),
            cancel,
        )
        .await
}

const URL_POINTERS: [&str; 4] = [
    "/image/large_images/0/image_url",
    "/common_attr/cover_url",
    "/image_url",
    "/url",
];

/// Image URLs of a finished record, in result order.
///
/// Each item is tried for a large image, its cover, then a bare
/// `image_url` or `url` field. Items without any are skipped.
pub fn image_urls(record: &Value) -> Vec<String> {
    let items = record
        .get("item_list")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let urls: Vec<String> = items
        .iter()
        .enumerate()
        .filter_map(|(index, item)| {
            let url = URL_POINTERS
                .iter()
                .find_map(|path| item.pointer(path).and_then(Value::as_str));
            if url.is_none() {
                tracing::warn!(index, %item, "No URL found in result item");
            }
            url.map(str::to_owned)
        })
        .collect();

    if urls.is_empty() && !items.is_empty() {
        tracing::error!(
            items = items.len(),
            "Result items present but no image URL could be extracted"
        );
    }
    urls
}
