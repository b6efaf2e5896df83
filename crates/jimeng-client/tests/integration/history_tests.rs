use std::time::Duration;

use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use jimeng_client::history::{image_urls, probe_history, wait_for_history};
use jimeng_core::config::PollingConfig;
use jimeng_core::error::{AppError, FailureCategory};
use jimeng_core::job::JobKind;
use jimeng_core::poller::ExitReason;

use crate::common::{credentials, envelope, spawn_server, status};

fn record(status: i64, fail_code: &str, images: usize) -> Value {
    let items: Vec<Value> = (0..images)
        .map(|i| json!({ "image": { "large_images": [{ "image_url": format!("https://img/{i}.png") }] } }))
        .collect();
    json!({
        "status": status,
        "fail_code": fail_code,
        "item_list": items,
        "task": { "finish_time": 0 }
    })
}

fn history(id: &str, record: Value) -> (u16, String) {
    let mut data = serde_json::Map::new();
    data.insert(id.to_string(), record);
    envelope(Value::Object(data))
}

fn fast_config() -> PollingConfig {
    PollingConfig::for_kind(JobKind::Image)
        .with_poll_interval(Duration::from_millis(10))
        .with_max_poll_count(20)
}

#[tokio::test]
async fn probe_sends_history_lookup() -> anyhow::Result<()> {
    let server = spawn_server(vec![history("H1", record(20, "", 0))]).await;
    let client = server.client(0);

    let (status, _) =
        probe_history(&client, &credentials(), "H1", &CancellationToken::new()).await?;

    assert_eq!(status.status_code, 20);
    assert_eq!(status.item_count, 0);
    let request = &server.requests()[0];
    assert_eq!(request.path, "/mweb/v1/get_history_by_ids");
    let body: Value = serde_json::from_str(&request.body)?;
    assert_eq!(body["history_ids"], json!(["H1"]));
    assert_eq!(body["http_common_info"]["aid"], json!(513695));
    Ok(())
}

#[tokio::test]
async fn polls_until_generation_completes() -> anyhow::Result<()> {
    let server = spawn_server(vec![
        history("H1", record(20, "", 0)),
        history("H1", record(42, "", 0)),
        history("H1", record(45, "", 2)),
        history("H1", record(50, "", 4)),
    ])
    .await;
    let client = server.client(0);

    let (result, final_record) = wait_for_history(
        &client,
        &credentials(),
        "H1",
        fast_config(),
        &CancellationToken::new(),
    )
    .await?;

    assert_eq!(result.exit_reason, ExitReason::Success);
    assert_eq!(result.final_status_code, 50);
    assert_eq!(result.item_count, 4);
    assert_eq!(result.poll_count, 4);
    assert_eq!(server.hits(), 4);
    assert_eq!(image_urls(&final_record).len(), 4);
    Ok(())
}

#[tokio::test]
async fn transient_probe_failures_are_retried_inside_the_request() -> anyhow::Result<()> {
    let server = spawn_server(vec![
        status(503, "busy"),
        history("H1", record(10, "", 1)),
    ])
    .await;
    let client = server.client(2);

    let (result, _) = wait_for_history(
        &client,
        &credentials(),
        "H1",
        fast_config(),
        &CancellationToken::new(),
    )
    .await?;

    assert_eq!(result.poll_count, 1);
    assert_eq!(server.hits(), 2);
    Ok(())
}

#[tokio::test]
async fn filtered_content_fails_the_poll() {
    let server = spawn_server(vec![history("H1", record(30, "2038", 0))]).await;
    let client = server.client(0);

    let err = wait_for_history(
        &client,
        &credentials(),
        "H1",
        fast_config(),
        &CancellationToken::new(),
    )
    .await
    .unwrap_err();

    assert_eq!(err.category(), FailureCategory::RemoteContentFiltered);
    assert!(matches!(
        err,
        AppError::GenerationFailed { ref fail_code, .. } if fail_code.as_deref() == Some("2038")
    ));
    assert_eq!(server.hits(), 1);
}

#[tokio::test]
async fn missing_record_fails_the_poll() {
    let server = spawn_server(vec![envelope(json!({}))]).await;
    let client = server.client(0);

    let err = wait_for_history(
        &client,
        &credentials(),
        "H404",
        fast_config(),
        &CancellationToken::new(),
    )
    .await
    .unwrap_err();

    assert_eq!(err.category(), FailureCategory::RemoteGenerationFailed);
}

#[tokio::test]
async fn stalled_job_times_out_after_round_limit() {
    let server = spawn_server(vec![history("H1", record(20, "", 0))]).await;
    let client = server.client(0);

    let err = wait_for_history(
        &client,
        &credentials(),
        "H1",
        fast_config().with_max_poll_count(3),
        &CancellationToken::new(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, AppError::PollingTimeout { poll_count: 3, .. }));
    assert_eq!(server.hits(), 3);
}
