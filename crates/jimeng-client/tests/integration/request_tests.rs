use std::time::Duration;

use serde_json::json;
use tokio_util::sync::CancellationToken;

use jimeng_client::{fetch_credit, receive_credit};
use jimeng_core::config::{ClientConfig, Region};
use jimeng_core::error::FailureCategory;
use jimeng_core::models::{CallOptions, Method};
use jimeng_core::retry::RetryPolicy;
use jimeng_core::signature::sha256_hex;

use crate::common::{
    TEST_ACCESS_KEY, TEST_SESSION_TOKEN, credentials, envelope, remote_failure, spawn_server,
    status,
};

#[tokio::test]
async fn envelope_success_returns_data() -> anyhow::Result<()> {
    let server = spawn_server(vec![envelope(json!({ "user_id": 42 }))]).await;
    let client = server.client(3);

    let data = client
        .call(
            Method::Get,
            "/passport/account/info/v2",
            &credentials(),
            &CallOptions::new(),
            &CancellationToken::new(),
        )
        .await?;

    assert_eq!(data, json!({ "user_id": 42 }));
    assert_eq!(server.hits(), 1);
    Ok(())
}

#[tokio::test]
async fn server_errors_are_retried_until_success() -> anyhow::Result<()> {
    let server = spawn_server(vec![
        status(500, "boom"),
        status(503, "busy"),
        envelope(json!("ok")),
    ])
    .await;
    let client = server.client(3);

    let data = client
        .call(
            Method::Get,
            "/x",
            &credentials(),
            &CallOptions::new(),
            &CancellationToken::new(),
        )
        .await?;

    assert_eq!(data, json!("ok"));
    assert_eq!(server.hits(), 3);
    Ok(())
}

#[tokio::test]
async fn persistent_server_errors_surface_after_all_attempts() {
    let server = spawn_server(vec![status(502, "bad gateway")]).await;
    let client = server.client(2);

    let err = client
        .call(
            Method::Get,
            "/x",
            &credentials(),
            &CallOptions::new(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert_eq!(err.category(), FailureCategory::NetworkTransient);
    assert_eq!(err.code().as_deref(), Some("502"));
    assert_eq!(server.hits(), 3);
}

#[tokio::test]
async fn auth_expired_is_not_retried() {
    let server = spawn_server(vec![remote_failure("1015", "login expired")]).await;
    let client = server.client(3);

    let err = client
        .call(
            Method::Get,
            "/x",
            &credentials(),
            &CallOptions::new(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert_eq!(err.category(), FailureCategory::RemoteAuthExpired);
    assert_eq!(err.code().as_deref(), Some("1015"));
    assert_eq!(server.hits(), 1);
}

#[tokio::test]
async fn requests_carry_signature_and_default_params() {
    let server = spawn_server(vec![envelope(json!({}))]).await;
    let client = server.client(0);
    let body = json!({ "history_ids": ["H1"] });

    client
        .call(
            Method::Post,
            "/mweb/v1/get_history_by_ids",
            &credentials(),
            &CallOptions::json(body.clone()).with_param("extra", "1"),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let request = &server.requests()[0];
    assert_eq!(request.method, "POST");
    assert_eq!(request.path, "/mweb/v1/get_history_by_ids");
    assert!(request.query.starts_with("aid=513695&device_platform=web&region=cn&webId="));
    assert!(request.query.ends_with("&extra=1"));

    assert_eq!(request.body, body.to_string());
    assert_eq!(request.header("content-type"), Some("application/json"));
    assert_eq!(
        request.header("x-amz-content-sha256"),
        Some(sha256_hex(request.body.as_bytes()).as_str())
    );
    assert_eq!(request.header("x-amz-security-token"), Some(TEST_SESSION_TOKEN));
    assert_eq!(request.header("x-amz-date").map(str::len), Some(16));

    let authorization = request.header("authorization").unwrap();
    assert!(authorization.starts_with(&format!("AWS4-HMAC-SHA256 Credential={TEST_ACCESS_KEY}/")));
    assert!(authorization.contains(
        "SignedHeaders=x-amz-content-sha256;x-amz-date;x-amz-security-token"
    ));
}

#[tokio::test]
async fn unreachable_host_is_network_transient() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let config = ClientConfig::new(Region::Cn)
        .with_base_url(format!("http://{addr}"))
        .with_retry(RetryPolicy::new(2, Duration::from_millis(10)));
    let client = jimeng_client::connect(config).unwrap();

    let err = client
        .call(
            Method::Get,
            "/x",
            &credentials(),
            &CallOptions::new(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(err.is_retryable());
    assert_eq!(err.category(), FailureCategory::NetworkTransient);
}

#[tokio::test]
async fn cancellation_interrupts_retry_delay() {
    let server = spawn_server(vec![status(500, "boom")]).await;
    let config = ClientConfig::new(Region::Cn)
        .with_base_url(server.base_url.clone())
        .with_retry(RetryPolicy::new(3, Duration::from_secs(60)));
    let client = jimeng_client::connect(config).unwrap();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });

    let err = tokio::time::timeout(
        Duration::from_secs(10),
        client.call(Method::Get, "/x", &credentials(), &CallOptions::new(), &cancel),
    )
    .await
    .expect("cancellation should end the call promptly")
    .unwrap_err();

    assert_eq!(err.category(), FailureCategory::Cancelled);
    assert_eq!(server.hits(), 1);
}

#[tokio::test]
async fn credit_lookup_skips_default_params() -> anyhow::Result<()> {
    let server = spawn_server(vec![envelope(json!({
        "credit": { "gift_credit": 60, "purchase_credit": 0, "vip_credit": 15 }
    }))])
    .await;
    let client = server.client(0);

    let info = fetch_credit(&client, &credentials(), &CancellationToken::new()).await?;

    assert_eq!(info.total_credit, 75);
    let request = &server.requests()[0];
    assert_eq!(request.path, "/commerce/v1/benefits/user_credit");
    assert_eq!(request.query, "");
    assert_eq!(
        request.header("referer"),
        Some("https://jimeng.jianying.com/ai-tool/image/generate")
    );
    Ok(())
}

#[tokio::test]
async fn daily_credit_receipt() -> anyhow::Result<()> {
    let server = spawn_server(vec![envelope(json!({
        "receive_quota": 60,
        "cur_total_credits": 135
    }))])
    .await;
    let client = server.client(0);

    let receipt = receive_credit(&client, &credentials(), &CancellationToken::new()).await?;

    assert_eq!(receipt.receive_quota, 60);
    assert_eq!(receipt.cur_total_credits, 135);
    let request = &server.requests()[0];
    assert_eq!(request.body, r#"{"time_zone":"Asia/Shanghai"}"#);
    assert!(request.query.contains("aid=513695"));
    Ok(())
}
