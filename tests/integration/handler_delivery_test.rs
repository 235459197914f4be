// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use portalq::domain::models::job::JobType;
use portalq::handlers::email_relay::EmailRelayHandler;
use portalq::handlers::feed_refresh::FeedRefreshHandler;
use portalq::handlers::traits::{HandlerError, JobHandler, JobOutcome};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn email_payload() -> serde_json::Value {
    json!({
        "to": "member@example.com",
        "subject": "Your listing has a reply",
        "body": "Open the portal to read it.",
    })
}

#[tokio::test]
async fn test_email_relay_delivers_signed_request() {
    let expected_signature = EmailRelayHandler::sign("s3cret", &email_payload().to_string());

    // 中转端仅接受签名正确的投递；签名缺失或错误会落到404上
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/send"))
        .and(header("X-Portalq-Signature", expected_signature.as_str()))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let handler = EmailRelayHandler::new(format!("{}/send", server.uri()), "s3cret".to_string());
    assert_eq!(handler.job_type(), JobType::EmailRelay);

    let outcome = handler.execute(&email_payload()).await.unwrap();
    assert_eq!(outcome, JobOutcome::Completed);
}

#[tokio::test]
async fn test_email_relay_server_error_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let handler = EmailRelayHandler::new(format!("{}/send", server.uri()), "s3cret".to_string());
    let result = handler.execute(&email_payload()).await;

    match result {
        Err(e @ HandlerError::Transient(_)) => assert!(e.is_retryable()),
        other => panic!("expected transient failure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_email_relay_client_error_is_permanent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(422))
        .mount(&server)
        .await;

    let handler = EmailRelayHandler::new(format!("{}/send", server.uri()), "s3cret".to_string());
    let result = handler.execute(&email_payload()).await;

    match result {
        Err(e @ HandlerError::Permanent(_)) => assert!(!e.is_retryable()),
        other => panic!("expected permanent failure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_email_relay_rejects_malformed_payload() {
    let handler = EmailRelayHandler::new("http://localhost:1/send".to_string(), "x".to_string());

    let result = handler.execute(&json!({"subject": "missing recipient"})).await;
    assert!(matches!(result, Err(HandlerError::Permanent(_))));
}

#[tokio::test]
async fn test_feed_refresh_completes_on_valid_source() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/feed"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<html><body>
                <a href="/posts/1">Neighborhood swap meet</a>
                <a href="/posts/2">Bike lane updates</a>
            </body></html>"#,
        ))
        .mount(&server)
        .await;

    let handler = FeedRefreshHandler::new(Duration::from_secs(5));
    assert_eq!(handler.job_type(), JobType::FeedRefresh);

    let payload = json!({
        "feed_url": format!("{}/feed", server.uri()),
        "member_id": uuid::Uuid::new_v4(),
    });
    let outcome = handler.execute(&payload).await.unwrap();
    assert_eq!(outcome, JobOutcome::Completed);
}

#[tokio::test]
async fn test_feed_refresh_gone_source_is_permanent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let handler = FeedRefreshHandler::new(Duration::from_secs(5));
    let payload = json!({ "feed_url": format!("{}/feed", server.uri()) });

    assert!(matches!(
        handler.execute(&payload).await,
        Err(HandlerError::Permanent(_))
    ));
}

#[tokio::test]
async fn test_feed_refresh_rate_limited_source_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let handler = FeedRefreshHandler::new(Duration::from_secs(5));
    let payload = json!({ "feed_url": format!("{}/feed", server.uri()) });

    assert!(matches!(
        handler.execute(&payload).await,
        Err(HandlerError::Transient(_))
    ));
}

#[tokio::test]
async fn test_feed_refresh_invalid_url_is_permanent() {
    let handler = FeedRefreshHandler::new(Duration::from_secs(5));
    let payload = json!({ "feed_url": "not a url" });

    assert!(matches!(
        handler.execute(&payload).await,
        Err(HandlerError::Permanent(_))
    ));
}
