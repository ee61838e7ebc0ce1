//! Connection supervisor behavior against a mock event-stream endpoint.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use serde_json::json;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use homelink_core::{ApplianceId, ConnectionState};
use homelink_oauth::{Credentials, OAuthConfig, TokenClient, TokenResponse, TokenStore};
use homelink_platform::{
    ConnectionSupervisor, PlatformClient, StreamConfig, StreamMessage, StreamNotice,
};

const WAIT: Duration = Duration::from_secs(5);

async fn platform_client(server: &MockServer) -> PlatformClient {
    let config = OAuthConfig::new(
        "client-1",
        "secret-1",
        &format!("{}/authorize", server.uri()),
        &format!("{}/token", server.uri()),
        "https://hub.local/api",
    )
    .unwrap();

    let store = Arc::new(TokenStore::new(TokenClient::new(
        reqwest::Client::new(),
        config,
    )));
    store
        .install(Credentials::from_response(TokenResponse {
            access_token: "access-1".into(),
            expires_in: 3600,
            refresh_token: Some("refresh-1".into()),
            token_type: None,
            scope: None,
        }))
        .await;

    PlatformClient::new(
        reqwest::Client::new(),
        Url::parse(&server.uri()).unwrap(),
        store,
    )
}

fn fast_config() -> StreamConfig {
    StreamConfig {
        idle_timeout: Duration::from_secs(30),
        backoff_initial: Duration::from_millis(10),
        backoff_max: Duration::from_millis(80),
        sustained_reset: Duration::from_secs(600),
    }
}

#[tokio::test]
async fn connected_stream_yields_resync_then_events() {
    let server = MockServer::start().await;
    let client = platform_client(&server).await;

    let body = concat!(
        ": ping\n",
        "\n",
        "id: ap-1\n",
        "event: STATUS\n",
        "data: {\"items\":[{\"key\":\"DoorState\",\"value\":\"Open\"}]}\n",
        "\n",
    );
    Mock::given(method("GET"))
        .and(path("/appliances/events"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_raw(body, "text/event-stream"),
        )
        .mount(&server)
        .await;

    let mut handle = ConnectionSupervisor::new(client, fast_config()).spawn();

    let first = tokio::time::timeout(WAIT, handle.notices.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first, StreamNotice::Resynced);

    let second = tokio::time::timeout(WAIT, handle.notices.recv())
        .await
        .unwrap()
        .unwrap();
    let StreamNotice::Message(StreamMessage::Events {
        appliance_id,
        events,
    }) = second
    else {
        panic!("expected events notice, got {second:?}");
    };
    assert_eq!(appliance_id, ApplianceId::new("ap-1"));
    assert_eq!(events[0].key, "DoorState");
    assert_eq!(events[0].value, json!("Open"));

    handle.shutdown().await;
}

#[tokio::test]
async fn failures_back_off_with_increasing_attempts() {
    let server = MockServer::start().await;
    let client = platform_client(&server).await;

    Mock::given(method("GET"))
        .and(path("/appliances/events"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "error": { "key": "server", "description": "boom" }
        })))
        .mount(&server)
        .await;

    let handle = ConnectionSupervisor::new(client, fast_config()).spawn();
    let mut state_rx = handle.state_receiver();

    // Watch updates coalesce, so assert monotonic growth rather than an
    // exact sequence.
    let mut seen_attempts: Vec<u32> = Vec::new();
    while seen_attempts.len() < 3 {
        tokio::time::timeout(WAIT, state_rx.changed())
            .await
            .unwrap()
            .unwrap();
        if let ConnectionState::Backoff { attempt, .. } = *state_rx.borrow() {
            if seen_attempts.last() != Some(&attempt) {
                seen_attempts.push(attempt);
            }
        }
    }

    assert!(seen_attempts.windows(2).all(|w| w[1] > w[0]));
    assert!(*seen_attempts.last().unwrap() >= 3);
    handle.shutdown().await;
}

#[tokio::test]
async fn rate_limit_suspends_reconnect_attempts() {
    let server = MockServer::start().await;
    let client = platform_client(&server).await;

    // One request only: while rate-limited the supervisor must not retry.
    Mock::given(method("GET"))
        .and(path("/appliances/events"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "600"))
        .expect(1)
        .mount(&server)
        .await;

    let handle = ConnectionSupervisor::new(client, fast_config()).spawn();
    let mut state_rx = handle.state_receiver();

    let before = Utc::now();
    loop {
        tokio::time::timeout(WAIT, state_rx.changed())
            .await
            .unwrap()
            .unwrap();
        if let ConnectionState::RateLimited { until } = *state_rx.borrow() {
            assert!(until >= before + TimeDelta::seconds(590));
            assert!(until <= Utc::now() + TimeDelta::seconds(610));
            break;
        }
    }

    // Give a would-be immediate retry time to happen; expect(1) verifies
    // on server drop that none did.
    tokio::time::sleep(Duration::from_millis(200)).await;
    handle.shutdown().await;
}
