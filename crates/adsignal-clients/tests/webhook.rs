//! Integration tests for webhook delivery using wiremock HTTP mocks.

use adsignal_clients::{build_http_client, deliver, deliver_all, EVENT_HEADER, SECRET_HEADER};
use adsignal_db::WebhookRow;
use chrono::Utc;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn hook(url: String, secret: Option<&str>) -> WebhookRow {
    WebhookRow {
        id: Uuid::new_v4(),
        org_id: Uuid::new_v4(),
        url,
        secret_token: secret.map(str::to_owned),
        event_types: vec!["strategic_anomaly".to_owned()],
        is_active: true,
    }
}

#[tokio::test]
async fn delivery_posts_envelope_with_headers() {
    let server = MockServer::start().await;
    let payload = serde_json::json!({ "ad_id": "abc", "brand": "Acme", "score": 0.95 });

    Mock::given(method("POST"))
        .and(path("/hook"))
        .and(header(EVENT_HEADER, "strategic_anomaly"))
        .and(header(SECRET_HEADER, "s3cret"))
        .and(body_partial_json(serde_json::json!({
            "event": "strategic_anomaly",
            "payload": payload
        })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let client = build_http_client(5).expect("client");
    let target = hook(format!("{}/hook", server.uri()), Some("s3cret"));
    deliver(&client, &target, "strategic_anomaly", &payload, Utc::now())
        .await
        .expect("delivery should succeed");
}

#[tokio::test]
async fn one_failing_hook_does_not_stop_the_others() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/ok"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let client = build_http_client(5).expect("client");
    let hooks = vec![
        hook(format!("{}/broken", server.uri()), None),
        hook(format!("{}/ok", server.uri()), None),
    ];
    let delivered = deliver_all(&client, &hooks, "strategic_anomaly", &serde_json::json!({})).await;
    assert_eq!(delivered, 1);
}
