//! HTTP contract of the Graph API client against a mock server.

use automations::config::GraphApiConfig;
use automations::platform::{GraphApiClient, OutboundMessage, PlatformApi, Recipient, SendError};
use automations::rules::StepKind;
use chrono::Utc;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> GraphApiClient {
    GraphApiClient::new(&GraphApiConfig {
        base_url: server.uri(),
        version: "v21.0".to_string(),
        timeout_seconds: 5,
    })
    .unwrap()
}

#[tokio::test]
async fn sends_text_message_to_user() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v21.0/me/messages"))
        .and(header("authorization", "Bearer token-1"))
        .and(body_json(json!({
            "recipient": {"id": "user-1"},
            "message": {"text": "hello"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message_id": "mid"})))
        .expect(1)
        .mount(&server)
        .await;

    client_for(&server)
        .send_message(
            "token-1",
            &Recipient::User("user-1".to_string()),
            &OutboundMessage::Text("hello".to_string()),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn sends_attachment_addressed_by_comment() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v21.0/me/messages"))
        .and(body_json(json!({
            "recipient": {"comment_id": "c-1"},
            "message": {"attachment": {"type": "video", "payload": {"url": "https://cdn.example.com/a.mp4"}}}
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    client_for(&server)
        .send_message(
            "token-1",
            &Recipient::Comment("c-1".to_string()),
            &OutboundMessage::Attachment {
                kind: StepKind::Video,
                url: "https://cdn.example.com/a.mp4".to_string(),
            },
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn replies_under_comment() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v21.0/c-42/replies"))
        .and(body_json(json!({"message": "thanks!"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "r-1"})))
        .expect(1)
        .mount(&server)
        .await;

    client_for(&server)
        .reply_to_comment("token-1", "c-42", "thanks!")
        .await
        .unwrap();
}

#[tokio::test]
async fn non_success_status_surfaces_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v21.0/me/messages"))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(json!({"error": {"type": "OAuthException", "code": 190}})),
        )
        .mount(&server)
        .await;

    let err = client_for(&server)
        .send_message(
            "expired",
            &Recipient::User("u".to_string()),
            &OutboundMessage::Text("hi".to_string()),
        )
        .await
        .unwrap_err();

    match &err {
        SendError::Http { status, body } => {
            assert_eq!(*status, 401);
            assert!(body.contains("OAuthException"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(err.is_unauthorized());
}

#[tokio::test]
async fn refresh_returns_new_token_and_expiry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/refresh_access_token"))
        .and(query_param("grant_type", "ig_refresh_token"))
        .and(query_param("access_token", "old-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "new-token",
            "token_type": "bearer",
            "expires_in": 5_184_000
        })))
        .expect(1)
        .mount(&server)
        .await;

    let before = Utc::now();
    let refreshed = client_for(&server)
        .refresh_credential("old-token")
        .await
        .unwrap();

    assert_eq!(refreshed.access_token, "new-token");
    let expires_at = refreshed.expires_at.unwrap();
    assert!(expires_at > before + chrono::Duration::days(59));
}

#[tokio::test]
async fn refresh_with_garbage_body_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/refresh_access_token"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .refresh_credential("old-token")
        .await
        .unwrap_err();
    assert!(matches!(err, SendError::MalformedResponse(_)));
}
