//! End-to-end tests for the HTTP surface.
//!
//! Both upstreams are served by a single wiremock server; requests are
//! driven through the full router (body limit, CORS and trace layers
//! included) with `tower::ServiceExt::oneshot`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use certlink::api::{ApiServer, ApiServerConfig, AppState};
use certlink::clients::{GhlClient, NowCertsClient};
use certlink::config::Settings;
use certlink::credentials::{CredentialLifecycleManager, NowCertsIdentityProvider};
use certlink::dedup::DedupGuard;
use certlink::dispatcher::EventDispatcher;
use certlink::utils::http_client::build_http_client;

const NOWCERTS_HOOK: &str = "/api/v1/webhooks/nowcerts";

fn settings_for(upstream: &MockServer, overrides: &[(&str, &str)]) -> Settings {
    let mut env: HashMap<String, String> = [
        ("NOWCERTS_BASE_URL", upstream.uri()),
        ("NOWCERTS_USERNAME", "agent".to_string()),
        ("NOWCERTS_PASSWORD", "secret".to_string()),
        ("GHL_BASE_URL", upstream.uri()),
        ("GHL_API_KEY", "ghl-key".to_string()),
        ("GHL_LOCATION_ID", "loc-1".to_string()),
        ("MAX_RETRIES", "1".to_string()),
        ("RETRY_INITIAL_DELAY", "0.01".to_string()),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect();

    for (k, v) in overrides {
        env.insert(k.to_string(), v.to_string());
    }

    Settings::from_lookup(|key| env.get(key).cloned()).expect("valid test settings")
}

/// Build the full router with every client pointed at the mock upstream.
fn app(settings: Settings) -> Router {
    let settings = Arc::new(settings);
    let http = build_http_client(Duration::from_secs(30)).expect("http client");

    let provider = Arc::new(NowCertsIdentityProvider::new(
        http.clone(),
        &settings.nowcerts,
    ));
    let credentials = Arc::new(CredentialLifecycleManager::new(
        provider,
        settings.nowcerts.token_refresh_buffer,
    ));
    let nowcerts = Arc::new(NowCertsClient::new(
        http.clone(),
        &settings.nowcerts,
        credentials,
        settings.retry.clone(),
    ));
    let ghl = Arc::new(GhlClient::new(http, &settings.ghl, settings.retry.clone()));
    let dedup = Arc::new(DedupGuard::new(settings.dedup.retention));
    let dispatcher = Arc::new(EventDispatcher::new(nowcerts, ghl, dedup));

    let state = AppState::new(Arc::clone(&settings), dispatcher);
    ApiServer::new(
        ApiServerConfig::from(&settings.server),
        state,
        CancellationToken::new(),
    )
    .build_router()
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    let request = match body {
        Some(body) => builder.body(Body::from(body.to_string())),
        None => builder.body(Body::empty()),
    }
    .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    // Rejections from axum extractors and layers are plain text.
    let json = serde_json::from_slice(&bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
    (status, json)
}

async fn mount_token(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/api/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "nc-token",
            "refresh_token": "nc-refresh",
            "token_type": "bearer",
            "expires_in": 3600
        })))
        .mount(server)
        .await;
}

fn insured_insert() -> Value {
    json!({
        "event_type": "INSURED_INSERT",
        "timestamp": "2024-05-01T12:00:00Z",
        "data": {
            "firstName": "Jane",
            "lastName": "Doe",
            "email": "jane@example.com",
            "phone": "555-0100",
            "address": {
                "street": "1 Main St",
                "city": "Springfield",
                "state": "IL",
                "zip": "62701"
            }
        }
    })
}

mod webhook_tests {
    use super::*;

    #[tokio::test]
    async fn test_insured_insert_creates_ghl_contact() {
        let upstream = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/contacts/"))
            .and(header("Authorization", "Bearer ghl-key"))
            .and(body_partial_json(json!({
                "firstName": "Jane",
                "lastName": "Doe",
                "email": "jane@example.com",
                "address1": "1 Main St",
                "city": "Springfield",
                "postalCode": "62701",
                "source": "NowCerts"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "contact": {"id": "ghl-c-1"}
            })))
            .expect(1)
            .mount(&upstream)
            .await;

        let app = app(settings_for(&upstream, &[]));
        let (status, body) = send(&app, "POST", NOWCERTS_HOOK, Some(insured_insert())).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["target_id"], "ghl-c-1");
        assert!(!body["event_id"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_redelivery_is_rejected_without_upstream_call() {
        let upstream = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/contacts/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "ghl-c-1"})))
            .expect(1)
            .mount(&upstream)
            .await;

        let app = app(settings_for(&upstream, &[]));
        let (first, first_body) = send(&app, "POST", NOWCERTS_HOOK, Some(insured_insert())).await;
        let (second, second_body) = send(&app, "POST", NOWCERTS_HOOK, Some(insured_insert())).await;

        assert_eq!(first, StatusCode::OK);
        assert_eq!(second, StatusCode::CONFLICT);
        assert_eq!(second_body["success"], false);
        assert_eq!(second_body["code"], "DUPLICATE_EVENT");
        assert_eq!(second_body["details"]["event_id"], first_body["event_id"]);
    }

    #[tokio::test]
    async fn test_invalid_nowcerts_payload_is_unprocessable() {
        let upstream = MockServer::start().await;
        let app = app(settings_for(&upstream, &[]));

        let (status, body) = send(
            &app,
            "POST",
            NOWCERTS_HOOK,
            Some(json!({"data": {"firstName": "Jane"}})),
        )
        .await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["success"], false);
        assert!(upstream.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ghl_contact_creates_nowcerts_contact() {
        let upstream = MockServer::start().await;
        mount_token(&upstream).await;
        Mock::given(method("POST"))
            .and(path("/api/contacts"))
            .and(header("Authorization", "Bearer nc-token"))
            .and(body_partial_json(json!({"firstName": "Sam", "lastName": "Lee"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "nc-9"})))
            .expect(1)
            .mount(&upstream)
            .await;

        let app = app(settings_for(&upstream, &[]));
        let (status, body) = send(
            &app,
            "POST",
            "/api/v1/webhooks/ghl",
            Some(json!({
                "event": "ContactCreate",
                "locationId": "loc-1",
                "contact": {"firstName": "Sam", "lastName": "Lee", "email": "sam@example.com"}
            })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["target_id"], "nc-9");
    }

    #[tokio::test]
    async fn test_upstream_rejection_surfaces_as_server_error() {
        let upstream = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/contacts/"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad contact"))
            .expect(1)
            .mount(&upstream)
            .await;

        let app = app(settings_for(&upstream, &[]));
        let (status, body) = send(&app, "POST", NOWCERTS_HOOK, Some(insured_insert())).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["success"], false);
        assert_eq!(body["details"]["upstream_status"], 400);
    }

    #[tokio::test]
    async fn test_oversized_body_is_rejected() {
        let upstream = MockServer::start().await;
        let app = app(settings_for(&upstream, &[("BODY_LIMIT_BYTES", "64")]));

        let (status, _) = send(&app, "POST", NOWCERTS_HOOK, Some(insured_insert())).await;

        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert!(upstream.received_requests().await.unwrap().is_empty());
    }
}

mod sync_tests {
    use super::*;

    #[tokio::test]
    async fn test_manual_contact_sync_to_ghl() {
        let upstream = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/contacts/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "contact": {"id": "ghl-c-2"}
            })))
            .expect(1)
            .mount(&upstream)
            .await;

        let app = app(settings_for(&upstream, &[]));
        let request = json!({
            "source": "nowcerts",
            "entity_type": "contact",
            "entity_id": "nc-1",
            "direction": "to_ghl",
            "data": {"firstName": "Jane", "lastName": "Doe"}
        });

        // Manual sync bypasses dedup, so the same request runs twice.
        let (status, body) = send(&app, "POST", "/api/v1/sync/manual", Some(request.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["source_id"], "nc-1");
        assert_eq!(body["target_id"], "ghl-c-2");

        upstream.reset().await;
        Mock::given(method("POST"))
            .and(path("/contacts/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "ghl-c-3"})))
            .expect(1)
            .mount(&upstream)
            .await;
        let (status, body) = send(&app, "POST", "/api/v1/sync/manual", Some(request)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["target_id"], "ghl-c-3");
    }

    #[tokio::test]
    async fn test_manual_sync_unsupported_combination() {
        let upstream = MockServer::start().await;
        let app = app(settings_for(&upstream, &[]));

        let (status, body) = send(
            &app,
            "POST",
            "/api/v1/sync/manual",
            Some(json!({
                "source": "ghl",
                "entity_type": "policy",
                "direction": "to_nowcerts",
                "data": {}
            })),
        )
        .await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["success"], false);
    }
}

mod health_tests {
    use super::*;

    #[tokio::test]
    async fn test_service_info_lists_endpoints() {
        let upstream = MockServer::start().await;
        let app = app(settings_for(&upstream, &[]));

        let (status, body) = send(&app, "GET", "/", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["endpoints"]["nowcerts_webhook"], "/api/v1/webhooks/nowcerts");
        assert_eq!(body["endpoints"]["ghl_webhook"], "/api/v1/webhooks/ghl");
    }

    #[tokio::test]
    async fn test_health_and_readiness() {
        let upstream = MockServer::start().await;
        let app = app(settings_for(&upstream, &[]));

        let (status, body) = send(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");

        let (status, body) = send(&app, "GET", "/health/ready", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["credential"], "empty");
    }

    #[tokio::test]
    async fn test_not_ready_without_ghl_key() {
        let upstream = MockServer::start().await;
        let mut settings = settings_for(&upstream, &[]);
        settings.ghl.api_key = None;
        let app = app(settings);

        let (status, body) = send(&app, "GET", "/health/ready", None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(body["message"].as_str().unwrap().contains("ghl"));
    }

    #[tokio::test]
    async fn test_logging_endpoint_without_config() {
        let upstream = MockServer::start().await;
        let app = app(settings_for(&upstream, &[]));

        let (status, body) = send(&app, "GET", "/api/v1/logging", None).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["success"], false);
    }
}
