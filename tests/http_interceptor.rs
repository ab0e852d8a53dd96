//! HTTP interceptor tests: filtering, redaction, classification and the live server.

use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::routing::{get, post};
use axum::{middleware, Json, Router};
use serde_json::{json, Value};
use tower::ServiceExt;

use ticketing_telemetry::config::{HttpLoggingConfig, TelemetryConfig};
use ticketing_telemetry::http::{telemetry_middleware, HttpServer, TelemetryInterceptor, REDACTED};

mod common;

fn app(h: &common::Harness, config: &HttpLoggingConfig) -> Router {
    HttpServer::new(h.delivery.clone(), h.interceptor(config)).router()
}

/// Bare routes behind the interceptor, for status and timing cases.
fn bare_app(interceptor: TelemetryInterceptor) -> Router {
    Router::new()
        .route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_millis(40)).await;
                "done"
            }),
        )
        .route("/boom", get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }))
        .route("/missing", get(|| async { StatusCode::NOT_FOUND }))
        .route(
            "/feed",
            get(|| async {
                let chunks: Vec<Result<&'static str, std::io::Error>> =
                    vec![Ok("event: 1\n"), Err(std::io::Error::other("feed closed"))];
                Body::from_stream(futures_util::stream::iter(chunks))
            }),
        )
        .route(
            "/login",
            post(|_body: String| async { Json(json!({"token": "abc", "user": "ana"})) }),
        )
        .layer(middleware::from_fn_with_state(interceptor, telemetry_middleware))
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_excluded_path_is_not_logged() {
    let h = common::harness().await;
    let response = app(&h, &HttpLoggingConfig::default())
        .oneshot(get_request("/health"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["broker"], "connected");

    assert!(h.log_messages().is_empty());
    assert!(h.fallback_lines().is_empty());
}

#[tokio::test]
async fn test_request_and_response_are_logged() {
    let h = common::harness().await;
    let response = app(&h, &HttpLoggingConfig::default())
        .oneshot(get_request("/v1/orders/5?expand=tickets"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let requests = h.log_messages_of("http_request");
    assert_eq!(requests.len(), 1);
    let request = &requests[0]["context"];
    assert_eq!(request["method"], "GET");
    assert_eq!(request["path"], "/v1/orders/5");
    assert_eq!(request["query_string"], "expand=tickets");
    assert_eq!(request["type"], "http_request");
    assert!(!request["request_id"].as_str().unwrap().is_empty());

    let responses = h.log_messages_of("http_response");
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0]["level"], "info");
    assert_eq!(responses[0]["message"], "HTTP Response");
    let ctx = &responses[0]["context"];
    assert_eq!(ctx["status_code"], 200);
    assert_eq!(ctx["status_text"], "200 OK");
    assert_eq!(ctx["slow_request"], false);
    assert_eq!(ctx["request_id"], request["request_id"]);
    assert!(ctx["body"].is_null());
    assert!(ctx["response_size"].as_u64().unwrap() > 0);

    assert_eq!(h.fallback_lines().len(), 2);
}

#[tokio::test]
async fn test_sensitive_values_are_redacted() {
    let h = common::harness().await;
    let config = HttpLoggingConfig {
        log_response_body: true,
        ..HttpLoggingConfig::default()
    };

    let request = Request::builder()
        .method(Method::POST)
        .uri("/v1/orders")
        .header("content-type", "application/json")
        .header("authorization", "Bearer live-token")
        .header("cookie", "session=abc")
        .header("x-trace", "t-1")
        .body(Body::from(
            json!({"event_id": 3, "quantity": 2, "payment": {"credit_card": "4111111111111111"}, "password": "hunter2"})
                .to_string(),
        ))
        .unwrap();
    let response = app(&h, &config).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    // The caller still sees the real body.
    let body = body_json(response).await;
    assert_eq!(body["access_token"], "ord_tok_1001");

    let request = &h.log_messages_of("http_request")[0]["context"];
    assert_eq!(request["headers"]["authorization"], REDACTED);
    assert_eq!(request["headers"]["cookie"], REDACTED);
    assert_eq!(request["headers"]["x-trace"], "t-1");
    assert_eq!(request["body"]["password"], REDACTED);
    assert_eq!(request["body"]["payment"]["credit_card"], REDACTED);
    assert_eq!(request["body"]["quantity"], 2);

    let response = &h.log_messages_of("http_response")[0]["context"];
    assert_eq!(response["status_code"], 201);
    assert_eq!(response["body"]["access_token"], REDACTED);
    assert_eq!(response["body"]["id"], 1001);

    assert_eq!(h.provider.messages("business-events").len(), 1);
    assert!(!h.fallback_lines().iter().any(|line| line.to_string().contains("hunter2")));
}

#[tokio::test]
async fn test_form_body_is_redacted() {
    let h = common::harness().await;
    let interceptor = h.interceptor(&HttpLoggingConfig::default());

    let request = Request::builder()
        .method(Method::POST)
        .uri("/login")
        .header("content-type", "application/x-www-form-urlencoded")
        .body(Body::from("user=ana&password=secret"))
        .unwrap();
    let response = bare_app(interceptor).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = h.log_messages_of("http_request")[0]["context"]["body"].clone();
    let body = body.as_str().unwrap();
    assert!(body.contains("user=ana"));
    assert!(!body.contains("secret"));
}

#[tokio::test]
async fn test_form_shaped_plain_text_body_is_redacted() {
    let h = common::harness().await;
    let interceptor = h.interceptor(&HttpLoggingConfig::default());

    let request = Request::builder()
        .method(Method::POST)
        .uri("/login")
        .header("content-type", "text/plain")
        .body(Body::from("username=bob&password=hunter2"))
        .unwrap();
    let response = bare_app(interceptor).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = h.log_messages_of("http_request")[0]["context"]["body"].clone();
    let body = body.as_str().unwrap();
    assert!(body.contains("username=bob"));
    assert!(!body.contains("hunter2"));
    assert!(!h.fallback_lines().iter().any(|line| line.to_string().contains("hunter2")));
}

#[tokio::test]
async fn test_failing_response_stream_is_passed_through() {
    let h = common::harness().await;
    let config = HttpLoggingConfig {
        log_response_body: true,
        ..HttpLoggingConfig::default()
    };

    let response = bare_app(h.interceptor(&config))
        .oneshot(get_request("/feed"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(axum::body::to_bytes(response.into_body(), usize::MAX).await.is_err());

    let responses = h.log_messages_of("http_response");
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0]["context"]["status_code"], 200);
    assert!(responses[0]["context"]["body"].is_null());
}

#[tokio::test]
async fn test_oversized_body_is_omitted() {
    let h = common::harness().await;
    let config = HttpLoggingConfig {
        max_body_size: 8,
        ..HttpLoggingConfig::default()
    };

    let request = Request::builder()
        .method(Method::POST)
        .uri("/login")
        .header("content-type", "application/json")
        .body(Body::from(json!({"user": "ana", "note": "longer than eight bytes"}).to_string()))
        .unwrap();
    let response = bare_app(h.interceptor(&config)).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let request = &h.log_messages_of("http_request")[0]["context"];
    assert!(request["body"].is_null());
}

#[tokio::test]
async fn test_slow_request_is_flagged() {
    let h = common::harness().await;
    let config = HttpLoggingConfig {
        slow_request_threshold_ms: 10,
        ..HttpLoggingConfig::default()
    };

    bare_app(h.interceptor(&config))
        .oneshot(get_request("/slow"))
        .await
        .unwrap();

    assert!(h.log_messages_of("http_response").is_empty());
    let slow = h.log_messages_of("slow_request");
    assert_eq!(slow.len(), 1);
    assert_eq!(slow[0]["level"], "warning");
    assert_eq!(slow[0]["message"], "Slow HTTP Request");
    assert_eq!(slow[0]["context"]["slow_request"], true);
    assert!(slow[0]["context"]["execution_time_ms"].as_f64().unwrap() >= 40.0);
}

#[tokio::test]
async fn test_status_drives_level_and_type() {
    let h = common::harness().await;
    let app = bare_app(h.interceptor(&HttpLoggingConfig::default()));

    app.clone().oneshot(get_request("/missing")).await.unwrap();
    app.oneshot(get_request("/boom")).await.unwrap();

    let responses = h.log_messages_of("http_response");
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0]["level"], "warning");
    assert_eq!(responses[0]["context"]["status_text"], "404 Not Found");

    let errors = h.log_messages_of("http_error");
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["level"], "error");
    assert_eq!(errors[0]["log_level"], "error");
    assert_eq!(errors[0]["context"]["status_code"], 500);
}

#[tokio::test]
async fn test_filter_rules() {
    let h = common::harness().await;
    let config = HttpLoggingConfig {
        endpoints: vec!["GET:/v1/orders/*".to_string()],
        excluded_domains: vec!["internal.example.com".to_string()],
        ..HttpLoggingConfig::default()
    };
    let app = app(&h, &config);

    let options = Request::builder()
        .method(Method::OPTIONS)
        .uri("/v1/orders/1")
        .body(Body::empty())
        .unwrap();
    app.clone().oneshot(options).await.unwrap();

    let internal = Request::builder()
        .uri("/v1/orders/1")
        .header("host", "api.internal.example.com:8080")
        .body(Body::empty())
        .unwrap();
    app.clone().oneshot(internal).await.unwrap();

    let not_admitted = Request::builder()
        .method(Method::POST)
        .uri("/v1/orders")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"event_id":1,"quantity":1}"#))
        .unwrap();
    app.clone().oneshot(not_admitted).await.unwrap();
    assert!(h.log_messages_of("http_request").is_empty());

    let admitted = Request::builder()
        .uri("/v1/orders/1")
        .header("host", "tickets.example.com")
        .body(Body::empty())
        .unwrap();
    app.oneshot(admitted).await.unwrap();

    let requests = h.log_messages_of("http_request");
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0]["context"]["url"], "http://tickets.example.com/v1/orders/1");
}

#[tokio::test]
async fn test_live_server_propagates_request_id() {
    let h = common::harness().await;
    let server = common::spawn_server(h.delivery.clone(), h.interceptor(&HttpLoggingConfig::default())).await;
    let client = reqwest::Client::new();

    let response = client
        .get(server.url("/v1/orders/7"))
        .header("x-request-id", "req-42")
        .header("x-user-id", "user-9")
        .header("user-agent", "telemetry-test")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(response.headers()["x-request-id"], "req-42");

    let response = client.get(server.url("/v1/orders/8")).send().await.unwrap();
    let generated = response.headers()["x-request-id"].to_str().unwrap().to_string();
    assert!(!generated.is_empty());

    let requests = h.log_messages_of("http_request");
    assert_eq!(requests.len(), 2);
    let first = &requests[0]["context"];
    assert_eq!(first["request_id"], "req-42");
    assert_eq!(first["user_id"], "user-9");
    assert_eq!(first["user_agent"], "telemetry-test");
    assert_eq!(first["ip"], "127.0.0.1");
    assert_eq!(first["url"], format!("http://{}/v1/orders/7", server.addr));
    assert_eq!(requests[1]["context"]["request_id"], generated.as_str());

    server.stop().await;
}

#[tokio::test]
async fn test_live_server_health_reports_degraded_broker() {
    let h = common::degraded_harness().await;
    let server = common::spawn_server(h.delivery.clone(), h.interceptor(&HttpLoggingConfig::default())).await;

    let body: Value = reqwest::get(server.url("/health")).await.unwrap().json().await.unwrap();
    assert_eq!(body["broker"], "degraded");
    assert_eq!(body["provider"], "memory");

    server.stop().await;
}

#[tokio::test]
async fn test_config_update_reloads_policy() {
    let h = common::harness().await;
    let interceptor = h.interceptor(&HttpLoggingConfig::default());
    let server = common::spawn_server(h.delivery.clone(), interceptor.clone()).await;

    let mut config = TelemetryConfig::default();
    config.http_logging.excluded_paths.push("/v1/orders".to_string());
    server.config_updates.send(config).unwrap();

    let reloaded = common::eventually(|| {
        let interceptor = interceptor.clone();
        async move {
            !interceptor
                .policy()
                .filter
                .should_log(&Method::GET, "/v1/orders/3", None)
        }
    })
    .await;
    assert!(reloaded);

    let response = reqwest::get(server.url("/v1/orders/3")).await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert!(h.log_messages().is_empty());

    server.stop().await;
}
