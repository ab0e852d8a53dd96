//! HTTP telemetry interceptor.
//!
//! # Responsibilities
//! - Decide per request whether it is logged (filter.rs)
//! - Capture and redact the request before the handler runs
//! - Capture and redact the response, time the handler, classify the outcome
//! - Emit request and response records through the CentralLogger
//!
//! # Data Flow
//! ```text
//! Request
//!     → policy.filter.should_log?  ── no ──→ handler → Response (untouched)
//!     → capture request (headers, body ≤ max, ip, user, request id)
//!     → emit http_request
//!     → handler (timed)
//!     → capture response (headers, body ≤ max, size)
//!     → classify (status bucket, slow flag)
//!     → emit http_response / http_error / slow_request
//!     → Response
//! ```
//!
//! # Design Decisions
//! - The policy lives behind `ArcSwap` so a config reload never blocks requests
//! - Bodies are only buffered when their exact size is known and within
//!   `max_body_size`; streaming bodies are passed through uncaptured
//! - A body that fails to read is logged as omitted and handed on unchanged;
//!   logging never turns into a client-visible error
//! - Emission is awaited inline, after the handler and before the response leaves

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwap;
use axum::body::{Body, Bytes, HttpBody};
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{header, HeaderMap};
use axum::middleware::Next;
use axum::response::Response;
use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::config::schema::HttpLoggingConfig;
use crate::delivery::enrich::now_rfc3339;
use crate::delivery::message::{LogLevel, LogRecord, MessageType};
use crate::http::exchange::{
    classify_status, is_slow, response_classification, status_text, HttpExchangeRecord,
    HttpRequestRecord, HttpResponseRecord,
};
use crate::http::filter::EndpointFilter;
use crate::http::redaction::Redactor;
use crate::observability::logger::{millis, CentralLogger};
use crate::observability::metrics;

pub const X_REQUEST_ID: &str = "x-request-id";

/// Identity of the caller, inserted as a request extension by an auth layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser(pub String);

/// Compiled interceptor settings.
#[derive(Debug, Clone)]
pub struct InterceptorPolicy {
    pub filter: EndpointFilter,
    pub redactor: Redactor,
    pub log_request_body: bool,
    pub log_response_body: bool,
    pub max_body_size: usize,
    pub slow_request_threshold_ms: u64,
}

impl InterceptorPolicy {
    pub fn from_config(config: &HttpLoggingConfig) -> Self {
        Self {
            filter: EndpointFilter::from_config(config),
            redactor: Redactor::from_config(config),
            log_request_body: config.log_request_body,
            log_response_body: config.log_response_body,
            max_body_size: config.max_body_size,
            slow_request_threshold_ms: config.slow_request_threshold_ms,
        }
    }

    fn capturable(&self, size: Option<u64>) -> Option<usize> {
        match size {
            Some(n) if n > 0 && n <= self.max_body_size as u64 => Some(n as usize),
            _ => None,
        }
    }
}

/// Shared interceptor state for `telemetry_middleware`.
#[derive(Clone)]
pub struct TelemetryInterceptor {
    policy: Arc<ArcSwap<InterceptorPolicy>>,
    logger: CentralLogger,
}

impl TelemetryInterceptor {
    pub fn new(config: &HttpLoggingConfig, logger: CentralLogger) -> Self {
        Self {
            policy: Arc::new(ArcSwap::from_pointee(InterceptorPolicy::from_config(config))),
            logger,
        }
    }

    /// Swap in a new policy; in-flight requests keep the one they started with.
    pub fn reload(&self, config: &HttpLoggingConfig) {
        self.policy.store(Arc::new(InterceptorPolicy::from_config(config)));
        tracing::info!(
            enabled = config.enabled,
            slow_threshold_ms = config.slow_request_threshold_ms,
            "HTTP logging policy reloaded"
        );
    }

    pub fn policy(&self) -> Arc<InterceptorPolicy> {
        self.policy.load_full()
    }

    pub fn logger(&self) -> &CentralLogger {
        &self.logger
    }
}

/// Axum middleware entry point (`middleware::from_fn_with_state`).
pub async fn telemetry_middleware(
    State(interceptor): State<TelemetryInterceptor>,
    request: Request,
    next: Next,
) -> Response {
    let policy = interceptor.policy();
    let host = request_host(&request);
    if !policy
        .filter
        .should_log(request.method(), request.uri().path(), host.as_deref())
    {
        return next.run(request).await;
    }

    let (request, record) = capture_request(&policy, request, host.as_deref()).await;
    interceptor
        .logger
        .emit(
            LogRecord::new(LogLevel::Info, "HTTP Request")
                .with_context(context(&record, MessageType::HttpRequest)),
            MessageType::HttpRequest,
        )
        .await;

    let started = Instant::now();
    let response = next.run(request).await;
    let elapsed = started.elapsed();

    let (response, headers, body, size) = capture_response(&policy, response).await;

    let status = response.status().as_u16();
    let duration_ms = millis(elapsed);
    let slow = is_slow(elapsed, policy.slow_request_threshold_ms);
    let (level, message_type) = response_classification(status, slow);

    let exchange = HttpExchangeRecord {
        request: record,
        response: HttpResponseRecord {
            status_code: status,
            status_text: status_text(status),
            headers,
            body,
            execution_time_ms: duration_ms,
            execution_time_seconds: (elapsed.as_secs_f64() * 10_000.0).round() / 10_000.0,
            response_size: size,
            slow_request: slow,
        },
    };
    let mut ctx = context(&exchange.response, message_type);
    let request = exchange.request;
    ctx.insert("method".to_string(), Value::String(request.method));
    ctx.insert("url".to_string(), Value::String(request.url));
    ctx.insert("path".to_string(), Value::String(request.path));
    ctx.insert("request_id".to_string(), Value::String(request.request_id));

    let message = if slow { "Slow HTTP Request" } else { "HTTP Response" };
    interceptor
        .logger
        .emit(LogRecord::new(level, message).with_context(ctx), message_type)
        .await;

    metrics::record_http_exchange(classify_status(status).as_str(), slow, elapsed);
    response
}

async fn capture_request(
    policy: &InterceptorPolicy,
    request: Request,
    host: Option<&str>,
) -> (Request, HttpRequestRecord) {
    let headers = request.headers();
    let request_id = header_str(headers, X_REQUEST_ID)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let path_and_query = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());
    let url = match host {
        Some(host) => {
            let scheme = header_str(headers, "x-forwarded-proto").unwrap_or("http");
            format!("{}://{}{}", scheme, host, path_and_query)
        }
        None => path_and_query,
    };
    let content_type = header_str(headers, header::CONTENT_TYPE.as_str()).map(str::to_string);

    let mut record = HttpRequestRecord {
        method: request.method().to_string(),
        url,
        path: request.uri().path().to_string(),
        query_string: request.uri().query().map(str::to_string),
        headers: policy.redactor.redact_headers(headers),
        body: None,
        ip: client_ip(&request),
        user_agent: header_str(headers, header::USER_AGENT.as_str()).map(str::to_string),
        user_id: request
            .extensions()
            .get::<AuthenticatedUser>()
            .map(|user| user.0.clone()),
        timestamp: now_rfc3339(),
        request_id,
    };

    if !policy.log_request_body {
        return (request, record);
    }
    let Some(limit) = policy.capturable(request.body().size_hint().exact()) else {
        return (request, record);
    };

    let (parts, body) = request.into_parts();
    let (body, bytes) = buffer_body(body, limit).await;
    record.body = bytes.map(|bytes| {
        policy
            .redactor
            .redact_request_body(&bytes, content_type.as_deref())
    });
    (Request::from_parts(parts, body), record)
}

type CapturedResponse = (Response, Map<String, Value>, Option<Value>, u64);

async fn capture_response(policy: &InterceptorPolicy, response: Response) -> CapturedResponse {
    let headers = policy.redactor.redact_headers(response.headers());
    let size = response
        .body()
        .size_hint()
        .exact()
        .or_else(|| {
            header_str(response.headers(), header::CONTENT_LENGTH.as_str()).and_then(|v| v.parse().ok())
        })
        .unwrap_or(0);

    if !policy.log_response_body {
        return (response, headers, None, size);
    }
    let Some(limit) = policy.capturable(response.body().size_hint().exact()) else {
        return (response, headers, None, size);
    };

    let (parts, body) = response.into_parts();
    let (body, bytes) = buffer_body(body, limit).await;
    let logged = bytes.map(|bytes| policy.redactor.redact_response_body(&bytes));
    (Response::from_parts(parts, body), headers, logged, size)
}

/// Read up to `limit` bytes of `body` for logging.
///
/// The returned body always yields exactly what the original would have. When
/// the body errors or outgrows `limit`, capture is abandoned: the chunks read
/// so far are replayed ahead of the error or the unread remainder, and no
/// bytes are returned for the log.
async fn buffer_body(body: Body, limit: usize) -> (Body, Option<Bytes>) {
    let mut data = body.into_data_stream();
    let mut chunks: Vec<Bytes> = Vec::new();
    let mut read = 0usize;

    while let Some(next) = data.next().await {
        match next {
            Ok(chunk) => {
                read += chunk.len();
                chunks.push(chunk);
                if read > limit {
                    tracing::debug!(limit, read, "Body outgrew its size hint, not logged");
                    let replay = stream::iter(chunks.into_iter().map(Ok::<_, axum::Error>)).chain(data);
                    return (Body::from_stream(replay), None);
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Body could not be read for logging, passing it through");
                let replay = chunks
                    .into_iter()
                    .map(Ok)
                    .chain(std::iter::once(Err(e)));
                return (Body::from_stream(stream::iter(replay)), None);
            }
        }
    }

    let mut buffered = Vec::with_capacity(read);
    for chunk in &chunks {
        buffered.extend_from_slice(chunk);
    }
    let bytes = Bytes::from(buffered);
    (Body::from(bytes.clone()), Some(bytes))
}

fn context<T: Serialize>(record: &T, message_type: MessageType) -> Map<String, Value> {
    let mut map = match serde_json::to_value(record) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    };
    map.insert("type".to_string(), Value::String(message_type.as_str().to_string()));
    map
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim)
}

fn request_host(request: &Request) -> Option<String> {
    header_str(request.headers(), header::HOST.as_str())
        .map(str::to_string)
        .or_else(|| {
            request.uri().authority().map(|a| a.to_string())
        })
        .filter(|h| !h.is_empty())
}

/// First `x-forwarded-for` hop, then `x-real-ip`, then the peer address.
fn client_ip(request: &Request) -> Option<String> {
    let headers = request.headers();
    header_str(headers, "x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .or_else(|| header_str(headers, "x-real-ip").filter(|ip| !ip.is_empty()))
        .map(str::to_string)
        .or_else(|| {
            request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(builder: axum::http::request::Builder) -> Request {
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn test_client_ip_precedence() {
        let req = request(
            Request::builder()
                .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
                .header("x-real-ip", "198.51.100.2"),
        );
        assert_eq!(client_ip(&req).as_deref(), Some("203.0.113.7"));

        let req = request(Request::builder().header("x-real-ip", "198.51.100.2"));
        assert_eq!(client_ip(&req).as_deref(), Some("198.51.100.2"));

        let mut req = request(Request::builder());
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 4000))));
        assert_eq!(client_ip(&req).as_deref(), Some("127.0.0.1"));

        assert_eq!(client_ip(&request(Request::builder())), None);
    }

    #[test]
    fn test_body_capture_bounds() {
        let policy = InterceptorPolicy::from_config(&HttpLoggingConfig {
            max_body_size: 10,
            ..Default::default()
        });
        assert_eq!(policy.capturable(Some(10)), Some(10));
        assert_eq!(policy.capturable(Some(11)), None);
        assert_eq!(policy.capturable(Some(0)), None);
        assert_eq!(policy.capturable(None), None);
    }

    #[tokio::test]
    async fn test_bounded_body_is_buffered() {
        let (body, logged) = buffer_body(Body::from("hello"), 10).await;
        assert_eq!(logged, Some(Bytes::from_static(b"hello")));
        let replayed = axum::body::to_bytes(body, usize::MAX).await.unwrap();
        assert_eq!(replayed, Bytes::from_static(b"hello"));
    }

    #[tokio::test]
    async fn test_failed_body_read_is_passed_through() {
        let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from_static(b"partial")),
            Err(std::io::Error::other("connection reset")),
        ];
        let (body, logged) = buffer_body(Body::from_stream(stream::iter(chunks)), 64).await;
        assert!(logged.is_none());

        let mut data = body.into_data_stream();
        assert_eq!(data.next().await.unwrap().unwrap(), Bytes::from_static(b"partial"));
        assert!(data.next().await.unwrap().is_err());
    }

    #[tokio::test]
    async fn test_body_outgrowing_limit_is_replayed() {
        let chunks: Vec<Result<&'static str, std::io::Error>> = vec![Ok("abcd"), Ok("efgh"), Ok("ij")];
        let (body, logged) = buffer_body(Body::from_stream(stream::iter(chunks)), 6).await;
        assert!(logged.is_none());

        let replayed = axum::body::to_bytes(body, usize::MAX).await.unwrap();
        assert_eq!(replayed, Bytes::from_static(b"abcdefghij"));
    }

    #[test]
    fn test_request_host() {
        let req = request(Request::builder().header("host", "api.example.com:8080"));
        assert_eq!(request_host(&req).as_deref(), Some("api.example.com:8080"));

        let req = request(Request::builder().uri("http://tickets.example.com/x"));
        assert_eq!(request_host(&req).as_deref(), Some("tickets.example.com"));
    }
}
