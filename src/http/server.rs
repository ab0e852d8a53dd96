//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum Router with the service handlers
//! - Wire up middleware (trace, request ID, caller identity, telemetry)
//! - Apply interceptor policy reloads pushed by the config watcher
//! - Serve until the shutdown broadcast fires

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Path, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::config::schema::TelemetryConfig;
use crate::delivery::manager::DeliveryManager;
use crate::http::interceptor::{telemetry_middleware, AuthenticatedUser, TelemetryInterceptor};

/// Header an upstream gateway uses to pass the authenticated user id.
pub const X_USER_ID: &str = "x-user-id";

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub delivery: Arc<DeliveryManager>,
    pub interceptor: TelemetryInterceptor,
}

/// HTTP server for the telemetry-instrumented service.
pub struct HttpServer {
    router: Router,
    interceptor: TelemetryInterceptor,
}

impl HttpServer {
    pub fn new(delivery: Arc<DeliveryManager>, interceptor: TelemetryInterceptor) -> Self {
        let state = AppState {
            delivery,
            interceptor: interceptor.clone(),
        };
        Self {
            router: build_router(state),
            interceptor,
        }
    }

    /// The router, for in-process testing.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<TelemetryConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let interceptor = self.interceptor.clone();
        tokio::spawn(async move {
            while let Some(config) = config_updates.recv().await {
                interceptor.reload(&config.http_logging);
            }
        });

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Build the Axum router with all middleware layers.
pub fn build_router(state: AppState) -> Router {
    let interceptor = state.interceptor.clone();
    Router::new()
        .route("/health", get(health_handler))
        .route("/v1/orders", axum::routing::post(create_order))
        .route("/v1/orders/{id}", get(get_order))
        .with_state(state)
        .layer(middleware::from_fn_with_state(interceptor, telemetry_middleware))
        .layer(middleware::from_fn(identify_user))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(TraceLayer::new_for_http())
}

/// Stands in for an auth layer: trusts the gateway's `x-user-id` header.
async fn identify_user(mut request: Request, next: Next) -> Response {
    let user = request
        .headers()
        .get(X_USER_ID)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|v| AuthenticatedUser(v.to_string()));
    if let Some(user) = user {
        request.extensions_mut().insert(user);
    }
    next.run(request).await
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let connected = state.delivery.is_connected().await;
    Json(json!({
        "status": "ok",
        "broker": if connected { "connected" } else { "degraded" },
        "provider": state.delivery.provider_name(),
    }))
}

async fn get_order(Path(id): Path<u64>) -> impl IntoResponse {
    Json(json!({
        "id": id,
        "status": "confirmed",
        "tickets": 2,
    }))
}

#[derive(Debug, Deserialize)]
struct NewOrder {
    event_id: u64,
    quantity: u32,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

async fn create_order(State(state): State<AppState>, Json(order): Json<NewOrder>) -> Response {
    if order.quantity == 0 {
        return (StatusCode::UNPROCESSABLE_ENTITY, Json(json!({"error": "quantity must be > 0"}))).into_response();
    }

    let mut data = Map::new();
    data.insert("event_id".to_string(), json!(order.event_id));
    data.insert("quantity".to_string(), json!(order.quantity));
    state
        .interceptor
        .logger()
        .log_business_event("order_created", data)
        .await;

    tracing::debug!(event_id = order.event_id, extra_fields = order.extra.len(), "Order accepted");
    (
        StatusCode::CREATED,
        Json(json!({
            "id": 1001,
            "event_id": order.event_id,
            "quantity": order.quantity,
            "access_token": "ord_tok_1001",
        })),
    )
        .into_response()
}
