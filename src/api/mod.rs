use crate::config::Config;
use crate::services::bulk_service::BulkService;
use crate::services::gateway_service::GatewayService;
use crate::services::health_service::HealthService;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::{
    Router,
    routing::{get, post},
};
use std::time::Duration;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

pub mod bulk;
pub mod dto;
pub mod health;
pub mod messages;
pub mod middleware;

#[derive(Clone, Debug)]
pub struct AppState {
    pub gateway_service: GatewayService,
    pub bulk_service: BulkService,
}

#[derive(Clone, Debug)]
pub struct MgmtState {
    pub health_service: HealthService,
}

#[derive(Debug)]
pub struct ServiceContainer {
    pub gateway_service: GatewayService,
    pub bulk_service: BulkService,
}

/// Configures and returns the primary application router.
///
/// Single-message routes are bounded by the request timeout; `/bulkSend` runs under the bulk
/// deadline enforced by the fan-out engine.
pub fn app_router(config: &Config, services: ServiceContainer) -> Router {
    let request_timeout = Duration::from_secs(config.server.request_timeout_secs);
    let state = AppState { gateway_service: services.gateway_service, bulk_service: services.bulk_service };

    let message_routes = Router::new()
        .route("/sendMessage", post(messages::send_message))
        .route("/queryMessage", get(messages::query_message))
        .route("/cancelMessage", post(messages::cancel_message))
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, request_timeout));

    let bulk_routes = Router::new().route("/bulkSend", post(bulk::bulk_send));

    Router::new()
        .merge(message_routes)
        .merge(bulk_routes)
        .layer(PropagateRequestIdLayer::new(axum::http::HeaderName::from_static("x-request-id")))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(move |request: &Request<Body>| {
                    let request_id = request
                        .extensions()
                        .get::<tower_http::request_id::RequestId>()
                        .map(|id| id.header_value().to_str().unwrap_or_default())
                        .unwrap_or_default()
                        .to_string();

                    tracing::info_span!(
                        "request",
                        "request_id" = %request_id,
                        "http.request.method" = %request.method(),
                        "url.path" = %request.uri().path(),
                        "http.response.status_code" = tracing::field::Empty,
                        "otel.kind" = "server",
                    )
                })
                .on_response(
                    |response: &axum::http::Response<_>, latency: std::time::Duration, _span: &tracing::Span| {
                        let status = response.status();
                        tracing::Span::current().record("http.response.status_code", status.as_u16());

                        tracing::info!(
                            latency_ms = %latency.as_millis(),
                            status = %status.as_u16(),
                            "request completed"
                        );
                    },
                )
                .on_failure(|error, _latency, _span: &tracing::Span| {
                    tracing::error!(error = %error, "request failed");
                }),
        )
        .layer(SetRequestIdLayer::new(
            axum::http::HeaderName::from_static("x-request-id"),
            middleware::MakeRequestUuidV7,
        ))
        .with_state(state)
}

pub fn mgmt_router(state: MgmtState) -> Router {
    Router::new().route("/livez", get(health::livez)).route("/readyz", get(health::readyz)).with_state(state)
}
