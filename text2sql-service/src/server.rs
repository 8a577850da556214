use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use serde_json::{json, Value};
use text2sql_inference::{
    model_thread::ModelThreadDispatcher,
    models::types::{Text2SqlInput, Text2SqlOutput},
};
use tokio::{net::TcpListener, signal};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};
use utoipa::OpenApi;

use crate::{
    components::openapi::openapi_routes,
    handlers::inference::{inference_handler, INFERENCE_PATH},
};

pub const HEALTH_PATH: &str = "/health";
pub const METRICS_PATH: &str = "/metrics";

/// Represents the shared state of the application.
#[derive(Clone)]
pub struct AppState {
    /// Entry point to the thread that owns the text-to-SQL model.
    ///
    /// Generation requests from every handler are serialized on that thread.
    pub dispatcher: ModelThreadDispatcher<Text2SqlInput, Text2SqlOutput>,
}

/// Creates and configures the main router for the application.
///
/// Sets up the inference, health and metrics routes, the Swagger UI, and
/// request tracing and CORS layers.
pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route(INFERENCE_PATH, post(inference_handler))
        .with_state(app_state)
        .route(HEALTH_PATH, get(health))
        .route(METRICS_PATH, get(metrics_handler))
        .merge(openapi_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Starts and runs the HTTP server, until a Ctrl+C signal is received.
///
/// In-flight requests are allowed to complete before the function returns.
///
/// # Errors
///
/// Returns an error if the server fails while serving connections.
pub async fn run_server(app_state: AppState, tcp_listener: TcpListener) -> anyhow::Result<()> {
    let app = create_router(app_state);
    let shutdown_signal = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(
                target = "text2sql-service",
                event = "shutdown_signal_error",
                error = %e,
                "Failed to listen for Ctrl+C signal"
            );
            return;
        }
        info!("Shutting down server...");
    };
    axum::serve(tcp_listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    Ok(())
}

#[derive(OpenApi)]
#[openapi(paths(health))]
pub(crate) struct HealthOpenApi;

/// Handles the health check endpoint.
///
/// The model is loaded before the server starts listening, so a responsive
/// server is a healthy one.
#[utoipa::path(
    get,
    path = "",
    tag = "health",
    responses(
        (status = OK, description = "Service is healthy", body = Value)
    )
)]
pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

#[derive(OpenApi)]
#[openapi(paths(metrics_handler))]
pub(crate) struct MetricsOpenApi;

/// Exposes the prometheus metrics of the default registry, in text format.
#[utoipa::path(
    get,
    path = "",
    tag = "metrics",
    responses(
        (status = OK, description = "Prometheus metrics", content_type = "text/plain"),
        (status = INTERNAL_SERVER_ERROR, description = "Failed to encode metrics")
    )
)]
pub async fn metrics_handler() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(
            target = "text2sql-service",
            event = "metrics_encoding_error",
            error = %e,
            "Failed to encode prometheus metrics"
        );
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    (
        [(header::CONTENT_TYPE, encoder.format_type().to_string())],
        buffer,
    )
        .into_response()
}
