use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::handlers::inference::{InferenceOpenApi, INFERENCE_PATH};
use crate::server::{HealthOpenApi, MetricsOpenApi, HEALTH_PATH, METRICS_PATH};

pub const SWAGGER_UI_PATH: &str = "/swagger-ui";
pub const OPENAPI_JSON_PATH: &str = "/api-docs/openapi.json";

#[derive(OpenApi)]
#[openapi(
    nest(
        (path = HEALTH_PATH, api = HealthOpenApi),
        (path = METRICS_PATH, api = MetricsOpenApi),
        (path = INFERENCE_PATH, api = InferenceOpenApi),
    ),
    tags(
        (name = "health", description = "Health check"),
        (name = "metrics", description = "Metrics"),
        (name = "inference", description = "Text-to-SQL inference"),
    ),
    servers(
        (url = "http://localhost:8080"),
    )
)]
pub struct ApiDoc;

pub fn openapi_routes() -> Router {
    Router::new().merge(SwaggerUi::new(SWAGGER_UI_PATH).url(OPENAPI_JSON_PATH, ApiDoc::openapi()))
}
