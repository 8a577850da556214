use std::time::Instant;

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use text2sql_inference::{models::types::Text2SqlInput, prompt::linearize_schema};
use tracing::{debug, info, instrument};
use utoipa::OpenApi;

use crate::{
    error::{ErrorResponse, Text2SqlServiceError},
    handlers::prometheus::{
        INFERENCE_LATENCY_SECONDS, INFERENCE_REQUESTS_TOTAL, INPUT_TOKENS_TOTAL,
        OUTPUT_TOKENS_TOTAL,
    },
    server::AppState,
    types::{InferenceRequest, InferenceResponse},
};

pub const INFERENCE_PATH: &str = "/inference";

#[derive(OpenApi)]
#[openapi(
    paths(inference_handler),
    components(schemas(InferenceRequest, InferenceResponse, ErrorResponse))
)]
pub(crate) struct InferenceOpenApi;

/// Translates a natural-language question over a database schema into a SQL query.
///
/// The question and schema are linearized into a single prompt, which is run
/// through the seq2seq model on the model thread.
///
/// # Errors
///
/// * `INVALID_BODY` (400) if the body does not deserialize into an [`InferenceRequest`],
///   or if `table_names` and `columns` differ in length
/// * `MODEL_ERROR` (500) if generation fails
/// * `INTERNAL_ERROR` (500) if the model thread is no longer running
#[utoipa::path(
    post,
    path = "",
    tag = "inference",
    request_body = InferenceRequest,
    responses(
        (status = OK, description = "SQL query generated successfully", body = InferenceResponse),
        (status = BAD_REQUEST, description = "Invalid request body", body = ErrorResponse),
        (status = INTERNAL_SERVER_ERROR, description = "Generation failed", body = ErrorResponse)
    )
)]
#[instrument(
    level = "info",
    skip(state, payload),
    fields(path = INFERENCE_PATH)
)]
pub async fn inference_handler(
    State(state): State<AppState>,
    payload: Result<Json<InferenceRequest>, JsonRejection>,
) -> Result<Json<InferenceResponse>, Text2SqlServiceError> {
    let start = Instant::now();
    let result = handle_inference(&state, payload).await;
    let status = match &result {
        Ok(_) => "success",
        Err(Text2SqlServiceError::InvalidBody { .. }) => "invalid_body",
        Err(Text2SqlServiceError::ModelError { .. }) => "model_error",
        Err(Text2SqlServiceError::InternalError { .. }) => "internal_error",
    };
    INFERENCE_REQUESTS_TOTAL.with_label_values(&[status]).inc();
    if result.is_ok() {
        INFERENCE_LATENCY_SECONDS
            .with_label_values(&[state.dispatcher.model_id()])
            .observe(start.elapsed().as_secs_f64());
    }
    result.map(Json)
}

async fn handle_inference(
    state: &AppState,
    payload: Result<Json<InferenceRequest>, JsonRejection>,
) -> Result<InferenceResponse, Text2SqlServiceError> {
    let Json(request) = payload.map_err(|e| Text2SqlServiceError::InvalidBody {
        message: e.body_text(),
        endpoint: INFERENCE_PATH.to_string(),
    })?;
    info!(
        target = "text2sql-service",
        event = "inference_request",
        db_id = request.db_id,
        num_tables = request.table_names.len(),
        "Received inference request"
    );

    let prompt = linearize_schema(
        &request.question,
        &request.db_id,
        request.table_names.as_slice(),
        request.columns.as_slice(),
    )
    .map_err(|e| Text2SqlServiceError::InvalidBody {
        message: e.to_string(),
        endpoint: INFERENCE_PATH.to_string(),
    })?;
    debug!(target = "text2sql-service", prompt, "Linearized schema prompt");

    let output = state
        .dispatcher
        .run_inference(Text2SqlInput::new(prompt))
        .await
        .map_err(|e| Text2SqlServiceError::from_model_thread_error(e, INFERENCE_PATH))?;

    let model = state.dispatcher.model_id();
    INPUT_TOKENS_TOTAL
        .with_label_values(&[model])
        .inc_by(output.input_tokens as u64);
    OUTPUT_TOKENS_TOTAL
        .with_label_values(&[model])
        .inc_by(output.output_tokens as u64);
    info!(
        target = "text2sql-service",
        event = "inference_completed",
        input_tokens = output.input_tokens,
        output_tokens = output.output_tokens,
        generation_time = output.time,
        "Generated SQL query"
    );

    Ok(InferenceResponse {
        result: output.text,
    })
}
