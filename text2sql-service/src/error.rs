use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use text2sql_inference::model_thread::ModelThreadError;
use thiserror::Error;
use utoipa::ToSchema;

/// Response structure for API errors
///
/// This struct is used to provide a consistent error response format across the API.
/// It wraps [`ErrorDetails`] in an `error` field to maintain a standard JSON structure
/// like `{"error": {...}}`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

/// Details of an API error response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetails {
    /// A machine-readable error code string (e.g., "INVALID_BODY", "MODEL_ERROR")
    pub code: String,
    /// A human-readable error message describing what went wrong
    pub message: String,
}

/// Represents all possible errors that can occur within the text2sql service
#[derive(Debug, Error)]
pub enum Text2SqlServiceError {
    /// Error returned when the request body is malformed or contains invalid data
    #[error("Invalid request body: {message}")]
    InvalidBody {
        /// Description of why the request body is invalid
        message: String,
        /// The endpoint that the error occurred on
        endpoint: String,
    },

    /// Error returned when the model fails to generate a query
    #[error("Model error: {model_error}")]
    ModelError {
        /// Description of the model error
        model_error: String,
        /// The endpoint that the error occurred on
        endpoint: String,
    },

    /// Error returned for unexpected internal server errors
    #[error("Internal server error: {message}")]
    InternalError {
        /// Description of the internal error
        message: String,
        /// The endpoint that the error occurred on
        endpoint: String,
    },
}

impl Text2SqlServiceError {
    /// Maps a model thread failure into the API error taxonomy.
    ///
    /// Generation failures surface as `MODEL_ERROR`, an unavailable model
    /// thread as `INTERNAL_ERROR`.
    pub fn from_model_thread_error(error: ModelThreadError, endpoint: &str) -> Self {
        match error {
            ModelThreadError::ModelError(e) => Self::ModelError {
                model_error: e.to_string(),
                endpoint: endpoint.to_string(),
            },
            e => Self::InternalError {
                message: e.to_string(),
                endpoint: endpoint.to_string(),
            },
        }
    }

    /// Returns the machine-readable error code for this error type
    ///
    /// - `"INVALID_BODY"` for malformed request bodies
    /// - `"MODEL_ERROR"` for generation failures
    /// - `"INTERNAL_ERROR"` for unexpected server errors
    fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidBody { .. } => "INVALID_BODY",
            Self::ModelError { .. } => "MODEL_ERROR",
            Self::InternalError { .. } => "INTERNAL_ERROR",
        }
    }

    /// Returns a user-friendly error message for API responses, internal
    /// details excluded.
    fn client_message(&self) -> String {
        match self {
            Self::InvalidBody { message, .. } => format!("Invalid request body: {}", message),
            Self::ModelError { .. } => "Failed to generate SQL query".to_string(),
            Self::InternalError { .. } => "Internal server error occurred".to_string(),
        }
    }

    /// Returns the HTTP status code associated with this error
    ///
    /// - `400 Bad Request` for invalid request bodies
    /// - `500 Internal Server Error` for model and internal errors
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidBody { .. } => StatusCode::BAD_REQUEST,
            Self::ModelError { .. } | Self::InternalError { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn endpoint(&self) -> &str {
        match self {
            Self::InvalidBody { endpoint, .. }
            | Self::ModelError { endpoint, .. }
            | Self::InternalError { endpoint, .. } => endpoint,
        }
    }
}

impl IntoResponse for Text2SqlServiceError {
    fn into_response(self) -> Response {
        tracing::error!(
            target = "text2sql-service",
            event = "error_occurred",
            endpoint = self.endpoint(),
            error = %self,
        );
        let error_response = ErrorResponse {
            error: ErrorDetails {
                code: self.error_code().to_string(),
                message: self.client_message(),
            },
        };
        (self.status_code(), Json(error_response)).into_response()
    }
}
