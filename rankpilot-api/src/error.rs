use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rankpilot_core::CoreError;
use serde_json::json;

#[derive(Debug)]
pub enum AppError {
    Core(CoreError),
    Anyhow(anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Core(err) => match &err {
                CoreError::NotFound { .. } => (StatusCode::NOT_FOUND, err.to_string()),
                CoreError::Validation(_) => (StatusCode::BAD_REQUEST, err.to_string()),
                CoreError::EmptyStatement(_) => (StatusCode::UNPROCESSABLE_ENTITY, err.to_string()),
                CoreError::InvalidState { .. }
                | CoreError::Conflict { .. }
                | CoreError::AlreadyProcessed(_)
                | CoreError::CapacityExceeded { .. } => (StatusCode::CONFLICT, err.to_string()),
                CoreError::Ledger { .. } => {
                    tracing::error!("Internal Server Error: {}", err);
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Internal Server Error".to_string(),
                    )
                }
            },
            AppError::Anyhow(err) => {
                tracing::error!("Internal Server Error: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        Self::Core(err)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Anyhow(err)
    }
}
