use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::codec::PathDecodeError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("no route found: {0}")]
    NoRoute(String),

    #[error("routing provider error: {0}")]
    Routing(String),

    #[error("persistence failed: {0}")]
    Persistence(#[from] StoreError),

    #[error("invalid stored path: {0}")]
    PathDecode(#[from] PathDecodeError),

    #[error("completion of vehicle {vehicle_id} failed after {attempts} attempts: {source}")]
    CompletionFailed {
        vehicle_id: Uuid,
        attempts: u32,
        #[source]
        source: Box<AppError>,
    },

    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::NoRoute(_) | AppError::PathDecode(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Routing(_) => StatusCode::BAD_GATEWAY,
            AppError::Persistence(StoreError::NotFound { .. }) => StatusCode::NOT_FOUND,
            AppError::Persistence(_) | AppError::CompletionFailed { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}
