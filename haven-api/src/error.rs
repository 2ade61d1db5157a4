use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use haven_core::CoreError;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error("Authentication failed: {0}")]
    Unauthorized(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let core = match self {
            AppError::Unauthorized(msg) => {
                let body = Json(json!({ "error": msg }));
                return (StatusCode::UNAUTHORIZED, body).into_response();
            }
            AppError::Core(core) => core,
        };

        let (status, body) = match &core {
            CoreError::Validation { field, message } => (
                StatusCode::BAD_REQUEST,
                json!({ "error": message, "field": field }),
            ),
            CoreError::Unavailable(msg) => (StatusCode::CONFLICT, json!({ "error": msg })),
            CoreError::RateLimited { retry_after_secs } => (
                StatusCode::TOO_MANY_REQUESTS,
                json!({
                    "error": core.to_string(),
                    "retry_after_secs": retry_after_secs,
                }),
            ),
            // Also what a caller sees for somebody else's booking
            CoreError::NotFound(_) => (StatusCode::NOT_FOUND, json!({ "error": "Not found" })),
            CoreError::AccessDenied(msg) => (StatusCode::FORBIDDEN, json!({ "error": msg })),
            CoreError::Conflict(msg) => (StatusCode::CONFLICT, json!({ "error": msg })),
            CoreError::InvalidTransition { .. } => {
                (StatusCode::CONFLICT, json!({ "error": core.to_string() }))
            }
            CoreError::External(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": "Something went wrong on our side, please try again" }),
            ),
        };

        let mut response = (status, Json(body)).into_response();
        if let CoreError::RateLimited { retry_after_secs } = core {
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

pub type ApiResult<T> = Result<T, AppError>;
