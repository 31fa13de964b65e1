use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;
use validator::ValidationErrors;

use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation failed")]
    Validation(#[from] ValidationErrors),

    #[error("{0}")]
    BadRequest(String),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(msg) => AppError::Conflict(msg),
            other => AppError::Internal(other.into()),
        }
    }
}

/// Flattens `validator` output into `[{field, message}]`.
fn field_errors(errors: &ValidationErrors) -> Vec<serde_json::Value> {
    let mut flat: Vec<_> = errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |e| {
                let message = e
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("Invalid {field}"));
                json!({ "field": field, "message": message })
            })
        })
        .collect();

    flat.sort_by(|a, b| a["field"].as_str().cmp(&b["field"].as_str()));
    flat
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            AppError::Validation(errors) => (
                StatusCode::BAD_REQUEST,
                json!({ "errors": field_errors(errors) }),
            ),
            AppError::BadRequest(_) | AppError::InvalidCredentials | AppError::Conflict(_) => {
                (StatusCode::BAD_REQUEST, json!({ "message": self.to_string() }))
            }
            AppError::Unauthorized(_) => {
                (StatusCode::UNAUTHORIZED, json!({ "message": self.to_string() }))
            }
            AppError::Forbidden(_) => (StatusCode::FORBIDDEN, json!({ "message": self.to_string() })),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, json!({ "message": self.to_string() })),
            AppError::Internal(err) => {
                error!("Internal error: {err:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "message": "Server error", "error": err.to_string() }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let cases = [
            (AppError::InvalidCredentials, StatusCode::BAD_REQUEST),
            (AppError::Unauthorized("No token".into()), StatusCode::UNAUTHORIZED),
            (AppError::Forbidden("Admin only".into()), StatusCode::FORBIDDEN),
            (AppError::NotFound("Test"), StatusCode::NOT_FOUND),
            (
                AppError::Internal(anyhow::anyhow!("boom")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }

    #[test]
    fn test_not_found_message() {
        assert_eq!(AppError::NotFound("Test").to_string(), "Test not found");
    }

    #[test]
    fn test_store_conflict_is_bad_request() {
        let err: AppError = StoreError::Conflict("Phone already registered".into()).into();
        assert!(matches!(err, AppError::Conflict(_)));
    }
}
