// src/error.rs
use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};

use crate::store::StoreError;
use crate::validation::FieldError;

#[derive(Debug)]
pub enum AppError {
    /// Identifier does not have the shape the backend assigns.
    InvalidId(String),
    ValidationError(Vec<FieldError>),
    Conflict(String),
    NotFound(String),
    DatabaseError(StoreError),
}

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

impl AppError {
    pub fn invalid_id(msg: impl Into<String>) -> Self {
        AppError::InvalidId(msg.into())
    }

    pub fn validation(errors: Vec<FieldError>) -> Self {
        AppError::ValidationError(errors)
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        AppError::Conflict(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        AppError::NotFound(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidId(_) | AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (error, details) = match self {
            AppError::InvalidId(msg) | AppError::Conflict(msg) | AppError::NotFound(msg) => {
                (msg, None)
            }
            AppError::ValidationError(errors) => {
                ("Validation failed".to_string(), Some(json!(errors)))
            }
            AppError::DatabaseError(err) => {
                tracing::error!(error = %err, "Database error");
                (
                    "Database error occurred".to_string(),
                    Some(Value::String(err.to_string())),
                )
            }
        };

        let body = Json(ErrorBody {
            success: false,
            error,
            details,
        });

        (status, body).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(msg) => AppError::conflict(msg),
            StoreError::Constraint(errors) => AppError::ValidationError(errors),
            other => AppError::DatabaseError(other),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::ValidationError(vec![FieldError::new("body", rejection.body_text())])
    }
}
