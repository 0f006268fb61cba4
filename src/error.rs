use axum::{
    extract::{
        multipart::MultipartRejection,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;

/// Errors surfaced to HTTP clients. Every variant renders as
/// `{"error": ..., "details"?: ..., "suggestion"?: ...}`.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{message}")]
    Validation {
        message: String,
        details: Vec<String>,
    },
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{message}: {details}")]
    Upstream {
        message: String,
        details: String,
        suggestion: Option<String>,
    },
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    suggestion: Option<String>,
}

impl AppError {
    pub fn validation(message: impl Into<String>, details: Vec<String>) -> Self {
        Self::Validation {
            message: message.into(),
            details,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// A dependency (database, storage, generator) failed. `message` is what the
    /// client sees as `error`; the cause is passed through as `details`.
    pub fn upstream(message: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        Self::Upstream {
            message: message.into(),
            details: format!("{:#}", cause),
            suggestion: None,
        }
    }

    pub fn with_suggestion(self, hint: impl Into<String>) -> Self {
        match self {
            Self::Upstream {
                message, details, ..
            } => Self::Upstream {
                message,
                details,
                suggestion: Some(hint.into()),
            },
            other => other,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation { .. } | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Upstream { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::validation("Invalid request body", vec![rejection.body_text()])
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        Self::validation("Invalid query parameters", vec![rejection.body_text()])
    }
}

impl From<MultipartRejection> for AppError {
    fn from(rejection: MultipartRejection) -> Self {
        Self::BadRequest(format!("Invalid multipart body: {}", rejection.body_text()))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match self {
            Self::Validation { message, details } => ErrorBody {
                error: message,
                details: Some(Value::from(details)),
                suggestion: None,
            },
            Self::Upstream {
                message,
                details,
                suggestion,
            } => ErrorBody {
                error: message,
                details: Some(Value::from(details)),
                suggestion,
            },
            Self::BadRequest(m) | Self::Unauthorized(m) | Self::Forbidden(m) | Self::NotFound(m) => {
                ErrorBody {
                    error: m,
                    details: None,
                    suggestion: None,
                }
            }
        };
        (status, Json(body)).into_response()
    }
}
