use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub code: String,
    pub message: String,
    pub hint: String,
}

impl ErrorEnvelope {
    pub fn new(
        code: impl Into<String>,
        message: impl Into<String>,
        hint: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            hint: hint.into(),
        }
    }
}

#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub body: ErrorEnvelope,
}

impl AppError {
    pub fn not_found(msg: impl std::fmt::Display) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            body: ErrorEnvelope::new(
                "not_found",
                msg.to_string(),
                "Check the library and path parameters",
            ),
        }
    }

    pub fn bad_request(msg: impl std::fmt::Display) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: ErrorEnvelope::new(
                "bad_request",
                msg.to_string(),
                "See GET /fields for the writable field catalog",
            ),
        }
    }

    pub fn unsupported(msg: impl std::fmt::Display) -> Self {
        Self {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            body: ErrorEnvelope::new(
                "unsupported_format",
                msg.to_string(),
                "Only decodable image files can be rendered",
            ),
        }
    }

    pub fn internal(msg: impl std::fmt::Display) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: ErrorEnvelope::new(
                "internal_error",
                msg.to_string(),
                "Check service logs for details",
            ),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, axum::Json(self.body)).into_response()
    }
}

impl From<photometa_core::PhotometaError> for AppError {
    fn from(err: photometa_core::PhotometaError) -> Self {
        use photometa_core::PhotometaError as E;
        match &err {
            E::Unreadable { .. } | E::DirectoryUnavailable(_) | E::NotInitialized => {
                AppError::not_found(err)
            }
            E::UnknownField(_) => AppError::bad_request(err),
            E::UnsupportedFormat { .. } => AppError::unsupported(err),
            _ => AppError::internal(err),
        }
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::internal(err)
    }
}
