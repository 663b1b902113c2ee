use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::core::security::TokenError;
use crate::core::state::AppState;
use crate::services::exam_session::ExamError;

const INVALID_CREDENTIALS: &str = "Invalid authentication credentials";
const GENERIC_INTERNAL: &str = "Internal server error";

#[derive(Debug, Serialize)]
struct ErrorResponse {
    status: u16,
    detail: String,
}

#[derive(Debug)]
pub(crate) enum ApiError {
    Unauthorized(&'static str),
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    TooManyRequests(&'static str),
    ServiceUnavailable(&'static str),
    Internal(String),
}

impl ApiError {
    /// Log the underlying error with context and return an `Internal` variant.
    pub(crate) fn internal(err: impl std::fmt::Display, context: &str) -> Self {
        tracing::error!(error = %err, "{context}");
        Self::Internal(context.to_string())
    }

    /// Maps an engine error to its HTTP form. Internal details are only
    /// exposed when `expose_internal` is set.
    pub(crate) fn from_exam(err: ExamError, expose_internal: bool) -> Self {
        match err {
            ExamError::Token(token) => Self::Unauthorized(token_message(&token)),
            ExamError::Unauthorized(message) => Self::Unauthorized(message),
            ExamError::RateLimited => Self::TooManyRequests("Heartbeat sent too frequently"),
            ExamError::Busy => Self::ServiceUnavailable("Submission in progress, retry shortly"),
            ExamError::AlreadySubmitted => Self::Conflict("Exam already submitted".to_string()),
            ExamError::Expired => Self::Conflict("Exam deadline has passed".to_string()),
            ExamError::InvalidState(message) => Self::BadRequest(message.to_string()),
            ExamError::NotFound(message) => Self::NotFound(message.to_string()),
            ExamError::Internal(message) if expose_internal => Self::Internal(message),
            ExamError::Internal(_) => Self::Internal(GENERIC_INTERNAL.to_string()),
        }
    }
}

/// Maps engine errors using the running environment's disclosure policy.
pub(crate) fn exam_error(state: &AppState) -> impl Fn(ExamError) -> ApiError {
    let expose_internal = !state.settings().runtime().environment.is_production();
    move |err| ApiError::from_exam(err, expose_internal)
}

fn token_message(err: &TokenError) -> &'static str {
    match err {
        TokenError::Expired => "Token has expired",
        TokenError::InvalidAccessToken(inner) if **inner == TokenError::Expired => {
            "Token has expired"
        }
        TokenError::UserMismatch | TokenError::FingerprintMismatch => {
            "Exam session does not belong to this client"
        }
        _ => INVALID_CREDENTIALS,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Unauthorized(message) => {
                let status = StatusCode::UNAUTHORIZED;
                let mut response = (
                    status,
                    Json(ErrorResponse { status: status.as_u16(), detail: message.to_string() }),
                )
                    .into_response();
                response
                    .headers_mut()
                    .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
                response
            }
            ApiError::BadRequest(message) => {
                let status = StatusCode::BAD_REQUEST;
                (status, Json(ErrorResponse { status: status.as_u16(), detail: message }))
                    .into_response()
            }
            ApiError::NotFound(message) => {
                let status = StatusCode::NOT_FOUND;
                (status, Json(ErrorResponse { status: status.as_u16(), detail: message }))
                    .into_response()
            }
            ApiError::Conflict(message) => {
                let status = StatusCode::CONFLICT;
                (status, Json(ErrorResponse { status: status.as_u16(), detail: message }))
                    .into_response()
            }
            ApiError::TooManyRequests(message) => {
                let status = StatusCode::TOO_MANY_REQUESTS;
                (
                    status,
                    Json(ErrorResponse { status: status.as_u16(), detail: message.to_string() }),
                )
                    .into_response()
            }
            ApiError::ServiceUnavailable(message) => {
                let status = StatusCode::SERVICE_UNAVAILABLE;
                let mut response = (
                    status,
                    Json(ErrorResponse { status: status.as_u16(), detail: message.to_string() }),
                )
                    .into_response();
                response.headers_mut().insert(header::RETRY_AFTER, HeaderValue::from_static("1"));
                response
            }
            ApiError::Internal(message) => {
                tracing::error!(error = %message, "Internal server error");
                let status = StatusCode::INTERNAL_SERVER_ERROR;
                (status, Json(ErrorResponse { status: status.as_u16(), detail: message }))
                    .into_response()
            }
        }
    }
}
