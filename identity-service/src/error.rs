//! Maps `AuthError` onto the HTTP error surface. Status codes follow
//! `ErrorKind::http_status()`; the stable `error` code string is chosen per
//! endpoint since the same underlying kind means something different
//! depending which flow produced it (e.g. `Validation` during registration
//! is `registration_failed`, during reset it's `password_reset_failed`).

use crate::dto::ErrorEnvelope;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use common_error::ErrorKind;
use identity_auth::AuthError;

pub struct ApiError {
    code: &'static str,
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(code: &'static str, kind: ErrorKind, message: String) -> Self {
        let status = StatusCode::from_u16(kind.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Self { code, status, message }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new("invalid_request", ErrorKind::Validation, message.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorEnvelope { error: self.code, message: self.message, details: None })).into_response()
    }
}

fn code_for(err: &AuthError, default: &'static str) -> &'static str {
    match err.kind() {
        ErrorKind::Validation => "validation_failed",
        _ => default,
    }
}

pub fn register_error(err: AuthError) -> ApiError {
    ApiError::new(code_for(&err, "registration_failed"), err.kind(), err.to_string())
}

pub fn login_error(err: AuthError) -> ApiError {
    ApiError::new(code_for(&err, "login_failed"), err.kind(), err.to_string())
}

pub fn refresh_error(err: AuthError) -> ApiError {
    ApiError::new(code_for(&err, "token_refresh_failed"), err.kind(), err.to_string())
}

pub fn session_error(err: AuthError) -> ApiError {
    ApiError::new("invalid_session", err.kind(), err.to_string())
}

pub fn unauthorized(message: impl Into<String>) -> ApiError {
    ApiError::new("unauthorized", ErrorKind::PermissionDenied, message.into())
}

pub fn forgot_password_error(err: AuthError) -> ApiError {
    ApiError::new(code_for(&err, "forgot_password_failed"), err.kind(), err.to_string())
}

pub fn password_reset_error(err: AuthError) -> ApiError {
    ApiError::new(code_for(&err, "password_reset_failed"), err.kind(), err.to_string())
}

pub fn email_verification_error(err: AuthError) -> ApiError {
    ApiError::new(code_for(&err, "email_verification_failed"), err.kind(), err.to_string())
}

pub fn resend_verification_error(err: AuthError) -> ApiError {
    ApiError::new(code_for(&err, "resend_verification_failed"), err.kind(), err.to_string())
}

pub fn validation_error(err: AuthError) -> ApiError {
    ApiError::new(code_for(&err, "validation_failed"), err.kind(), err.to_string())
}
