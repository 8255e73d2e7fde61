/// Unified error types for Aquanode
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Main error type for the service
#[derive(Error, Debug)]
pub enum AppError {
    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Login failure. Deliberately uniform regardless of whether the email
    /// existed or the password was wrong, to avoid user enumeration.
    #[error("Invalid email or password")]
    InvalidCredentials,

    /// Account exists but is not active
    #[error("User account is inactive")]
    AccountInactive,

    /// Email already registered
    #[error("Email already registered")]
    DuplicateEmail,

    /// Role not known to the role registry or default set
    #[error("Invalid role: {0}")]
    InvalidRole(String),

    /// Not found errors (account/device/token)
    #[error("Not found: {0}")]
    NotFound(String),

    /// No unused reset token matches the (email, otp) pair
    #[error("Invalid OTP")]
    InvalidOtp,

    /// Expired token or OTP
    #[error("Expired: {0}")]
    Expired(String),

    /// Authorization errors
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Telemetry search called without any filter
    #[error("At least one search parameter is required")]
    MissingFilter,

    /// External collaborator unreachable and no fallback is defined
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Single-message validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Field-level validation failures with a field -> message mapping
    #[error("Validation failed")]
    ValidationFailed(HashMap<String, String>),

    /// Conflict errors (e.g., duplicate device registration)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Collapse a `validator` error set into the field -> message form
    pub fn from_validation(errors: validator::ValidationErrors) -> Self {
        let fields = errors
            .field_errors()
            .into_iter()
            .map(|(field, errs)| {
                let message = errs
                    .first()
                    .and_then(|e| e.message.as_ref())
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| "invalid value".to_string());
                (field.to_string(), message)
            })
            .collect();
        AppError::ValidationFailed(fields)
    }
}

/// Error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<HashMap<String, String>>,
}

/// Convert AppError to HTTP response
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let fields = match &self {
            AppError::ValidationFailed(map) => Some(map.clone()),
            _ => None,
        };

        let (status, error_code, message) = match self {
            AppError::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                "InvalidCredentials",
                self.to_string(),
            ),
            AppError::AccountInactive => (
                StatusCode::FORBIDDEN,
                "AccountInactive",
                self.to_string(),
            ),
            AppError::DuplicateEmail => (
                StatusCode::CONFLICT,
                "DuplicateEmail",
                self.to_string(),
            ),
            AppError::InvalidRole(_) => (
                StatusCode::BAD_REQUEST,
                "InvalidRole",
                self.to_string(),
            ),
            AppError::NotFound(_) => (
                StatusCode::NOT_FOUND,
                "NotFound",
                self.to_string(),
            ),
            AppError::InvalidOtp => (
                StatusCode::BAD_REQUEST,
                "InvalidOtp",
                self.to_string(),
            ),
            AppError::Expired(_) => (
                StatusCode::UNAUTHORIZED,
                "Expired",
                self.to_string(),
            ),
            AppError::Forbidden(_) => (
                StatusCode::FORBIDDEN,
                "Forbidden",
                self.to_string(),
            ),
            AppError::MissingFilter => (
                StatusCode::BAD_REQUEST,
                "MissingFilter",
                self.to_string(),
            ),
            AppError::ServiceUnavailable(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "ServiceUnavailable",
                self.to_string(),
            ),
            AppError::Validation(_) | AppError::ValidationFailed(_) => (
                StatusCode::BAD_REQUEST,
                "ValidationFailed",
                self.to_string(),
            ),
            AppError::Conflict(_) => (
                StatusCode::CONFLICT,
                "Conflict",
                self.to_string(),
            ),
            AppError::Database(_) | AppError::Io(_) | AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "InternalServerError",
                "Internal server error".to_string(), // Don't leak details
            ),
        };

        let body = Json(ErrorResponse {
            error: error_code.to_string(),
            message,
            fields,
        });

        (status, body).into_response()
    }
}

/// Result type alias for service operations
pub type AppResult<T> = Result<T, AppError>;
