//! The portal's error taxonomy and its HTTP rendering.
//!
//! Every failure is recoverable by sending the user back to a known screen.
//! Two flags on the JSON body tell the client which screen: `signOut` means
//! the session was (or must be) terminated and the login page is next,
//! `retryable` means the same action may simply be attempted again.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use super::config::ConfigError;
use super::oauth::OAuthError;
use super::password::HashingError;
use super::storage::StorageError;

const INTERNAL_MSG: &str = "An internal server error occurred";

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation failed")]
    Validation(#[from] validator::ValidationErrors),

    #[error("{0}")]
    ValidationStr(String),

    #[error("Invalid request format: {0}")]
    RequestFormat(String),

    // Credential gate
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("{0}")]
    AccountNotFound(String),

    #[error("{0}")]
    EmailNotVerified(String),

    #[error("{0}")]
    AccountBlocked(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    // Backend-as-a-service collaborators
    #[error("Network failure: {0}")]
    Network(String),

    #[error("Upload failed")]
    Upload(#[from] StorageError),

    // Internal libraries
    #[error("Config operation failed")]
    Config(#[from] ConfigError),

    #[error("OAuth operation failed")]
    OAuth(#[from] OAuthError),

    #[error("Password hashing operation failed")]
    Hashing(#[from] HashingError),

    // Third party libraries
    #[error("Multipart operation failed")]
    Multipart(#[from] axum::extract::multipart::MultipartError),

    #[error("Serde JSON operation failed")]
    JsonParse(#[from] serde_json::Error),

    #[error("{INTERNAL_MSG}")]
    Internal,
}

impl AppError {
    /// Errors after which the user must not stay half-authenticated.
    pub fn forces_sign_out(&self) -> bool {
        matches!(
            self,
            AppError::InvalidCredentials
                | AppError::AccountNotFound(_)
                | AppError::EmailNotVerified(_)
                | AppError::AccountBlocked(_)
        )
    }

    /// Errors the user may resolve by repeating the action.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::Network(_) | AppError::Upload(_) => true,
            AppError::OAuth(err) => matches!(err, OAuthError::HttpClient(_)),
            _ => false,
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    retryable: bool,
    #[serde(rename = "signOut", skip_serializing_if = "std::ops::Not::not")]
    sign_out: bool,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let retryable = self.is_retryable();
        let sign_out = self.forces_sign_out();

        let (status, message, details) = match self {
            AppError::Validation(err) => {
                let details = json!(err.field_errors());
                (StatusCode::UNPROCESSABLE_ENTITY, "Validation failed".to_string(), Some(details))
            },
            AppError::ValidationStr(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg, None),
            AppError::RequestFormat(msg) => (StatusCode::BAD_REQUEST, msg, None),

            AppError::InvalidCredentials => (StatusCode::UNAUTHORIZED, "Invalid email or password".to_string(), None),
            AppError::AccountNotFound(msg) => (StatusCode::NOT_FOUND, msg, None),
            AppError::EmailNotVerified(msg) => (StatusCode::FORBIDDEN, msg, None),
            AppError::AccountBlocked(msg) => (StatusCode::FORBIDDEN, msg, None),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg, None),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg, None),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, None),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg, None),

            AppError::Network(msg) => {
                tracing::warn!("backend service unavailable: {}", msg);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "The service is temporarily unreachable. Please try again.".to_string(),
                    None,
                )
            },
            AppError::Upload(err) => {
                tracing::warn!("document upload failed: {:?}", err);
                let message = match err {
                    StorageError::InvalidPath(_) => "The document could not be stored under that name.".to_string(),
                    _ => "Your document could not be uploaded. Please try again.".to_string(),
                };
                (StatusCode::BAD_GATEWAY, message, None)
            },

            AppError::Config(err) => {
                tracing::error!("config error: {:?}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_MSG.to_string(), None)
            },
            AppError::OAuth(err) => {
                let status = match err {
                    OAuthError::InvalidUrl(_) | OAuthError::TokenExchange(_) | OAuthError::ProviderNotFound(_) => {
                        StatusCode::BAD_REQUEST
                    },
                    OAuthError::HttpClient(_) | OAuthError::ProfileParse => StatusCode::BAD_GATEWAY,
                };
                let message = match err {
                    OAuthError::InvalidUrl(_) | OAuthError::ProviderNotFound(_) => err.to_string(),
                    OAuthError::HttpClient(_) | OAuthError::ProfileParse => "Sign-in provider unavailable".to_string(),
                    OAuthError::TokenExchange(_) => "Federated sign-in failed. Please try again.".to_string(),
                };
                (status, message, None)
            },
            AppError::Hashing(err) => {
                tracing::error!("password hashing error: {:?}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_MSG.to_string(), None)
            },
            AppError::Multipart(err) => {
                tracing::warn!("multipart request error: {:?}", err);
                (StatusCode::BAD_REQUEST, "Invalid multipart form data".to_string(), None)
            },
            AppError::JsonParse(err) => {
                tracing::error!("failed to parse JSON: {:?}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_MSG.to_string(), None)
            },
            AppError::Internal => (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_MSG.to_string(), None),
        };

        (status, Json(ErrorResponse { message, details, retryable, sign_out })).into_response()
    }
}
