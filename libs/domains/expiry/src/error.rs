//! Error types for the expiry domain.

use axum::response::{IntoResponse, Response};
use axum_helpers::{AppError, ErrorCode};
use thiserror::Error;
use uuid::Uuid;

use crate::models::ServiceType;

pub type ExpiryResult<T> = Result<T, ExpiryError>;

#[derive(Debug, Error)]
pub enum ExpiryError {
    /// A stored expiry date could not be parsed. Skips one service of one client.
    #[error("Invalid {service} expiry date for client {client_id}: '{value}'")]
    InvalidExpiryDate {
        client_id: String,
        service: ServiceType,
        value: String,
    },

    /// The uniqueness key `(client, service, threshold)` is already taken.
    #[error("Client {client_id} already notified for {service} at {threshold_day} days")]
    AlreadyNotified {
        client_id: String,
        service: ServiceType,
        threshold_day: i32,
    },

    #[error("Client not found: {0}")]
    ClientNotFound(String),

    #[error("Notification not found: {0}")]
    NotificationNotFound(Uuid),

    #[error("Client registry unavailable: {0}")]
    RegistryUnavailable(String),

    #[error("Notification store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Template rendering error: {0}")]
    Template(String),

    #[error("Mail delivery failed: {0}")]
    Delivery(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ExpiryError {
    /// Errors that abort a whole scan run rather than a single client.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ExpiryError::RegistryUnavailable(_)
                | ExpiryError::StoreUnavailable(_)
                | ExpiryError::Internal(_)
        )
    }
}

impl From<handlebars::RenderError> for ExpiryError {
    fn from(err: handlebars::RenderError) -> Self {
        ExpiryError::Template(err.to_string())
    }
}

impl From<core_config::ConfigError> for ExpiryError {
    fn from(err: core_config::ConfigError) -> Self {
        ExpiryError::Config(err.to_string())
    }
}

impl From<ExpiryError> for AppError {
    fn from(err: ExpiryError) -> Self {
        match err {
            ExpiryError::ClientNotFound(_) | ExpiryError::NotificationNotFound(_) => {
                AppError::NotFound(err.to_string())
            }
            ExpiryError::AlreadyNotified { .. } => AppError::Conflict(err.to_string()),
            ExpiryError::InvalidExpiryDate { .. } => AppError::UnprocessableEntity(err.to_string()),
            ExpiryError::Validation(msg) => AppError::BadRequest(msg),
            ExpiryError::Delivery(msg) => AppError::BadGateway {
                code: ErrorCode::MailDelivery,
                message: msg,
            },
            ExpiryError::Template(_)
            | ExpiryError::RegistryUnavailable(_)
            | ExpiryError::StoreUnavailable(_)
            | ExpiryError::Config(_)
            | ExpiryError::Internal(_) => AppError::InternalServerError(err.to_string()),
        }
    }
}

impl IntoResponse for ExpiryError {
    fn into_response(self) -> Response {
        AppError::from(self).into_response()
    }
}
