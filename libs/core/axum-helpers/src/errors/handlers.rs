use axum::response::Response;

use super::{AppError, ErrorCode};

/// Fallback handler for unknown routes.
pub async fn not_found() -> Response {
    super::error_response(
        axum::http::StatusCode::NOT_FOUND,
        "The requested resource was not found".to_string(),
        ErrorCode::NotFound,
    )
}

/// Maps a missing path parameter to a 404 in the same JSON shape as [`AppError`].
pub fn not_found_error(resource: &str, id: impl std::fmt::Display) -> AppError {
    AppError::NotFound(format!("{} {} not found", resource, id))
}
