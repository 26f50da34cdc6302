// Shared helpers for HTTP handlers

use axum::http::StatusCode;
use stepline_engine::EngineError;

/// Map engine errors onto transport status codes.
pub fn error_status(error: &EngineError) -> StatusCode {
    if error.is_not_found() {
        return StatusCode::NOT_FOUND;
    }
    match error {
        EngineError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
