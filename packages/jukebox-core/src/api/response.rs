//! Small helpers for returning JSON success responses from REST handlers,
//! paired with [`crate::error::JukeboxError`]'s `IntoResponse` impl for the
//! failure side.

use axum::response::{IntoResponse, Json, Response};
use axum::http::StatusCode;
use serde::Serialize;

/// Wraps any serializable payload as a `200 OK` JSON response.
pub fn api_ok<T: Serialize>(body: T) -> Response {
    Json(body).into_response()
}

/// Wraps any serializable payload with an explicit status code.
pub fn api_success<T: Serialize>(status: StatusCode, body: T) -> Response {
    (status, Json(body)).into_response()
}
