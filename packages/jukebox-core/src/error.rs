//! Centralized error types for the jukebox core library.
//!
//! This module provides a unified error handling system that:
//! - Defines structured error types using `thiserror`
//! - Maps errors to appropriate HTTP status codes
//! - Implements `IntoResponse` for automatic JSON error responses on the REST surface
//! - Converts to a plain `{message}` payload for the WebSocket `error` envelope

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Trait for error types that provide machine-readable error codes.
pub trait ErrorCode {
    /// Returns a machine-readable error code for API responses.
    fn code(&self) -> &'static str;
}

/// Application-wide error type for the jukebox server.
#[derive(Debug, Error, Serialize)]
#[serde(tag = "type", content = "details")]
pub enum JukeboxError {
    /// A connection attempted an operation its role does not permit.
    #[error("{0}")]
    AuthorizationDenied(String),

    /// A command envelope was missing a required field or carried an invalid value.
    #[error("Malformed command: {0}")]
    MalformedCommand(String),

    /// Requested room does not exist.
    #[error("Room not found: {0}")]
    RoomNotFound(String),

    /// Requested queue item does not exist.
    #[error("Queue item not found: {0}")]
    ItemNotFound(String),

    /// The blob store adapter failed.
    #[error("Blob store error: {0}")]
    BlobStore(String),

    /// The media provider adapter failed.
    #[error("Media provider error: {0}")]
    MediaProvider(String),

    /// A download did not complete within its deadline.
    #[error("Download timed out")]
    DeadlineExceeded,

    /// Caller exceeded the admission rate for this identity.
    #[error("Rate limited, retry after {retry_after_secs}s")]
    RateLimited {
        /// Seconds the caller should wait before retrying.
        retry_after_secs: u64,
    },

    /// The estimated or reported size exceeds the configured limit.
    #[error("Requested media exceeds size limit")]
    SizeOverLimit,

    /// Size could not be determined; fail-closed rather than risk an unbounded download.
    #[error("Requested media size could not be determined")]
    SizeUnknown,

    /// Catch-all for I/O and serialization failures at adapter boundaries.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl JukeboxError {
    /// Returns a machine-readable error code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::AuthorizationDenied(_) => "authorization_denied",
            Self::MalformedCommand(_) => "malformed_command",
            Self::RoomNotFound(_) => "room_not_found",
            Self::ItemNotFound(_) => "item_not_found",
            Self::BlobStore(_) => "blob_store_error",
            Self::MediaProvider(_) => "media_provider_error",
            Self::DeadlineExceeded => "deadline_exceeded",
            Self::RateLimited { .. } => "rate_limited",
            Self::SizeOverLimit => "size_over_limit",
            Self::SizeUnknown => "size_unknown",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Maps the error to an appropriate HTTP status code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::RoomNotFound(_) | Self::ItemNotFound(_) => StatusCode::NOT_FOUND,
            Self::AuthorizationDenied(_) => StatusCode::FORBIDDEN,
            Self::MalformedCommand(_) | Self::SizeOverLimit | Self::SizeUnknown => {
                StatusCode::BAD_REQUEST
            }
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
            Self::BlobStore(_) | Self::MediaProvider(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Renders the error as the `{message}` payload sent to the offending
    /// WebSocket sender only (never broadcast).
    pub fn to_ws_message(&self) -> String {
        self.to_string()
    }
}

/// Convenient Result alias for application-wide operations.
pub type JukeboxResult<T> = Result<T, JukeboxError>;

/// JSON response body for error responses.
#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
    status: u16,
}

impl IntoResponse for JukeboxError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let mut response = (
            status,
            Json(ErrorResponse {
                error: self.code(),
                message: self.to_string(),
                status: status.as_u16(),
            }),
        )
            .into_response();

        if let Self::RateLimited { retry_after_secs } = self {
            if let Ok(value) = retry_after_secs.to_string().parse() {
                response.headers_mut().insert("Retry-After", value);
            }
        }

        response
    }
}

impl From<reqwest::Error> for JukeboxError {
    fn from(err: reqwest::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for JukeboxError {
    fn from(err: serde_json::Error) -> Self {
        Self::MalformedCommand(err.to_string())
    }
}

impl From<std::io::Error> for JukeboxError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_not_found_returns_correct_code() {
        let err = JukeboxError::RoomNotFound("room1".into());
        assert_eq!(err.code(), "room_not_found");
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn rate_limited_returns_429() {
        let err = JukeboxError::RateLimited {
            retry_after_secs: 30,
        };
        assert_eq!(err.code(), "rate_limited");
        assert_eq!(err.status_code(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn size_unknown_is_bad_request() {
        let err = JukeboxError::SizeUnknown;
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }
}
