// Conn Monitor - API Errors
// Copyright (C) 2026 Christos Daggas
// SPDX-License-Identifier: MIT

use std::any::Any;
use std::fmt::{Display, Formatter};

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

pub(crate) const FORBIDDEN_MESSAGE: &str = "Access forbidden. Plugin requires localhost connection.";
pub(crate) const INTERNAL_MESSAGE: &str = "Internal server error";

#[derive(Debug)]
pub enum ApiError {
    /// Missing or malformed client input.
    Validation { message: &'static str },
    /// Caller is not allowed to reach a protected endpoint.
    AccessDenied,
    /// Anything else; detail stays in the server log.
    Internal { error: anyhow::Error },
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation { .. } => StatusCode::BAD_REQUEST,
            ApiError::AccessDenied => StatusCode::FORBIDDEN,
            ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message sent to the client.
    pub fn public_message(&self) -> &'static str {
        match self {
            ApiError::Validation { message } => message,
            ApiError::AccessDenied => FORBIDDEN_MESSAGE,
            ApiError::Internal { .. } => INTERNAL_MESSAGE,
        }
    }
}

impl Display for ApiError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::Internal { error } => write!(f, "{error:#}"),
            other => write!(f, "{}", other.public_message()),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(error: anyhow::Error) -> Self {
        ApiError::Internal { error }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal { error } = &self {
            error!("Request handling error: {error:#}");
        }
        let body = Json(json!({ "error": self.public_message() }));
        (self.status_code(), body).into_response()
    }
}

/// Renders a handler panic as a generic 500.
pub(crate) fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };
    error!("Request handler panicked: {detail}");
    let body = Json(json!({ "error": INTERNAL_MESSAGE }));
    (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            ApiError::Validation { message: "IP required" }.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::AccessDenied.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            ApiError::from(anyhow!("boom")).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_internal_detail_is_not_public() {
        let err = ApiError::from(anyhow!("registry exploded"));
        assert_eq!(err.public_message(), "Internal server error");
        assert!(err.to_string().contains("registry exploded"));
    }
}
