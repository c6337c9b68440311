//! Error types for the Gateway

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use curevia_core::{i18n, Language, ResolveError};
use thiserror::Error;

/// Gateway error type
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Malformed request: {0}")]
    BadRequest(String),

    #[error("Payload exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error("Rate limit exceeded for {0}")]
    RateLimitExceeded(String),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("Contact relay failed: {0}")]
    ContactRelay(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for GatewayError {
    fn from(e: serde_json::Error) -> Self {
        GatewayError::Serialization(e.to_string())
    }
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::BadRequest(_) | GatewayError::Serialization(_) => StatusCode::BAD_REQUEST,
            GatewayError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            GatewayError::RateLimitExceeded(_) => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::Resolve(e) => match e {
                ResolveError::Validation(_) => StatusCode::BAD_REQUEST,
                ResolveError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
                ResolveError::UpstreamTimeout(_) | ResolveError::Upstream(_) => StatusCode::BAD_GATEWAY,
                ResolveError::Misconfigured(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            GatewayError::ContactRelay(_) => StatusCode::BAD_GATEWAY,
            GatewayError::InvalidConfig(_) | GatewayError::Io(_) | GatewayError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Machine-readable kind for the response body
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::BadRequest(_) | GatewayError::Serialization(_) => "bad_request",
            GatewayError::PayloadTooLarge { .. } => "payload_too_large",
            GatewayError::RateLimitExceeded(_) => "rate_limited",
            GatewayError::Resolve(e) => e.kind(),
            GatewayError::ContactRelay(_) => "upstream_error",
            GatewayError::InvalidConfig(_) | GatewayError::Io(_) | GatewayError::Internal(_) => "internal",
        }
    }

    /// Localized message safe to show a visitor
    pub fn public_message(&self, lang: Language) -> &'static str {
        match self.status() {
            StatusCode::BAD_REQUEST => i18n::invalid_request(lang),
            StatusCode::PAYLOAD_TOO_LARGE => i18n::payload_too_large(lang),
            StatusCode::TOO_MANY_REQUESTS => i18n::rate_limited(lang),
            StatusCode::BAD_GATEWAY => i18n::upstream_failure(lang),
            _ => i18n::internal_error(lang),
        }
    }

    /// Attach the language and detail policy needed to render a response
    pub fn respond(self, lang: Language, debug: bool) -> ApiError {
        ApiError {
            error: self,
            lang,
            debug,
        }
    }
}

/// Renderable error: `{ ok, error, kind, detail? }`
#[derive(Debug)]
pub struct ApiError {
    pub error: GatewayError,
    pub lang: Language,
    pub debug: bool,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.error.status();
        if status.is_server_error() {
            tracing::warn!(kind = self.error.kind(), error = %self.error, "Request failed");
        } else {
            tracing::debug!(kind = self.error.kind(), error = %self.error, "Request rejected");
        }

        let mut body = serde_json::json!({
            "ok": false,
            "error": self.error.public_message(self.lang),
            "kind": self.error.kind(),
        });
        if self.debug {
            body["detail"] = serde_json::Value::String(self.error.to_string());
        }
        (status, Json(body)).into_response()
    }
}

/// Result type for Gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_status_mapping() {
        let timeout = GatewayError::from(ResolveError::UpstreamTimeout(Duration::from_secs(18)));
        assert_eq!(timeout.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(timeout.kind(), "upstream_timeout");

        let upstream = GatewayError::from(ResolveError::Upstream("boom".into()));
        assert_eq!(upstream.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(upstream.kind(), "upstream_error");

        let missing = GatewayError::from(ResolveError::Misconfigured("no key".into()));
        assert_eq!(missing.status(), StatusCode::INTERNAL_SERVER_ERROR);

        assert_eq!(
            GatewayError::PayloadTooLarge { limit: 10 }.status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            GatewayError::RateLimitExceeded("x".into()).status(),
            StatusCode::TOO_MANY_REQUESTS
        );
    }

    #[test]
    fn test_public_message_is_localized() {
        let err = GatewayError::from(ResolveError::Upstream("secret detail".into()));
        assert_eq!(err.public_message(Language::En), i18n::upstream_failure(Language::En));
        assert!(!err.public_message(Language::Sv).contains("secret"));
    }
}
