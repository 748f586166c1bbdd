//! # Error Handling
//!
//! Custom error types for the gateway and their conversion to HTTP responses.
//!
//! ## Error Categories:
//! - **Internal**: server-side problems (500 errors)
//! - **BadRequest**: client sent invalid data (400 errors)
//! - **ConfigError**: configuration problems (500 errors)
//! - **TokenMint**: the ephemeral token exchange with the upstream failed (502)
//! - **UpstreamConnect**: the realtime upstream connection could not be opened (502)
//!
//! The WebSocket session bridge does not return these from its handlers —
//! failures there are reported to the client as in-band error events and the
//! session keeps or tears down its state as appropriate. This type covers the
//! HTTP surface and the upstream collaborators (minter, connector), so `?`
//! composes across both.

use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use std::fmt;

/// Custom error types for the gateway.
#[derive(Debug)]
pub enum GatewayError {
    /// Internal server errors (lock poisoning, serialization failures, etc.)
    Internal(String),

    /// Client sent invalid or malformed data
    BadRequest(String),

    /// Configuration file or environment variable problems
    ConfigError(String),

    /// Exchanging the long-lived secret for an ephemeral upstream token failed
    TokenMint(String),

    /// Opening or configuring the upstream realtime connection failed
    UpstreamConnect(String),
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayError::Internal(msg) => write!(f, "Internal error: {}", msg),
            GatewayError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            GatewayError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            GatewayError::TokenMint(msg) => write!(f, "Token minting failed: {}", msg),
            GatewayError::UpstreamConnect(msg) => {
                write!(f, "Upstream connection failed: {}", msg)
            }
        }
    }
}

impl std::error::Error for GatewayError {}

/// Converts gateway errors into JSON HTTP responses.
///
/// ## HTTP Status Code Mapping:
/// - Internal/ConfigError → 500 (Internal Server Error)
/// - BadRequest → 400 (Bad Request)
/// - TokenMint/UpstreamConnect → 502 (Bad Gateway)
///
/// ## JSON Response Format:
/// ```json
/// {
///   "error": {
///     "type": "token_mint_failed",
///     "message": "...",
///     "timestamp": "2025-01-01T12:00:00Z"
///   }
/// }
/// ```
impl ResponseError for GatewayError {
    fn error_response(&self) -> HttpResponse {
        let (status, error_type, message) = match self {
            GatewayError::Internal(msg) => (
                actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                msg.clone(),
            ),
            GatewayError::BadRequest(msg) => (
                actix_web::http::StatusCode::BAD_REQUEST,
                "bad_request",
                msg.clone(),
            ),
            GatewayError::ConfigError(msg) => (
                actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
                "config_error",
                msg.clone(),
            ),
            GatewayError::TokenMint(msg) => (
                actix_web::http::StatusCode::BAD_GATEWAY,
                "token_mint_failed",
                msg.clone(),
            ),
            GatewayError::UpstreamConnect(msg) => (
                actix_web::http::StatusCode::BAD_GATEWAY,
                "upstream_connect_failed",
                msg.clone(),
            ),
        };

        HttpResponse::build(status).json(json!({
            "error": {
                "type": error_type,
                "message": message,
                "timestamp": chrono::Utc::now().to_rfc3339()
            }
        }))
    }
}

impl From<anyhow::Error> for GatewayError {
    fn from(err: anyhow::Error) -> Self {
        GatewayError::Internal(err.to_string())
    }
}

/// JSON handling failures on the HTTP surface are server-side bugs, not
/// client mistakes (inbound client JSON is parsed in the session bridge and
/// never bubbles up here).
impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::Internal(format!("JSON error: {}", err))
    }
}

impl From<config::ConfigError> for GatewayError {
    fn from(err: config::ConfigError) -> Self {
        GatewayError::ConfigError(err.to_string())
    }
}

/// HTTP-level failures while talking to the token minting endpoint.
impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        GatewayError::TokenMint(err.to_string())
    }
}

/// Type alias for Results that use the gateway error type.
pub type GatewayResult<T> = Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_formats() {
        let err = GatewayError::TokenMint("401 Unauthorized".to_string());
        assert_eq!(err.to_string(), "Token minting failed: 401 Unauthorized");

        let err = GatewayError::UpstreamConnect("handshake refused".to_string());
        assert_eq!(
            err.to_string(),
            "Upstream connection failed: handshake refused"
        );
    }

    #[test]
    fn test_status_codes() {
        use actix_web::http::StatusCode;

        let resp = GatewayError::BadRequest("nope".into()).error_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = GatewayError::TokenMint("nope".into()).error_response();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);

        let resp = GatewayError::Internal("nope".into()).error_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
