//! # Ephemeral Token Minting
//!
//! Exchanges the server-held long-lived API key for a short-lived client
//! secret scoped to one transcription model. Pure request/response against
//! the Realtime sessions endpoint; nothing is retained between calls, and the
//! ephemeral token itself is consumed once by the upstream connector.

use crate::error::{GatewayError, GatewayResult};
use serde_json::json;
use tracing::{debug, warn};

/// Mint an ephemeral Realtime session token.
///
/// Failures here surface to the client as `upstream_setup_failed`; the
/// session returns to idle so the client may retry with another `start`.
pub async fn mint_ephemeral_token(
    http: &reqwest::Client,
    api_key: &str,
    sessions_url: &str,
    model: &str,
) -> GatewayResult<String> {
    if api_key.is_empty() {
        return Err(GatewayError::TokenMint(
            "OPENAI_API_KEY is not configured".to_string(),
        ));
    }

    debug!(model = %model, "Minting ephemeral upstream token");

    let response = http
        .post(sessions_url)
        .bearer_auth(api_key)
        .json(&json!({ "model": model }))
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        warn!(status = %status, body = %body, "Token minting request rejected");
        return Err(GatewayError::TokenMint(format!(
            "sessions endpoint returned {}",
            status
        )));
    }

    let body: serde_json::Value = response.json().await?;
    extract_client_secret(&body).ok_or_else(|| {
        GatewayError::TokenMint("'client_secret' missing from sessions response".to_string())
    })
}

/// Pull the ephemeral secret out of a sessions response.
///
/// The API has shipped both shapes: a plain string and an object carrying a
/// `value` field alongside expiry metadata. Accept either.
fn extract_client_secret(body: &serde_json::Value) -> Option<String> {
    match body.get("client_secret")? {
        serde_json::Value::String(secret) => Some(secret.clone()),
        obj => obj
            .get("value")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_plain_string_secret() {
        let body = serde_json::json!({"client_secret": "ek_abc123"});
        assert_eq!(
            extract_client_secret(&body),
            Some("ek_abc123".to_string())
        );
    }

    #[test]
    fn test_extracts_object_form_secret() {
        let body = serde_json::json!({
            "client_secret": {"value": "ek_abc123", "expires_at": 1735689600}
        });
        assert_eq!(
            extract_client_secret(&body),
            Some("ek_abc123".to_string())
        );
    }

    #[test]
    fn test_missing_secret_returns_none() {
        assert_eq!(extract_client_secret(&serde_json::json!({})), None);
        assert_eq!(
            extract_client_secret(&serde_json::json!({"client_secret": {"expires_at": 1}})),
            None
        );
    }
}
