//! # Client Wire Protocol
//!
//! The vocabulary spoken between a browser and the gateway over the
//! `/v1/transcriptions` WebSocket.
//!
//! ## Protocol:
//! - **Client → Gateway**: one JSON command `{"action":"start", lang?, model?}`,
//!   then raw binary frames of 16-bit PCM audio (no envelope)
//! - **Gateway → Client**: `{"type":"connected"}` on accept, `{"ready":true}`
//!   once the upstream is configured, `{"type":"partial"|"final", text, item_id}`
//!   for transcript updates, and `{"error":<code>, detail?}` on failure
//!
//! Inbound text is parsed into the closed [`ClientCommand`] set; anything that
//! does not match a known variant is logged and dropped by the session bridge,
//! never forwarded upstream verbatim.

use serde::{Deserialize, Serialize};
use serde_json::json;

/// Structured text commands a client may send.
///
/// Tagged on the `action` field. Unknown actions fail to parse, which the
/// session bridge treats as a client protocol error (log and drop).
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientCommand {
    /// Begin a transcription session: mint a token, open the upstream
    /// connection and start relaying audio.
    Start {
        /// Transcription language, defaults to "en"
        lang: Option<String>,
        /// Transcription model, defaults to the deployment-wide default
        model: Option<String>,
    },
}

/// Error codes reported to clients, matching the session bridge's failure
/// taxonomy. One code per failure class; the optional `detail` carries the
/// underlying message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// A second `start` arrived while an upstream is already owned
    UpstreamAlreadyStarted,
    /// Minting the ephemeral upstream token failed
    UpstreamSetupFailed,
    /// The upstream WebSocket could not be opened or configured
    OpenAiConnectionFailed,
    /// The upstream reported an error event or its transport failed
    OpenAiError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::UpstreamAlreadyStarted => "upstream_already_started",
            ErrorCode::UpstreamSetupFailed => "upstream_setup_failed",
            ErrorCode::OpenAiConnectionFailed => "openai_connection_failed",
            ErrorCode::OpenAiError => "openai_error",
        }
    }
}

/// Events the gateway sends to clients.
///
/// The wire shapes are deliberately uneven (`{"ready":true}` has no `type`
/// field) because they are a published contract the browser UI already
/// depends on, so serialization is explicit rather than derived.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    /// Sent once when the connection is accepted
    Connected,
    /// Sent once the upstream is open and configured; audio may flow
    Ready,
    /// Incremental transcript fragment for an in-progress utterance
    Partial { text: String, item_id: String },
    /// Finalized transcript for one utterance
    Final { text: String, item_id: String },
    /// A failure scoped to this session
    Error {
        code: ErrorCode,
        detail: Option<String>,
    },
}

impl ServerEvent {
    /// Serialize to the wire shape.
    pub fn to_json(&self) -> String {
        let value = match self {
            ServerEvent::Connected => json!({"type": "connected"}),
            ServerEvent::Ready => json!({"ready": true}),
            ServerEvent::Partial { text, item_id } => {
                json!({"type": "partial", "text": text, "item_id": item_id})
            }
            ServerEvent::Final { text, item_id } => {
                json!({"type": "final", "text": text, "item_id": item_id})
            }
            ServerEvent::Error { code, detail } => match detail {
                Some(detail) => json!({"error": code.as_str(), "detail": detail}),
                None => json!({"error": code.as_str()}),
            },
        };
        value.to_string()
    }

    /// Shorthand for an error event without detail.
    pub fn error(code: ErrorCode) -> Self {
        ServerEvent::Error { code, detail: None }
    }

    /// Shorthand for an error event carrying the underlying message.
    pub fn error_with_detail(code: ErrorCode, detail: impl Into<String>) -> Self {
        ServerEvent::Error {
            code,
            detail: Some(detail.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_command_parses_with_defaults() {
        let cmd: ClientCommand = serde_json::from_str(r#"{"action":"start"}"#).unwrap();
        assert_eq!(
            cmd,
            ClientCommand::Start {
                lang: None,
                model: None
            }
        );

        let cmd: ClientCommand =
            serde_json::from_str(r#"{"action":"start","lang":"de","model":"m1"}"#).unwrap();
        assert_eq!(
            cmd,
            ClientCommand::Start {
                lang: Some("de".to_string()),
                model: Some("m1".to_string())
            }
        );
    }

    #[test]
    fn test_unknown_action_is_rejected() {
        assert!(serde_json::from_str::<ClientCommand>(r#"{"action":"stop"}"#).is_err());
        assert!(serde_json::from_str::<ClientCommand>(r#"{"hello":"world"}"#).is_err());
        assert!(serde_json::from_str::<ClientCommand>("not json").is_err());
    }

    #[test]
    fn test_server_event_wire_shapes() {
        assert_eq!(ServerEvent::Connected.to_json(), r#"{"type":"connected"}"#);
        assert_eq!(ServerEvent::Ready.to_json(), r#"{"ready":true}"#);

        let partial = ServerEvent::Partial {
            text: "hel".to_string(),
            item_id: "x1".to_string(),
        };
        let value: serde_json::Value = serde_json::from_str(&partial.to_json()).unwrap();
        assert_eq!(value["type"], "partial");
        assert_eq!(value["text"], "hel");
        assert_eq!(value["item_id"], "x1");

        let fin = ServerEvent::Final {
            text: "hello".to_string(),
            item_id: "x1".to_string(),
        };
        let value: serde_json::Value = serde_json::from_str(&fin.to_json()).unwrap();
        assert_eq!(value["type"], "final");
        assert_eq!(value["text"], "hello");
    }

    #[test]
    fn test_error_event_shapes() {
        let value: serde_json::Value = serde_json::from_str(
            &ServerEvent::error(ErrorCode::UpstreamAlreadyStarted).to_json(),
        )
        .unwrap();
        assert_eq!(value["error"], "upstream_already_started");
        assert!(value.get("detail").is_none());

        let value: serde_json::Value = serde_json::from_str(
            &ServerEvent::error_with_detail(ErrorCode::UpstreamSetupFailed, "minting failed")
                .to_json(),
        )
        .unwrap();
        assert_eq!(value["error"], "upstream_setup_failed");
        assert_eq!(value["detail"], "minting failed");
    }
}
