//! # Upstream Event Translation
//!
//! Stateless mapping from OpenAI Realtime API events to the gateway's
//! client-facing vocabulary. This is the entire translation contract:
//!
//! | Upstream event                                            | Outcome                      |
//! |-----------------------------------------------------------|------------------------------|
//! | `conversation.item.input_audio_transcription.delta`       | partial transcript           |
//! | `conversation.item.input_audio_transcription.completed`   | final transcript             |
//! | `input_audio_buffer.committed`                            | logged only, no client event |
//! | `error`                                                   | `openai_error` to the client |
//! | anything else (including non-JSON)                        | forwarded verbatim           |
//!
//! The function is total and side-effect-free: every input maps to exactly
//! one [`Translation`], and nothing here can fail or panic.

use crate::protocol::{ErrorCode, ServerEvent};

/// Outcome of translating one upstream message.
#[derive(Debug, Clone, PartialEq)]
pub enum Translation {
    /// Send this event to the client
    Client(ServerEvent),
    /// Acknowledge internally (debug log), no client event
    LogOnly { event_type: String },
    /// Unrecognized upstream message: forward the raw text to the client
    /// unchanged, as an escape hatch rather than dropping it
    Verbatim,
}

const DELTA_EVENT: &str = "conversation.item.input_audio_transcription.delta";
const COMPLETED_EVENT: &str = "conversation.item.input_audio_transcription.completed";
const COMMITTED_EVENT: &str = "input_audio_buffer.committed";

/// Translate one upstream text message into its client-facing outcome.
pub fn translate(raw: &str) -> Translation {
    let event: serde_json::Value = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(_) => return Translation::Verbatim,
    };

    let event_type = match event.get("type").and_then(|v| v.as_str()) {
        Some(t) => t,
        None => return Translation::Verbatim,
    };

    match event_type {
        DELTA_EVENT => Translation::Client(ServerEvent::Partial {
            text: str_field(&event, "delta"),
            item_id: str_field(&event, "item_id"),
        }),
        COMPLETED_EVENT => Translation::Client(ServerEvent::Final {
            text: str_field(&event, "transcript"),
            item_id: str_field(&event, "item_id"),
        }),
        COMMITTED_EVENT => Translation::LogOnly {
            event_type: event_type.to_string(),
        },
        "error" => {
            let detail = event
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(|v| v.as_str())
                .unwrap_or("unknown upstream error")
                .to_string();
            Translation::Client(ServerEvent::error_with_detail(ErrorCode::OpenAiError, detail))
        }
        _ => Translation::Verbatim,
    }
}

fn str_field(event: &serde_json::Value, field: &str) -> String {
    event
        .get(field)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delta_becomes_partial() {
        let raw = r#"{"type":"conversation.item.input_audio_transcription.delta","delta":"hel","item_id":"x1"}"#;
        assert_eq!(
            translate(raw),
            Translation::Client(ServerEvent::Partial {
                text: "hel".to_string(),
                item_id: "x1".to_string()
            })
        );
    }

    #[test]
    fn test_completed_becomes_final() {
        let raw = r#"{"type":"conversation.item.input_audio_transcription.completed","transcript":"hello","item_id":"x1"}"#;
        assert_eq!(
            translate(raw),
            Translation::Client(ServerEvent::Final {
                text: "hello".to_string(),
                item_id: "x1".to_string()
            })
        );
    }

    #[test]
    fn test_committed_is_logged_only() {
        let raw = r#"{"type":"input_audio_buffer.committed","item_id":"x1"}"#;
        assert_eq!(
            translate(raw),
            Translation::LogOnly {
                event_type: "input_audio_buffer.committed".to_string()
            }
        );
    }

    #[test]
    fn test_error_event_maps_to_openai_error() {
        let raw = r#"{"type":"error","error":{"message":"rate limited"}}"#;
        assert_eq!(
            translate(raw),
            Translation::Client(ServerEvent::error_with_detail(
                ErrorCode::OpenAiError,
                "rate limited"
            ))
        );
    }

    #[test]
    fn test_error_event_without_message_still_maps() {
        let raw = r#"{"type":"error"}"#;
        assert_eq!(
            translate(raw),
            Translation::Client(ServerEvent::error_with_detail(
                ErrorCode::OpenAiError,
                "unknown upstream error"
            ))
        );
    }

    #[test]
    fn test_unknown_event_forwards_verbatim() {
        let raw = r#"{"type":"transcription_session.created","session":{}}"#;
        assert_eq!(translate(raw), Translation::Verbatim);

        let raw = r#"{"type":"input_audio_buffer.speech_started"}"#;
        assert_eq!(translate(raw), Translation::Verbatim);
    }

    #[test]
    fn test_malformed_input_never_crashes() {
        assert_eq!(translate("not json at all"), Translation::Verbatim);
        assert_eq!(translate(""), Translation::Verbatim);
        assert_eq!(translate(r#"{"no_type_field":true}"#), Translation::Verbatim);
        // type present but not a string
        assert_eq!(translate(r#"{"type":42}"#), Translation::Verbatim);
    }

    #[test]
    fn test_delta_with_missing_fields_defaults_empty() {
        let raw = r#"{"type":"conversation.item.input_audio_transcription.delta"}"#;
        assert_eq!(
            translate(raw),
            Translation::Client(ServerEvent::Partial {
                text: String::new(),
                item_id: String::new()
            })
        );
    }
}
