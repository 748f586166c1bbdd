//! # Upstream Realtime Connection
//!
//! Opens exactly one WebSocket connection per session to the OpenAI Realtime
//! API and performs the post-open handshake: the session configuration
//! message (audio format, model, language, voice activity detection, noise
//! reduction) is transmitted before [`connect`] resolves, so a caller can
//! never race audio frames ahead of the configuration.
//!
//! The connection is owned by a spawned relay task. The session bridge talks
//! to it through an [`UpstreamHandle`]: PCM frames go in over a bounded mpsc
//! channel (full channel = frame dropped, matching the realtime, not
//! store-and-forward, nature of the transport) and a watch channel requests
//! shutdown. Inbound upstream text and terminal close/error outcomes are
//! delivered to the bridge actor as [`FromUpstream`] messages.

use crate::config::OpenAiConfig;
use crate::error::{GatewayError, GatewayResult};
use actix::prelude::*;
use base64::Engine;
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Frames buffered toward the upstream before new ones are dropped.
const AUDIO_CHANNEL_CAPACITY: usize = 256;

/// Messages the relay task delivers to the owning session bridge actor.
#[derive(Message, Debug)]
#[rtype(result = "()")]
pub enum FromUpstream {
    /// A text event from the upstream, not yet translated
    Event(String),
    /// The upstream connection ended; `error` is set on the failure path
    Closed { error: Option<String> },
}

/// The session bridge's handle on its upstream connection.
///
/// Owned exclusively by one session; dropping it (or calling [`close`])
/// makes the relay task shut the socket down.
///
/// [`close`]: UpstreamHandle::close
#[derive(Debug)]
pub struct UpstreamHandle {
    audio_tx: mpsc::Sender<Vec<u8>>,
    close_tx: watch::Sender<bool>,
}

impl UpstreamHandle {
    pub(crate) fn new(audio_tx: mpsc::Sender<Vec<u8>>, close_tx: watch::Sender<bool>) -> Self {
        Self { audio_tx, close_tx }
    }

    /// Hand one PCM frame to the relay task. Returns false if the frame was
    /// dropped (channel full or relay gone); there is no application-level
    /// retry or queue beyond the channel itself.
    pub fn send_audio(&self, frame: Vec<u8>) -> bool {
        self.audio_tx.try_send(frame).is_ok()
    }

    /// Ask the relay task to close the upstream socket.
    pub fn close(&self) {
        let _ = self.close_tx.send(true);
    }
}

/// Open the upstream connection and transmit the session configuration.
///
/// Resolves only after the configuration message is flushed to the socket;
/// rejects if the transport errors before or during that exchange. On
/// success the returned handle is the only way to reach the connection.
pub async fn connect(
    cfg: &OpenAiConfig,
    token: &str,
    lang: &str,
    model: &str,
    session_id: Uuid,
    bridge: Recipient<FromUpstream>,
) -> GatewayResult<UpstreamHandle> {
    let request = handshake_request(&cfg.realtime_url, token)?;

    let (ws_stream, _response) = tokio_tungstenite::connect_async(request)
        .await
        .map_err(|e| GatewayError::UpstreamConnect(e.to_string()))?;

    info!(session_id = %session_id, "Connected to upstream realtime API");

    let (mut ws_write, mut ws_read) = ws_stream.split();

    // The configuration must be on the wire before any audio frame can be
    // accepted, so it is sent before the relay task exists.
    let config_msg = session_config_payload(cfg, lang, model).to_string();
    ws_write
        .send(WsMessage::Text(config_msg))
        .await
        .map_err(|e| GatewayError::UpstreamConnect(format!("config send failed: {}", e)))?;

    debug!(session_id = %session_id, model = %model, lang = %lang, "Sent upstream session configuration");

    let (audio_tx, mut audio_rx) = mpsc::channel::<Vec<u8>>(AUDIO_CHANNEL_CAPACITY);
    let (close_tx, mut close_rx) = watch::channel(false);

    tokio::spawn(async move {
        loop {
            tokio::select! {
                frame = audio_rx.recv() => match frame {
                    Some(pcm) => {
                        if let Err(e) = ws_write.send(WsMessage::Text(append_payload(&pcm))).await {
                            warn!(session_id = %session_id, error = %e, "Audio forward failed");
                            bridge.do_send(FromUpstream::Closed { error: Some(e.to_string()) });
                            break;
                        }
                    }
                    // Every sender dropped: the session is gone
                    None => {
                        let _ = ws_write.send(WsMessage::Close(None)).await;
                        break;
                    }
                },

                event = ws_read.next() => match event {
                    Some(Ok(WsMessage::Text(text))) => {
                        bridge.do_send(FromUpstream::Event(text));
                    }
                    Some(Ok(WsMessage::Close(frame))) => {
                        info!(session_id = %session_id, frame = ?frame, "Upstream closed the connection");
                        bridge.do_send(FromUpstream::Closed { error: None });
                        break;
                    }
                    Some(Ok(_)) => {} // binary/ping/pong: nothing to relay
                    Some(Err(e)) => {
                        warn!(session_id = %session_id, error = %e, "Upstream transport error");
                        bridge.do_send(FromUpstream::Closed { error: Some(e.to_string()) });
                        break;
                    }
                    None => {
                        bridge.do_send(FromUpstream::Closed { error: None });
                        break;
                    }
                },

                result = close_rx.changed() => {
                    // Session-initiated shutdown (or handle dropped entirely)
                    if result.is_err() || *close_rx.borrow() {
                        let _ = ws_write.send(WsMessage::Close(None)).await;
                        break;
                    }
                }
            }
        }

        debug!(session_id = %session_id, "Upstream relay task finished");
    });

    Ok(UpstreamHandle::new(audio_tx, close_tx))
}

/// Build the WebSocket upgrade request carrying the ephemeral bearer token
/// and the Realtime protocol version header.
fn handshake_request(realtime_url: &str, token: &str) -> GatewayResult<http::Request<()>> {
    let uri: http::Uri = realtime_url
        .parse()
        .map_err(|e| GatewayError::UpstreamConnect(format!("bad realtime URL: {}", e)))?;

    let host = uri
        .host()
        .ok_or_else(|| GatewayError::UpstreamConnect("realtime URL has no host".to_string()))?
        .to_string();

    http::Request::builder()
        .uri(uri)
        .header("Authorization", format!("Bearer {}", token))
        .header("OpenAI-Beta", "realtime=v1")
        .header("Host", host)
        .header("Connection", "Upgrade")
        .header("Upgrade", "websocket")
        .header("Sec-WebSocket-Version", "13")
        .header(
            "Sec-WebSocket-Key",
            tokio_tungstenite::tungstenite::handshake::client::generate_key(),
        )
        .body(())
        .map_err(|e| GatewayError::UpstreamConnect(format!("handshake build failed: {}", e)))
}

/// The post-open session configuration message.
fn session_config_payload(cfg: &OpenAiConfig, lang: &str, model: &str) -> serde_json::Value {
    json!({
        "type": "transcription_session.update",
        "session": {
            "input_audio_format": "pcm16",
            "input_audio_transcription": {
                "model": model,
                "language": lang
            },
            "turn_detection": {
                "type": "server_vad",
                "threshold": cfg.turn_detection.threshold,
                "prefix_padding_ms": cfg.turn_detection.prefix_padding_ms,
                "silence_duration_ms": cfg.turn_detection.silence_duration_ms
            },
            "input_audio_noise_reduction": {
                "type": cfg.noise_reduction
            }
        }
    })
}

/// One inbound PCM frame as an upstream append event, base64-encoded.
fn append_payload(frame: &[u8]) -> String {
    json!({
        "type": "input_audio_buffer.append",
        "audio": base64::engine::general_purpose::STANDARD.encode(frame)
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    #[test]
    fn test_session_config_payload_shape() {
        let cfg = AppConfig::default().openai;
        let payload = session_config_payload(&cfg, "en", "gpt-4o-transcribe");

        assert_eq!(payload["type"], "transcription_session.update");
        let session = &payload["session"];
        assert_eq!(session["input_audio_format"], "pcm16");
        assert_eq!(
            session["input_audio_transcription"]["model"],
            "gpt-4o-transcribe"
        );
        assert_eq!(session["input_audio_transcription"]["language"], "en");
        assert_eq!(session["turn_detection"]["type"], "server_vad");
        assert_eq!(session["turn_detection"]["prefix_padding_ms"], 300);
        assert_eq!(session["input_audio_noise_reduction"]["type"], "near_field");
    }

    #[test]
    fn test_append_payload_encodes_audio() {
        let payload: serde_json::Value =
            serde_json::from_str(&append_payload(&[0x01, 0x02, 0x03])).unwrap();
        assert_eq!(payload["type"], "input_audio_buffer.append");
        assert_eq!(payload["audio"], "AQID");
    }

    #[test]
    fn test_handshake_request_headers() {
        let request =
            handshake_request("wss://api.openai.com/v1/realtime?intent=transcription", "ek_1")
                .unwrap();
        assert_eq!(request.headers()["Authorization"], "Bearer ek_1");
        assert_eq!(request.headers()["OpenAI-Beta"], "realtime=v1");
        assert_eq!(request.headers()["Host"], "api.openai.com");
        assert_eq!(request.uri().query(), Some("intent=transcription"));
    }

    #[test]
    fn test_handshake_request_rejects_bad_url() {
        assert!(handshake_request("not a url", "ek_1").is_err());
    }

    #[test]
    fn test_handle_close_is_idempotent() {
        let (audio_tx, _audio_rx) = mpsc::channel(1);
        let (close_tx, close_rx) = watch::channel(false);
        let handle = UpstreamHandle::new(audio_tx, close_tx);

        handle.close();
        handle.close();
        assert!(*close_rx.borrow());
    }

    #[test]
    fn test_send_audio_reports_drop_when_full() {
        let (audio_tx, _audio_rx) = mpsc::channel(1);
        let (close_tx, _close_rx) = watch::channel(false);
        let handle = UpstreamHandle::new(audio_tx, close_tx);

        assert!(handle.send_audio(vec![0u8; 4]));
        // capacity 1 and nothing draining: the second frame is dropped
        assert!(!handle.send_audio(vec![0u8; 4]));
    }
}
