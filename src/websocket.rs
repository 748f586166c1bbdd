//! # WebSocket Session Bridge
//!
//! One actor per accepted client connection at `/v1/transcriptions`. The
//! actor owns the [`ClientSession`] record and orchestrates the whole
//! transcription session: it accepts the start command, mints the ephemeral
//! token, opens the upstream realtime connection, relays binary audio one way
//! and translated transcript events the other way, and tears both sides down
//! together when either one ends.
//!
//! ## Actor Model:
//! The actor mailbox is the per-session serialization point. Token minting
//! and the upstream open run as spawned tasks and report back through typed
//! actor messages, so every state transition happens on the actor — a second
//! `start` command can never race an in-flight setup, because the session
//! record leaves `Idle` before the setup task is spawned.
//!
//! ## Liveness:
//! A `run_interval` sweep checks the session's liveness flag: unresponsive
//! clients are terminated (ordinary teardown then closes the upstream),
//! responsive ones get a fresh ping. Any pong sets the flag back.

use crate::config::AppConfig;
use crate::openai::{self, FromUpstream, Translation, UpstreamHandle};
use crate::protocol::{ClientCommand, ErrorCode, ServerEvent};
use crate::session::{ClientSession, SweepOutcome};
use crate::state::AppState;

use actix::prelude::*;
use actix_web::{web, HttpRequest, HttpResponse, Result as ActixResult};
use actix_web_actors::ws;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// WebSocket actor bridging one client to one upstream connection.
pub struct TranscribeSocket {
    /// The per-session state record (state machine, upstream handle, liveness)
    session: ClientSession,

    /// Shared gateway state (metrics, HTTP client for token minting)
    state: AppState,

    /// Configuration snapshot taken at accept time; session parameters are
    /// immutable once the connection exists
    config: AppConfig,
}

impl TranscribeSocket {
    pub fn new(state: AppState) -> Self {
        let config = state.get_config();
        Self {
            session: ClientSession::new(Uuid::new_v4()),
            state,
            config,
        }
    }

    /// Handle a start command: reject if the session already owns (or is
    /// setting up) an upstream, otherwise kick off the asynchronous token
    /// mint. The upstream open follows in [`Handler<TokenMinted>`].
    fn handle_start(
        &mut self,
        lang: Option<String>,
        model: Option<String>,
        ctx: &mut ws::WebsocketContext<Self>,
    ) {
        let (lang, model) = resolve_start_params(&self.config, lang, model);
        let session_id = self.session.id();

        if self.session.begin_start(lang, model.clone()).is_err() {
            warn!(session_id = %session_id, "Start rejected: upstream already started");
            ctx.text(ServerEvent::error(ErrorCode::UpstreamAlreadyStarted).to_json());
            return;
        }

        info!(session_id = %session_id, model = %model, "Session start accepted, minting token");

        let http = self.state.http.clone();
        let openai_cfg = self.config.openai.clone();
        let addr = ctx.address();

        tokio::spawn(async move {
            match openai::mint_ephemeral_token(
                &http,
                &openai_cfg.api_key,
                &openai_cfg.sessions_url,
                &model,
            )
            .await
            {
                Ok(token) => addr.do_send(TokenMinted { token }),
                Err(e) => {
                    warn!(session_id = %session_id, error = %e, "Token minting failed");
                    addr.do_send(SetupFailed {
                        code: ErrorCode::UpstreamSetupFailed,
                        detail: e.to_string(),
                    });
                }
            }
        });
    }

    /// Forward one binary audio frame, or drop it silently when the session
    /// is outside the streaming window. Dropped frames are never queued —
    /// the transport is realtime, not store-and-forward.
    fn handle_audio(&mut self, data: &[u8]) {
        if !self.session.accepts_audio() {
            debug!(
                session_id = %self.session.id(),
                state = ?self.session.state(),
                bytes = data.len(),
                "Audio frame dropped outside streaming window"
            );
            return;
        }

        let forwarded = self
            .session
            .upstream()
            .map(|upstream| upstream.send_audio(data.to_vec()))
            .unwrap_or(false);

        if forwarded {
            if self.session.note_audio_forwarded() {
                info!(session_id = %self.session.id(), "First audio frame forwarded, session streaming");
            }
        } else {
            debug!(session_id = %self.session.id(), "Audio frame dropped, upstream channel full");
        }
    }
}

/// Fill in deployment defaults for the start command's optional parameters.
fn resolve_start_params(
    config: &AppConfig,
    lang: Option<String>,
    model: Option<String>,
) -> (String, String) {
    (
        lang.unwrap_or_else(|| "en".to_string()),
        model.unwrap_or_else(|| config.openai.default_model.clone()),
    )
}

/// The ephemeral token was minted; open the upstream connection.
#[derive(Message)]
#[rtype(result = "()")]
struct TokenMinted {
    token: String,
}

/// The upstream connection is open and configured.
#[derive(Message)]
#[rtype(result = "()")]
struct UpstreamUp {
    handle: UpstreamHandle,
}

/// Token minting or the upstream open failed.
#[derive(Message)]
#[rtype(result = "()")]
struct SetupFailed {
    code: ErrorCode,
    detail: String,
}

impl Actor for TranscribeSocket {
    type Context = ws::WebsocketContext<Self>;

    /// Connection accepted: acknowledge to the client and start the
    /// liveness sweep.
    fn started(&mut self, ctx: &mut Self::Context) {
        info!(session_id = %self.session.id(), "Client connected");

        self.state.increment_active_sessions();
        ctx.text(ServerEvent::Connected.to_json());

        let sweep = Duration::from_secs(self.config.liveness.sweep_interval_secs);
        ctx.run_interval(sweep, |act, ctx| match act.session.sweep() {
            SweepOutcome::Reap => {
                warn!(session_id = %act.session.id(), "Liveness sweep: client unresponsive, terminating");
                ctx.stop();
            }
            SweepOutcome::Ping => ctx.ping(b""),
        });
    }

    /// Connection gone (graceful close, transport error, or liveness reap):
    /// close the upstream so no orphaned connection outlives the client.
    fn stopped(&mut self, _ctx: &mut Self::Context) {
        if let Some(upstream) = self.session.begin_close() {
            upstream.close();
        }
        self.session.finish_close();
        self.state.decrement_active_sessions();

        info!(session_id = %self.session.id(), "Session closed");
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for TranscribeSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Text(text)) => {
                // Closed command set; anything else is a client protocol
                // error: logged and dropped, never forwarded upstream
                match serde_json::from_str::<ClientCommand>(&text) {
                    Ok(ClientCommand::Start { lang, model }) => {
                        self.handle_start(lang, model, ctx)
                    }
                    Err(e) => {
                        warn!(
                            session_id = %self.session.id(),
                            error = %e,
                            "Unrecognized client message dropped"
                        );
                    }
                }
            }
            Ok(ws::Message::Binary(data)) => {
                self.handle_audio(&data);
            }
            Ok(ws::Message::Ping(data)) => {
                ctx.pong(&data);
                self.session.pong();
            }
            Ok(ws::Message::Pong(_)) => {
                self.session.pong();
            }
            Ok(ws::Message::Close(reason)) => {
                info!(session_id = %self.session.id(), reason = ?reason, "Client closed the connection");
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) => {
                warn!(session_id = %self.session.id(), "Unexpected continuation frame dropped");
            }
            Ok(ws::Message::Nop) => {}
            Err(e) => {
                error!(session_id = %self.session.id(), error = %e, "Client transport error");
                ctx.stop();
            }
        }
    }
}

impl Handler<TokenMinted> for TranscribeSocket {
    type Result = ();

    fn handle(&mut self, msg: TokenMinted, ctx: &mut Self::Context) {
        if !self.session.token_minted() {
            debug!(session_id = %self.session.id(), "Minted token discarded, session moved on");
            return;
        }

        let openai_cfg = self.config.openai.clone();
        let lang = self.session.lang().to_string();
        let model = self.session.model().to_string();
        let session_id = self.session.id();
        let bridge: Recipient<FromUpstream> = ctx.address().recipient();
        let addr = ctx.address();

        tokio::spawn(async move {
            match openai::realtime::connect(
                &openai_cfg,
                &msg.token,
                &lang,
                &model,
                session_id,
                bridge,
            )
            .await
            {
                Ok(handle) => addr.do_send(UpstreamUp { handle }),
                Err(e) => {
                    warn!(session_id = %session_id, error = %e, "Upstream open failed");
                    addr.do_send(SetupFailed {
                        code: ErrorCode::OpenAiConnectionFailed,
                        detail: e.to_string(),
                    });
                }
            }
        });
    }
}

impl Handler<UpstreamUp> for TranscribeSocket {
    type Result = ();

    fn handle(&mut self, msg: UpstreamUp, ctx: &mut Self::Context) {
        match self.session.attach_upstream(msg.handle) {
            Ok(()) => {
                info!(session_id = %self.session.id(), "Upstream configured, session ready");
                self.state.record_session_started();
                ctx.text(ServerEvent::Ready.to_json());
            }
            Err(handle) => {
                // Opened after the session moved on; discard, don't leak
                debug!(session_id = %self.session.id(), "Upstream opened after teardown, closing");
                handle.close();
            }
        }
    }
}

impl Handler<SetupFailed> for TranscribeSocket {
    type Result = ();

    fn handle(&mut self, msg: SetupFailed, ctx: &mut Self::Context) {
        if !self.session.setup_failed() {
            return; // stale failure after teardown
        }

        self.state.record_upstream_failure();
        warn!(
            session_id = %self.session.id(),
            code = msg.code.as_str(),
            detail = %msg.detail,
            "Session setup failed, back to idle"
        );
        ctx.text(ServerEvent::error_with_detail(msg.code, msg.detail).to_json());
    }
}

impl Handler<FromUpstream> for TranscribeSocket {
    type Result = ();

    fn handle(&mut self, msg: FromUpstream, ctx: &mut Self::Context) {
        match msg {
            FromUpstream::Event(text) => match openai::translate(&text) {
                Translation::Client(event) => ctx.text(event.to_json()),
                Translation::LogOnly { event_type } => {
                    debug!(session_id = %self.session.id(), event_type = %event_type, "Upstream acknowledgment");
                }
                // Escape hatch: unknown upstream vocabulary goes through
                // unchanged rather than being silently discarded
                Translation::Verbatim => ctx.text(text),
            },
            FromUpstream::Closed { error } => {
                self.session.upstream_gone();

                if let Some(detail) = error {
                    ctx.text(ServerEvent::error_with_detail(ErrorCode::OpenAiError, detail).to_json());
                }

                // No orphaned client waits on a dead upstream
                ctx.close(None);
                ctx.stop();
            }
        }
    }
}

/// WebSocket endpoint handler: upgrades the HTTP request and hands the
/// connection to a fresh [`TranscribeSocket`] actor.
pub async fn transcribe_ws(
    req: HttpRequest,
    stream: web::Payload,
    app_state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    info!(
        peer = ?req.connection_info().realip_remote_addr(),
        "New transcription WebSocket request"
    );

    ws::start(TranscribeSocket::new(app_state.get_ref().clone()), &req, stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_params_default() {
        let config = AppConfig::default();

        let (lang, model) = resolve_start_params(&config, None, None);
        assert_eq!(lang, "en");
        assert_eq!(model, config.openai.default_model);

        let (lang, model) =
            resolve_start_params(&config, Some("de".to_string()), Some("m1".to_string()));
        assert_eq!(lang, "de");
        assert_eq!(model, "m1");
    }
}
