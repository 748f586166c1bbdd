//! # Session State Machine
//!
//! The per-client session record owned by the session bridge. It is
//! deliberately transport-independent: no WebSocket types appear here, so
//! every state transition and invariant is unit-testable without a live
//! connection.
//!
//! ## Lifecycle:
//! ```text
//! Idle → Starting → UpstreamConnecting → Ready → Streaming → Closing → Closed
//!          ╰──────────────┴── setup failure returns to Idle (retry allowed)
//! ```
//! Any state can transition directly to Closing/Closed when either side of
//! the bridge terminates.
//!
//! ## Invariants enforced here:
//! - at most one upstream connection is owned at a time; `begin_start` is
//!   rejected in every state except `Idle`, with no side effects
//! - the upstream handle's lifetime is contained in the session's: every
//!   path out of the active states detaches (and closes) the handle
//! - audio is accepted only in `Ready`/`Streaming` with an upstream attached

use crate::openai::UpstreamHandle;
use tracing::debug;
use uuid::Uuid;

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Connected, no upstream requested yet (initial state)
    Idle,
    /// Start accepted, ephemeral token being minted
    Starting,
    /// Token in hand, upstream connection being opened
    UpstreamConnecting,
    /// Upstream open and configured, no audio forwarded yet
    Ready,
    /// Audio is flowing
    Streaming,
    /// Teardown in progress
    Closing,
    /// Terminal
    Closed,
}

/// Outcome of one liveness sweep over a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepOutcome {
    /// The client answered since the last sweep; flag cleared, send a ping
    Ping,
    /// The client never answered: terminate the connection
    Reap,
}

/// A `start` command arrived while the session already owns (or is setting
/// up) an upstream connection. The rejection is idempotent: the existing
/// upstream is untouched and the session state is unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartRejected;

/// One client's end-to-end transcription session, from connect to close.
#[derive(Debug)]
pub struct ClientSession {
    id: Uuid,
    state: SessionState,
    upstream: Option<UpstreamHandle>,
    is_alive: bool,
    lang: String,
    model: String,
}

impl ClientSession {
    /// A fresh session in `Idle`. The id is used only for logging and
    /// correlation; `lang`/`model` are captured later from the start command.
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            state: SessionState::Idle,
            upstream: None,
            is_alive: true,
            lang: String::new(),
            model: String::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn lang(&self) -> &str {
        &self.lang
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Accept a start command. Only valid in `Idle`; everywhere else the
    /// command is rejected without touching any existing upstream. The
    /// session leaves `Idle` before any suspension point, so a second start
    /// racing an in-flight token mint or upstream open is also rejected.
    pub fn begin_start(&mut self, lang: String, model: String) -> Result<(), StartRejected> {
        if self.state != SessionState::Idle {
            return Err(StartRejected);
        }

        self.lang = lang;
        self.model = model;
        self.state = SessionState::Starting;
        Ok(())
    }

    /// The ephemeral token was minted; the upstream open is next. Returns
    /// false if the session moved on (e.g. began closing) while the mint was
    /// in flight, in which case the caller discards the token.
    pub fn token_minted(&mut self) -> bool {
        if self.state != SessionState::Starting {
            return false;
        }
        self.state = SessionState::UpstreamConnecting;
        true
    }

    /// Attach the opened upstream connection. On any state other than
    /// `UpstreamConnecting` the handle is returned to the caller, which must
    /// close it (a partially created upstream is never silently leaked).
    pub fn attach_upstream(&mut self, handle: UpstreamHandle) -> Result<(), UpstreamHandle> {
        if self.state != SessionState::UpstreamConnecting {
            return Err(handle);
        }
        self.upstream = Some(handle);
        self.state = SessionState::Ready;
        Ok(())
    }

    /// Token minting or the upstream open failed. The session falls back to
    /// `Idle` so the client may retry with a new start command; any partially
    /// created upstream is closed and discarded. Returns false when the
    /// session was not in a setup state (stale failure after teardown).
    pub fn setup_failed(&mut self) -> bool {
        match self.state {
            SessionState::Starting | SessionState::UpstreamConnecting => {
                if let Some(handle) = self.upstream.take() {
                    handle.close();
                }
                self.state = SessionState::Idle;
                true
            }
            _ => false,
        }
    }

    /// Whether a binary audio frame may be forwarded upstream right now.
    /// Frames outside this window are dropped, never queued.
    pub fn accepts_audio(&self) -> bool {
        matches!(
            self.state,
            SessionState::Ready | SessionState::Streaming
        ) && self.upstream.is_some()
    }

    pub fn upstream(&self) -> Option<&UpstreamHandle> {
        self.upstream.as_ref()
    }

    /// Bookkeeping after the first successfully forwarded frame: `Ready`
    /// becomes `Streaming`. Returns true on the flip so the caller can log
    /// the transition once.
    pub fn note_audio_forwarded(&mut self) -> bool {
        if self.state == SessionState::Ready {
            self.state = SessionState::Streaming;
            debug!(session_id = %self.id, "Session is now streaming");
            return true;
        }
        false
    }

    /// The upstream side ended on its own (close or transport error). The
    /// handle is dropped without signaling — the remote is already gone —
    /// and the session heads into teardown.
    pub fn upstream_gone(&mut self) {
        self.upstream = None;
        if self.state != SessionState::Closed {
            self.state = SessionState::Closing;
        }
    }

    /// Client-side teardown: detach the upstream handle (if any) for the
    /// caller to close, and enter `Closing`.
    pub fn begin_close(&mut self) -> Option<UpstreamHandle> {
        if self.state != SessionState::Closed {
            self.state = SessionState::Closing;
        }
        self.upstream.take()
    }

    /// Terminal. Idempotent.
    pub fn finish_close(&mut self) {
        self.upstream = None;
        self.state = SessionState::Closed;
    }

    /// Any inbound pong (or ping) proves the client is alive.
    pub fn pong(&mut self) {
        self.is_alive = true;
    }

    /// One liveness sweep: a session whose flag was never set back since the
    /// previous sweep is reaped; otherwise the flag is cleared and the caller
    /// sends a ping. A silent client is therefore terminated within two
    /// sweep intervals.
    pub fn sweep(&mut self) -> SweepOutcome {
        if !self.is_alive {
            return SweepOutcome::Reap;
        }
        self.is_alive = false;
        SweepOutcome::Ping
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::{mpsc, watch};

    fn handle() -> UpstreamHandle {
        UpstreamHandle::new(mpsc::channel(8).0, watch::channel(false).0)
    }

    fn session() -> ClientSession {
        ClientSession::new(Uuid::new_v4())
    }

    fn ready_session() -> ClientSession {
        let mut s = session();
        s.begin_start("en".to_string(), "m1".to_string()).unwrap();
        assert!(s.token_minted());
        s.attach_upstream(handle()).unwrap();
        s
    }

    #[test]
    fn test_initial_state() {
        let s = session();
        assert_eq!(s.state(), SessionState::Idle);
        assert!(!s.accepts_audio());
        assert!(s.upstream().is_none());
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut s = session();
        s.begin_start("en".to_string(), "m1".to_string()).unwrap();
        assert_eq!(s.state(), SessionState::Starting);
        assert_eq!(s.lang(), "en");
        assert_eq!(s.model(), "m1");

        assert!(s.token_minted());
        assert_eq!(s.state(), SessionState::UpstreamConnecting);

        s.attach_upstream(handle()).unwrap();
        assert_eq!(s.state(), SessionState::Ready);
        assert!(s.accepts_audio());

        assert!(s.note_audio_forwarded());
        assert_eq!(s.state(), SessionState::Streaming);
        // only the first frame flips the state
        assert!(!s.note_audio_forwarded());
        assert!(s.accepts_audio());
    }

    #[test]
    fn test_second_start_is_rejected_without_side_effects() {
        let mut s = ready_session();
        assert_eq!(
            s.begin_start("de".to_string(), "m2".to_string()),
            Err(StartRejected)
        );
        // existing upstream and parameters untouched
        assert_eq!(s.state(), SessionState::Ready);
        assert!(s.upstream().is_some());
        assert_eq!(s.lang(), "en");
        assert_eq!(s.model(), "m1");
    }

    #[test]
    fn test_start_rejected_while_setup_in_flight() {
        let mut s = session();
        s.begin_start("en".to_string(), "m1".to_string()).unwrap();
        // minting still suspended: the session already left Idle
        assert!(s.begin_start("en".to_string(), "m1".to_string()).is_err());

        assert!(s.token_minted());
        assert!(s.begin_start("en".to_string(), "m1".to_string()).is_err());
    }

    #[test]
    fn test_setup_failure_allows_retry() {
        let mut s = session();
        s.begin_start("en".to_string(), "m1".to_string()).unwrap();
        assert!(s.setup_failed());
        assert_eq!(s.state(), SessionState::Idle);

        // the retry is a fresh start command
        assert!(s.begin_start("en".to_string(), "m1".to_string()).is_ok());
        assert!(s.token_minted());
        assert!(s.setup_failed());
        assert_eq!(s.state(), SessionState::Idle);
    }

    #[test]
    fn test_stale_setup_updates_are_ignored() {
        let mut s = session();
        // never started: minting results and failures have nothing to apply to
        assert!(!s.token_minted());
        assert!(!s.setup_failed());

        let mut s = ready_session();
        assert!(!s.setup_failed());
        assert_eq!(s.state(), SessionState::Ready);
    }

    #[test]
    fn test_attach_after_close_returns_handle() {
        let mut s = session();
        s.begin_start("en".to_string(), "m1".to_string()).unwrap();
        assert!(s.token_minted());
        // client vanished while the upstream open was in flight
        s.begin_close();

        let late = handle();
        assert!(s.attach_upstream(late).is_err());
        assert!(s.upstream().is_none());
    }

    #[test]
    fn test_audio_gating_before_ready() {
        let mut s = session();
        assert!(!s.accepts_audio()); // Idle

        s.begin_start("en".to_string(), "m1".to_string()).unwrap();
        assert!(!s.accepts_audio()); // Starting

        assert!(s.token_minted());
        assert!(!s.accepts_audio()); // UpstreamConnecting

        s.attach_upstream(handle()).unwrap();
        // Ready accepts audio even before the Streaming flip; the source
        // forwards unconditionally once the upstream is open
        assert!(s.accepts_audio());
    }

    #[test]
    fn test_client_close_detaches_upstream() {
        let mut s = ready_session();
        let detached = s.begin_close();
        assert!(detached.is_some());
        assert_eq!(s.state(), SessionState::Closing);
        assert!(!s.accepts_audio());

        s.finish_close();
        assert_eq!(s.state(), SessionState::Closed);
    }

    #[test]
    fn test_upstream_gone_enters_teardown() {
        let mut s = ready_session();
        s.upstream_gone();
        assert_eq!(s.state(), SessionState::Closing);
        assert!(s.upstream().is_none());
        assert!(!s.accepts_audio());
        // nothing left to detach on the client-close path
        assert!(s.begin_close().is_none());
    }

    #[test]
    fn test_silent_client_reaped_on_second_sweep() {
        let mut s = session();
        // first sweep: flag was set, clear it and ping
        assert_eq!(s.sweep(), SweepOutcome::Ping);
        // no pong arrives: second sweep reaps
        assert_eq!(s.sweep(), SweepOutcome::Reap);
    }

    #[test]
    fn test_responsive_client_never_reaped() {
        let mut s = session();
        for _ in 0..10 {
            assert_eq!(s.sweep(), SweepOutcome::Ping);
            s.pong();
        }
    }
}
