//! Channel lifecycle and inbound routing.
//!
//! One logical channel per (session code, username). This module owns the
//! connection state machine, the close-code policy, and the inbound message
//! slots; the physical socket lives behind the [`Transport`] trait supplied
//! by the embedding shell. No networking happens in this crate.
//!
//! Delivery contract: sends are at-most-once and best-effort (dropped with a
//! log line when the channel is not open, never queued or retried). Inbound
//! snapshot messages land in a single latest-value slot with overwrite
//! semantics; a slow consumer may skip an intermediate snapshot and resync
//! from the next one. Drawing deltas are the exception: they are incremental,
//! so they bypass the slot and queue in arrival order.

use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::message::{ClientMessage, DrawingSegment, ServerMessage};

/// Grace period before an abnormal close returns the user to the lobby.
pub const DEFAULT_CLOSE_GRACE: Duration = Duration::from_secs(2);

/// Normal closure.
pub const CLOSE_NORMAL: u16 = 1000;

/// Endpoint going away (tab closed, server shutdown).
pub const CLOSE_GOING_AWAY: u16 = 1001;

/// Policy rejection: duplicate name, game already running, rule violation.
pub const CLOSE_POLICY: u16 = 1008;

/// Fallback banner text for an abnormal close without a reason.
const UNEXPLAINED_CLOSE: &str = "Connection closed unexpectedly";

/// Connection state for the session channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Channel constructed, handshake not finished
    #[default]
    Connecting,

    /// Channel open for traffic
    Connected,

    /// Channel closed or errored
    Disconnected,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

/// How a finished channel ended, per the close-code policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseOutcome {
    /// 1000/1001: no error, no recovery action.
    Clean,

    /// 1008: the authority refused us; leave the session immediately.
    PolicyRejected { reason: String },

    /// Anything else: surface the reason, leave after the grace deadline
    /// unless the channel reopens first.
    Abnormal { reason: String, grace_until: Instant },
}

/// Outbound half of the physical channel, implemented by the embedding shell.
pub trait Transport {
    /// Write one text frame. Failures are reported, not retried.
    fn send_text(&mut self, text: &str) -> Result<(), TransportError>;

    /// Close with a code and reason. Must tolerate repeated calls.
    fn close(&mut self, code: u16, reason: &str);

    /// Whether the underlying socket accepts writes right now.
    fn is_open(&self) -> bool;
}

/// Failure reported by a [`Transport`] write or during construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError(pub String);

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "transport error: {}", self.0)
    }
}

impl std::error::Error for TransportError {}

/// Channel errors surfaced to the session owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// The transport could not be constructed (bad URL, unsupported
    /// transport). Fatal to session entry; there is no retry.
    Config { detail: String },
}

impl fmt::Display for ChannelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config { detail } => write!(f, "channel configuration error: {}", detail),
        }
    }
}

impl std::error::Error for ChannelError {}

/// Where and as whom to connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelConfig {
    /// Base endpoint, e.g. `wss://play.example.net/ws`.
    pub root_url: String,

    /// Session code, already normalized.
    pub code: String,

    /// Local player's username.
    pub username: String,
}

impl ChannelConfig {
    pub fn new(root_url: impl Into<String>, code: &str, username: impl Into<String>) -> Self {
        Self {
            root_url: root_url.into(),
            code: normalize_code(code),
            username: username.into(),
        }
    }

    /// Full channel address: `<root>/<CODE>/<username>`.
    pub fn url(&self) -> String {
        format!(
            "{}/{}/{}",
            self.root_url.trim_end_matches('/'),
            self.code,
            self.username
        )
    }
}

/// Uppercase and trim a user-entered session code.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// Owns the one channel of a session: lifecycle, close policy, send/receive.
pub struct ChannelManager {
    transport: Box<dyn Transport>,
    state: ConnectionState,

    /// Latest snapshot message, overwritten on every arrival.
    latest: Option<ServerMessage>,

    /// Drawing deltas in arrival order; always drained fully.
    replay: VecDeque<DrawingSegment>,

    outcome: Option<CloseOutcome>,
    close_grace: Duration,
    closed_locally: bool,
}

impl ChannelManager {
    /// Construct the channel through `connector`. A connector failure is a
    /// configuration error: surfaced, fatal to session entry, never a panic.
    pub fn open<F>(config: &ChannelConfig, connector: F) -> Result<Self, ChannelError>
    where
        F: FnOnce(&str) -> Result<Box<dyn Transport>, TransportError>,
    {
        let url = config.url();
        let transport = connector(&url).map_err(|e| ChannelError::Config {
            detail: e.to_string(),
        })?;
        debug!(%url, "channel constructed");
        Ok(Self {
            transport,
            state: ConnectionState::Connecting,
            latest: None,
            replay: VecDeque::new(),
            outcome: None,
            close_grace: DEFAULT_CLOSE_GRACE,
            closed_locally: false,
        })
    }

    /// Override the abnormal-close grace period.
    pub fn with_close_grace(mut self, grace: Duration) -> Self {
        self.close_grace = grace;
        self
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// The channel opened (or reopened within the grace window).
    pub fn on_open(&mut self) {
        debug!("channel open");
        self.state = ConnectionState::Connected;
        self.outcome = None;
    }

    /// A transport-level error. The close event that follows carries the
    /// code; here we only note that traffic stopped.
    pub fn on_error(&mut self, detail: &str) {
        warn!(%detail, "channel error");
        self.state = ConnectionState::Disconnected;
    }

    /// The channel closed with `code` and `reason`.
    pub fn on_close(&mut self, code: u16, reason: &str) {
        debug!(code, %reason, "channel closed");
        self.state = ConnectionState::Disconnected;
        self.outcome = Some(match code {
            CLOSE_NORMAL | CLOSE_GOING_AWAY => CloseOutcome::Clean,
            CLOSE_POLICY => CloseOutcome::PolicyRejected {
                reason: fallback_reason(reason),
            },
            _ => CloseOutcome::Abnormal {
                reason: fallback_reason(reason),
                grace_until: Instant::now() + self.close_grace,
            },
        });
    }

    /// One inbound text frame. Malformed payloads are dropped with a
    /// diagnostic; they never halt processing.
    pub fn on_frame(&mut self, text: &str) {
        match ServerMessage::parse(text) {
            Ok(ServerMessage::DrawingUpdate { data }) => self.replay.push_back(data),
            Ok(msg) => self.latest = Some(msg),
            Err(e) => warn!(error = %e, "dropping malformed inbound frame"),
        }
    }

    /// Take the most recent snapshot message, if any arrived since last call.
    pub fn take_latest(&mut self) -> Option<ServerMessage> {
        self.latest.take()
    }

    /// Next drawing delta in arrival order.
    pub fn pop_replay(&mut self) -> Option<DrawingSegment> {
        self.replay.pop_front()
    }

    /// Send now or drop: serialized and written only if the channel is open,
    /// otherwise logged and discarded. Never raised to the caller.
    pub fn send(&mut self, msg: &ClientMessage) {
        if !self.state.is_connected() || !self.transport.is_open() {
            warn!(state = ?self.state, "send while channel not open, dropping");
            return;
        }
        let text = match msg.encode() {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "failed to encode outbound message, dropping");
                return;
            }
        };
        if let Err(e) = self.transport.send_text(&text) {
            warn!(error = %e, "transport write failed, dropping");
        }
    }

    /// Close with code 1000 and `reason`. Safe to call repeatedly.
    pub fn close(&mut self, reason: &str) {
        if self.closed_locally {
            return;
        }
        self.closed_locally = true;
        if self.transport.is_open() {
            self.transport.close(CLOSE_NORMAL, reason);
        }
        self.state = ConnectionState::Disconnected;
    }

    /// Error text to surface, for any non-clean close.
    pub fn error_banner(&self) -> Option<&str> {
        match &self.outcome {
            Some(CloseOutcome::PolicyRejected { reason })
            | Some(CloseOutcome::Abnormal { reason, .. }) => Some(reason),
            _ => None,
        }
    }

    /// Whether the session should fall back to the pre-session view now:
    /// immediately for a policy rejection, after the grace deadline for any
    /// other abnormal close, never for a clean one.
    pub fn should_exit(&self) -> bool {
        match &self.outcome {
            Some(CloseOutcome::PolicyRejected { .. }) => true,
            Some(CloseOutcome::Abnormal { grace_until, .. }) => Instant::now() >= *grace_until,
            _ => false,
        }
    }
}

impl fmt::Debug for ChannelManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelManager")
            .field("state", &self.state)
            .field("outcome", &self.outcome)
            .field("replay_len", &self.replay.len())
            .finish()
    }
}

fn fallback_reason(reason: &str) -> String {
    if reason.is_empty() {
        UNEXPLAINED_CLOSE.to_string()
    } else {
        reason.to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use pretty_assertions::assert_eq;

    use super::*;

    #[derive(Default)]
    struct FakeState {
        open: bool,
        sent: Vec<String>,
        closes: Vec<(u16, String)>,
    }

    struct FakeTransport(Rc<RefCell<FakeState>>);

    impl Transport for FakeTransport {
        fn send_text(&mut self, text: &str) -> Result<(), TransportError> {
            self.0.borrow_mut().sent.push(text.to_string());
            Ok(())
        }

        fn close(&mut self, code: u16, reason: &str) {
            let mut state = self.0.borrow_mut();
            state.closes.push((code, reason.to_string()));
            state.open = false;
        }

        fn is_open(&self) -> bool {
            self.0.borrow().open
        }
    }

    fn make_channel() -> (ChannelManager, Rc<RefCell<FakeState>>) {
        let shared = Rc::new(RefCell::new(FakeState {
            open: true,
            ..FakeState::default()
        }));
        let handle = Rc::clone(&shared);
        let config = ChannelConfig::new("ws://localhost:8000/ws", "abc123", "Ana");
        let channel = ChannelManager::open(&config, move |_| {
            Ok(Box::new(FakeTransport(handle)) as Box<dyn Transport>)
        })
        .unwrap();
        (channel, shared)
    }

    #[test]
    fn test_config_url_and_code_normalization() {
        let config = ChannelConfig::new("ws://host/ws/", " ab12cd ", "Ana");
        assert_eq!(config.code, "AB12CD");
        assert_eq!(config.url(), "ws://host/ws/AB12CD/Ana");
    }

    #[test]
    fn test_connector_failure_is_config_error() {
        let config = ChannelConfig::new("not a url", "x", "Ana");
        let result = ChannelManager::open(&config, |url| {
            Err(TransportError(format!("unsupported scheme in {}", url)))
        });
        match result {
            Err(ChannelError::Config { detail }) => {
                assert!(detail.contains("unsupported scheme"))
            }
            Ok(_) => panic!("expected configuration error"),
        }
    }

    #[test]
    fn test_send_before_open_is_dropped() {
        let (mut channel, shared) = make_channel();

        channel.send(&ClientMessage::StartGame);
        assert!(shared.borrow().sent.is_empty());

        channel.on_open();
        channel.send(&ClientMessage::StartGame);
        assert_eq!(shared.borrow().sent, vec![r#"{"type":"start_game"}"#]);
    }

    #[test]
    fn test_send_after_close_is_dropped() {
        let (mut channel, shared) = make_channel();
        channel.on_open();
        channel.on_close(CLOSE_NORMAL, "");

        channel.send(&ClientMessage::ClearCanvas);
        assert!(shared.borrow().sent.is_empty());
    }

    #[test]
    fn test_clean_close_has_no_banner() {
        let (mut channel, _) = make_channel();
        channel.on_open();

        channel.on_close(CLOSE_NORMAL, "");
        assert_eq!(channel.error_banner(), None);
        assert!(!channel.should_exit());

        channel.on_close(CLOSE_GOING_AWAY, "going away");
        assert_eq!(channel.error_banner(), None);
        assert!(!channel.should_exit());
    }

    #[test]
    fn test_policy_rejection_exits_immediately() {
        let (mut channel, _) = make_channel();
        channel.on_open();
        channel.on_close(CLOSE_POLICY, "game already running");

        assert_eq!(channel.error_banner(), Some("game already running"));
        assert!(channel.should_exit());
    }

    #[test]
    fn test_abnormal_close_waits_for_grace() {
        let (channel, _) = make_channel();
        let mut channel = channel.with_close_grace(Duration::from_secs(60));
        channel.on_open();
        channel.on_close(1006, "");

        assert_eq!(channel.error_banner(), Some(UNEXPLAINED_CLOSE));
        assert!(!channel.should_exit());
    }

    #[test]
    fn test_abnormal_close_exits_after_grace() {
        let (channel, _) = make_channel();
        let mut channel = channel.with_close_grace(Duration::ZERO);
        channel.on_open();
        channel.on_close(1011, "server fault");

        assert_eq!(channel.error_banner(), Some("server fault"));
        assert!(channel.should_exit());
    }

    #[test]
    fn test_reopen_within_grace_cancels_exit() {
        let (channel, _) = make_channel();
        let mut channel = channel.with_close_grace(Duration::ZERO);
        channel.on_open();
        channel.on_close(1006, "");
        channel.on_open();

        assert!(!channel.should_exit());
        assert_eq!(channel.error_banner(), None);
        assert!(channel.state().is_connected());
    }

    #[test]
    fn test_close_is_idempotent() {
        let (mut channel, shared) = make_channel();
        channel.on_open();

        channel.close("leaving");
        channel.close("leaving");
        assert_eq!(
            shared.borrow().closes,
            vec![(CLOSE_NORMAL, "leaving".to_string())]
        );
    }

    #[test]
    fn test_snapshot_slot_overwrites() {
        let (mut channel, _) = make_channel();
        channel.on_open();

        channel.on_frame(r#"{"type":"chat_message","username":"Ana","message":"first"}"#);
        channel.on_frame(r#"{"type":"chat_message","username":"Ana","message":"second"}"#);

        match channel.take_latest() {
            Some(ServerMessage::ChatMessage { message, .. }) => assert_eq!(message, "second"),
            other => panic!("unexpected message: {:?}", other),
        }
        assert_eq!(channel.take_latest(), None);
    }

    #[test]
    fn test_drawing_updates_queue_in_order() {
        let (mut channel, _) = make_channel();
        channel.on_open();

        for i in 0..3 {
            channel.on_frame(&format!(
                r##"{{"type":"drawing_update","data":{{"x0":{i},"y0":0,"x1":1,"y1":1,"color":"#000","lineWidth":5}}}}"##,
            ));
        }
        // A snapshot in between never displaces queued segments.
        channel.on_frame(r#"{"type":"canvas_cleared"}"#);

        let xs: Vec<f64> = std::iter::from_fn(|| channel.pop_replay())
            .map(|seg| seg.x0)
            .collect();
        assert_eq!(xs, vec![0.0, 1.0, 2.0]);
        assert_eq!(channel.take_latest(), Some(ServerMessage::CanvasCleared));
    }

    #[test]
    fn test_malformed_frame_is_dropped() {
        let (mut channel, _) = make_channel();
        channel.on_open();

        channel.on_frame("{{{");
        assert_eq!(channel.take_latest(), None);
        assert_eq!(channel.pop_replay(), None);
        assert!(channel.state().is_connected());
    }
}
