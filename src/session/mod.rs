//! Session synchronization module for DoodleCast.
//!
//! This module provides the core components and their orchestrator:
//!
//! - `message` - Wire envelope: tagged inbound/outbound message enums
//! - `channel` - Channel lifecycle, close-code policy, inbound routing
//! - `game` - Authority-mirrored game state and the message reducer
//! - `drawing` - Stroke capture, throttled emission, remote replay
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                          SessionClient                               │
//! │                                                                      │
//! │  ┌────────────────┐   ┌────────────────┐   ┌────────────────┐        │
//! │  │ ChannelManager │   │  GameSession   │   │ DrawingPipeline│        │
//! │  │                │   │                │   │                │        │
//! │  │ latest slot ───┼──▶│ apply(msg) ────┼─┐ │ capture        │        │
//! │  │ replay queue ──┼───┼────────────────┼─┼▶│ replay         │        │
//! │  │ send(msg) ◀────┼───┼────────────────┼─┼─┤ throttle       │        │
//! │  └────────────────┘   └────────────────┘ │ └────────────────┘        │
//! │                                          │                           │
//! │                        effects ──▶ RoundCountdown / PointBurst       │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Everything runs on one logical thread: the embedding shell forwards
//! channel callbacks and pointer input, calls `poll` after each batch of
//! events, and `tick_second` once a second. Handlers run to completion, so
//! no locking exists anywhere in the module.

pub mod channel;
pub mod drawing;
pub mod game;
pub mod message;

use std::time::{Duration, Instant};

// Re-export commonly used types
pub use channel::{
    ChannelConfig, ChannelError, ChannelManager, CloseOutcome, ConnectionState, Transport,
    TransportError, normalize_code,
};
pub use drawing::{
    DrawSurface, DrawingPipeline, LineCap, LineJoin, Point, StrokeStyle, SurfaceSnapshot,
};
pub use game::{
    BonusTier, ChatEntry, ChatKind, GameSession, PhrasePrompt, PlayerStatus, SessionEffect,
};
pub use message::{ClientMessage, DrawingSegment, PhraseCategory, PhraseOptions, PlayerInfo, ServerMessage};

use tracing::debug;

/// How long the point-burst overlay stays up.
pub const POINT_BURST_DURATION: Duration = Duration::from_millis(2000);

/// Presentation-only round countdown.
///
/// Re-seeded from the duration in `round_start`, decremented locally once per
/// second by the embedding shell, and frozen at zero. Zero is not a round
/// end; only the authority ends rounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RoundCountdown {
    remaining: u64,
}

impl RoundCountdown {
    pub fn reset(&mut self, secs: u64) {
        self.remaining = secs;
    }

    pub fn stop(&mut self) {
        self.remaining = 0;
    }

    /// One wall-clock second elapsed.
    pub fn tick(&mut self) -> u64 {
        self.remaining = self.remaining.saturating_sub(1);
        self.remaining
    }

    pub fn remaining(&self) -> u64 {
        self.remaining
    }
}

/// Transient score popup for a correct guess, auto-dismissed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointBurst {
    pub username: String,
    pub points: i64,
    pub bonus: i64,
    expires_at: Instant,
}

/// Wires the channel, the reducer, and the drawing pipeline together and
/// derives the ephemeral UI-only signals.
#[derive(Debug)]
pub struct SessionClient {
    username: String,
    channel: ChannelManager,
    session: GameSession,
    pipeline: DrawingPipeline,
    countdown: RoundCountdown,
    burst: Option<PointBurst>,
    burst_duration: Duration,
}

impl SessionClient {
    /// Enter a session: build the channel through `connector` and start in
    /// `Connecting`. A connector failure is fatal to entry and surfaced as
    /// a configuration error.
    pub fn join<F>(
        root_url: &str,
        code: &str,
        username: &str,
        connector: F,
    ) -> Result<Self, ChannelError>
    where
        F: FnOnce(&str) -> Result<Box<dyn Transport>, TransportError>,
    {
        let config = ChannelConfig::new(root_url, code, username);
        let channel = ChannelManager::open(&config, connector)?;
        Ok(Self {
            username: username.to_string(),
            session: GameSession::new(config.code),
            channel,
            pipeline: DrawingPipeline::new(),
            countdown: RoundCountdown::default(),
            burst: None,
            burst_duration: POINT_BURST_DURATION,
        })
    }

    /// Override the point-burst lifetime.
    pub fn with_burst_duration(mut self, duration: Duration) -> Self {
        self.burst_duration = duration;
        self
    }

    /// Override the abnormal-close grace period.
    pub fn with_close_grace(mut self, grace: Duration) -> Self {
        self.channel = self.channel.with_close_grace(grace);
        self
    }

    /// Override the drawing flush interval.
    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.pipeline = self.pipeline.with_flush_interval(interval);
        self
    }

    // Accessors

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn session(&self) -> &GameSession {
        &self.session
    }

    pub fn pipeline_mut(&mut self) -> &mut DrawingPipeline {
        &mut self.pipeline
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.channel.state()
    }

    pub fn countdown(&self) -> &RoundCountdown {
        &self.countdown
    }

    /// The current point burst, if it has not expired yet.
    pub fn point_burst(&self) -> Option<&PointBurst> {
        self.burst
            .as_ref()
            .filter(|b| Instant::now() < b.expires_at)
    }

    /// Error text to show the user, for non-clean closes.
    pub fn error_banner(&self) -> Option<&str> {
        self.channel.error_banner()
    }

    /// Whether to fall back to the pre-session view now.
    pub fn should_exit(&self) -> bool {
        self.channel.should_exit()
    }

    // Channel callbacks, forwarded by the embedding shell

    pub fn on_open(&mut self) {
        self.channel.on_open();
    }

    pub fn on_frame(&mut self, text: &str) {
        self.channel.on_frame(text);
    }

    pub fn on_close(&mut self, code: u16, reason: &str) {
        self.channel.on_close(code, reason);
    }

    pub fn on_error(&mut self, detail: &str) {
        self.channel.on_error(detail);
    }

    /// Process everything pending: replay queued drawing deltas in order,
    /// apply the latest snapshot message, run its effects, and emit a due
    /// drawing flush. Call after each batch of channel callbacks and on
    /// every timer fire.
    pub fn poll(&mut self, surface: &mut dyn DrawSurface) {
        while let Some(segment) = self.channel.pop_replay() {
            self.pipeline.apply_remote(&segment, surface);
        }

        if let Some(msg) = self.channel.take_latest() {
            if msg == ServerMessage::CanvasCleared {
                self.pipeline.clear_surface(surface);
            }
            let effects = self.session.apply(msg);
            self.pipeline
                .set_artist(self.session.is_artist(&self.username));
            for effect in effects {
                self.run_effect(effect);
            }
        }

        if let Some(segment) = self.pipeline.poll_flush() {
            self.channel
                .send(&ClientMessage::DrawingData { data: segment });
        }
    }

    fn run_effect(&mut self, effect: SessionEffect) {
        match effect {
            SessionEffect::TimerReset { secs } => self.countdown.reset(secs),
            SessionEffect::TimerStopped => self.countdown.stop(),
            SessionEffect::PointBurst {
                username,
                points,
                bonus,
            } => {
                self.burst = Some(PointBurst {
                    username,
                    points,
                    bonus,
                    expires_at: Instant::now() + self.burst_duration,
                });
            }
        }
    }

    /// One wall-clock second elapsed; advances the countdown.
    pub fn tick_second(&mut self) -> u64 {
        self.countdown.tick()
    }

    // Pointer input, forwarded when the local player is the artist

    pub fn pointer_down(&mut self, pointer: i64, at: Point) {
        self.pipeline.pointer_down(pointer, at);
    }

    pub fn pointer_move(&mut self, pointer: i64, at: Point, surface: &mut dyn DrawSurface) {
        self.pipeline.pointer_move(pointer, at, surface);
    }

    /// Pointer up/cancel/leave: closes the stroke and sends the force-flushed
    /// segment right away.
    pub fn pointer_up(&mut self, pointer: i64) {
        if let Some(segment) = self.pipeline.pointer_up(pointer) {
            self.channel
                .send(&ClientMessage::DrawingData { data: segment });
        }
    }

    // Outbound player actions; the authority validates all of them

    /// Send a guess. The artist's input is disabled, so an artist guess is
    /// dropped here rather than bounced off the authority.
    pub fn send_guess(&mut self, guess: &str) {
        if self.session.is_artist(&self.username) {
            debug!("artist guess suppressed");
            return;
        }
        let guess = guess.trim();
        if guess.is_empty() {
            return;
        }
        self.channel.send(&ClientMessage::Guess {
            guess: guess.to_string(),
        });
    }

    pub fn start_game(&mut self) {
        self.channel.send(&ClientMessage::StartGame);
    }

    pub fn select_package(&mut self, package: &str) {
        self.channel.send(&ClientMessage::SelectPackage {
            package: package.to_string(),
        });
    }

    /// Artist action: ask the authority to wipe every canvas. The local wipe
    /// happens when the broadcast `canvas_cleared` comes back.
    pub fn clear_canvas(&mut self) {
        self.channel.send(&ClientMessage::ClearCanvas);
    }

    pub fn toggle_phrase_pick(&mut self, category: &str, word: &str) {
        self.session.toggle_phrase_pick(category, word);
    }

    /// Confirm the phrase prompt. With every category picked this sends
    /// exactly one `select_phrase` (words in category order) and closes the
    /// prompt; otherwise nothing happens.
    pub fn confirm_phrase(&mut self) -> bool {
        match self.session.confirm_phrase() {
            Some(phrase) => {
                self.channel.send(&ClientMessage::SelectPhrase { phrase });
                true
            }
            None => false,
        }
    }

    /// Leave the session: cancel the pending drawing flush and close the
    /// channel. Safe to call more than once.
    pub fn leave(&mut self) {
        self.pipeline.detach();
        self.channel.close("leaving");
    }
}
