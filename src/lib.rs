//! DoodleCast Session Core
//!
//! This crate provides the client-side synchronization core for DoodleCast,
//! a multiplayer drawing-and-guessing party game.
//!
//! # Overview
//!
//! The session module provides:
//!
//! - **Channel Management** - Lifecycle of the one message channel per
//!   session, the close-code policy, and best-effort send semantics.
//!
//! - **Game State Mirror** - A reducer that applies authority messages to a
//!   local read-mirror of the game (roster, scores, phrases, chat).
//!
//! - **Drawing Pipeline** - Pointer capture with local smoothing, throttled
//!   outbound emission, and in-order replay of remote strokes.
//!
//! - **Session Orchestration** - `SessionClient` wires the three together
//!   and derives ephemeral UI signals (round countdown, point burst).
//!
//! # Design Principles
//!
//! 1. **The authority owns the truth** - Scores, rosters, and phrases are
//!    replaced wholesale from messages; the client never computes them.
//!
//! 2. **No networking** - The physical channel and the render surface live
//!    behind traits supplied by the embedding shell.
//!
//! 3. **Single-threaded** - All work runs from event callbacks on one
//!    logical thread; there is no locking anywhere.
//!
//! 4. **Degrade, don't fail** - Unknown messages are ignored, malformed
//!    ones dropped with a diagnostic, unsendable ones logged and discarded.
//!
//! # Example
//!
//! ```rust
//! use doodlecast_state::session::game::GameSession;
//! use doodlecast_state::session::message::ServerMessage;
//!
//! let mut session = GameSession::new("AB12CD");
//!
//! let msg = ServerMessage::parse(
//!     r#"{"type":"round_start","round":1,"total_rounds":3,"artist":"Ana","duration":60}"#,
//! )
//! .unwrap();
//! let effects = session.apply(msg);
//!
//! assert!(session.started);
//! assert_eq!(session.current_artist.as_deref(), Some("Ana"));
//! assert!(!effects.is_empty()); // the orchestrator re-seeds the countdown
//! ```

pub mod session;

// Re-export everything from session module at crate root
pub use session::*;
