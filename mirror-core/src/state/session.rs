//! Session lifecycle state machine.
//!
//! Provides a `SessionPhase` enum that models a mirroring session from
//! startup to teardown, with validated transitions that return
//! `Result` instead of panicking.

use std::time::{Duration, Instant};

use crate::error::MirrorError;

// ── SessionPhase ─────────────────────────────────────────────────

/// The current phase of a mirroring session.
///
/// ```text
///  Idle ──► Handshaking ──► Streaming ──► TearingDown ──► Closed
///                │                              ▲
///                └──────────────────────────────┘
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionPhase {
    /// Destinations may still be registered.
    #[default]
    Idle,

    /// Destinations sealed; the stream request is going out.
    Handshaking,

    /// Capture, encode and emit cycles are running.
    Streaming {
        /// When the first cycle began.
        since: Instant,
    },

    /// Destinations are being flushed and closed.
    TearingDown,

    /// Terminal state.
    Closed,
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Handshaking => write!(f, "Handshaking"),
            Self::Streaming { .. } => write!(f, "Streaming"),
            Self::TearingDown => write!(f, "TearingDown"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}

impl SessionPhase {
    pub fn is_streaming(&self) -> bool {
        matches!(self, Self::Streaming { .. })
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// How long the session has been streaming, `None` in any other phase.
    pub fn streaming_duration(&self) -> Option<Duration> {
        match self {
            Self::Streaming { since } => Some(since.elapsed()),
            _ => None,
        }
    }

    // ── Transitions ──────────────────────────────────────────────

    /// Valid from: `Idle`.
    pub fn begin_handshake(&mut self) -> Result<(), MirrorError> {
        match self {
            Self::Idle => {
                *self = Self::Handshaking;
                Ok(())
            }
            _ => Err(MirrorError::ProtocolViolation(
                "cannot handshake: session already started",
            )),
        }
    }

    /// Valid from: `Handshaking`.
    pub fn begin_streaming(&mut self) -> Result<(), MirrorError> {
        match self {
            Self::Handshaking => {
                *self = Self::Streaming {
                    since: Instant::now(),
                };
                Ok(())
            }
            _ => Err(MirrorError::ProtocolViolation(
                "cannot stream: handshake not in progress",
            )),
        }
    }

    /// Valid from: `Handshaking`, `Streaming`.
    pub fn begin_teardown(&mut self) -> Result<(), MirrorError> {
        match self {
            Self::Handshaking | Self::Streaming { .. } => {
                *self = Self::TearingDown;
                Ok(())
            }
            _ => Err(MirrorError::ProtocolViolation(
                "cannot tear down: session not started",
            )),
        }
    }

    /// Valid from: `TearingDown`.
    pub fn finish_teardown(&mut self) -> Result<(), MirrorError> {
        match self {
            Self::TearingDown => {
                *self = Self::Closed;
                Ok(())
            }
            _ => Err(MirrorError::ProtocolViolation(
                "cannot close: teardown not in progress",
            )),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
