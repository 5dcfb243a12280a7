//! Per-frame cycle state machine.
//!
//! ```text
//!  WaitFrame ──► Convert ──► Encode ──► EmitConfig ──► Reframe ──► EmitData
//!      ▲                        │           │          ▲   │  ▲        │
//!      │                        └───────────┼──────────┘   │  └────────┤
//!      └──────────────────── PaceSleep ◄────┴──────────────┴───────────┘
//! ```
//!
//! `EmitConfig` only runs on the first unit after an encoder
//! (re)initialization. One frame may yield several access units, so
//! `EmitData` loops back to `Reframe`.

use std::fmt;

use crate::error::MirrorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum CyclePhase {
    /// Blocked until capture publishes a frame.
    #[default]
    WaitFrame,
    /// Packing the captured buffer for the encoder.
    Convert,
    /// Encoder running.
    Encode,
    /// Heartbeat, config header and record going out.
    EmitConfig,
    /// Rewriting one access unit to length-prefixed form.
    Reframe,
    /// Data header and payload going out.
    EmitData,
    /// Sleeping off the rest of the frame interval.
    PaceSleep,
}

impl CyclePhase {
    /// Whether `next` may follow `self`.
    pub const fn can_advance(self, next: CyclePhase) -> bool {
        use CyclePhase::*;
        matches!(
            (self, next),
            (WaitFrame, Convert)
                | (Convert, Encode)
                | (Encode, EmitConfig | Reframe | PaceSleep)
                | (EmitConfig, Reframe | PaceSleep)
                | (Reframe, EmitData | Reframe | PaceSleep)
                | (EmitData, Reframe | PaceSleep)
                | (PaceSleep, WaitFrame)
        )
    }

    /// Move to `next`, rejecting transitions outside the cycle.
    pub fn advance(&mut self, next: CyclePhase) -> Result<(), MirrorError> {
        if !self.can_advance(next) {
            return Err(MirrorError::ProtocolViolation("invalid cycle transition"));
        }
        *self = next;
        Ok(())
    }

    /// Back to `WaitFrame` from anywhere, after a failed cycle.
    pub fn reset(&mut self) {
        *self = CyclePhase::WaitFrame;
    }
}

impl fmt::Display for CyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CyclePhase::WaitFrame => "WAIT_FRAME",
            CyclePhase::Convert => "CONVERT",
            CyclePhase::Encode => "ENCODE",
            CyclePhase::EmitConfig => "EMIT_CONFIG",
            CyclePhase::Reframe => "REFRAME",
            CyclePhase::EmitData => "EMIT_DATA",
            CyclePhase::PaceSleep => "PACE_SLEEP",
        };
        f.write_str(name)
    }
}
