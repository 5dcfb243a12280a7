//! Capture side of the pipeline.
//!
//! | Module    | Purpose                                       |
//! |-----------|-----------------------------------------------|
//! | `types`   | Captured and packed frame representations     |
//! | `convert` | Stride removal and vertical flip              |
//! | `slot`    | Single-slot handoff from capture to session   |

pub mod convert;
pub mod slot;
pub mod types;

pub use convert::pack_frame;
pub use slot::{SlotPublisher, SlotReceiver, frame_slot};
pub use types::{CapturedFrame, PackedFrame, PixelFormat};

use async_trait::async_trait;

use crate::error::MirrorError;

/// Anything that produces captured frames for a session.
#[async_trait]
pub trait FrameSource: Send {
    /// Wait for the next frame. [`MirrorError::EndOfStream`] ends the
    /// session cleanly.
    async fn next_frame(&mut self) -> Result<CapturedFrame, MirrorError>;

    /// Frames discarded before the session saw them.
    fn dropped_frames(&self) -> u64 {
        0
    }
}
