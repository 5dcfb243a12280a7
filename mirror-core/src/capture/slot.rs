//! Single-slot frame handoff from capture to the session loop.
//!
//! Capture publishes into the slot; the session takes the newest frame.
//! A frame published before the previous one was taken replaces it, so
//! the session always encodes the most recent screen contents.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::capture::FrameSource;
use crate::capture::types::CapturedFrame;
use crate::error::MirrorError;

struct Shared {
    frame: Mutex<Option<CapturedFrame>>,
    ready: Notify,
    closed: AtomicBool,
    overwritten: AtomicU64,
}

/// Create a connected publisher / receiver pair.
pub fn frame_slot() -> (SlotPublisher, SlotReceiver) {
    let shared = Arc::new(Shared {
        frame: Mutex::new(None),
        ready: Notify::new(),
        closed: AtomicBool::new(false),
        overwritten: AtomicU64::new(0),
    });
    (
        SlotPublisher {
            shared: Arc::clone(&shared),
        },
        SlotReceiver { shared },
    )
}

/// Capture side of the slot.
pub struct SlotPublisher {
    shared: Arc<Shared>,
}

impl SlotPublisher {
    /// Store `frame`, replacing any frame not yet taken. Returns `true`
    /// when a frame was replaced.
    pub fn publish(&self, frame: CapturedFrame) -> bool {
        let replaced = match self.shared.frame.lock() {
            Ok(mut slot) => slot.replace(frame).is_some(),
            Err(poisoned) => poisoned.into_inner().replace(frame).is_some(),
        };
        if replaced {
            self.shared.overwritten.fetch_add(1, Ordering::Relaxed);
        }
        self.shared.ready.notify_one();
        replaced
    }

    /// Signal that no more frames will arrive.
    pub fn close(&self) {
        self.shared.closed.store(true, Ordering::SeqCst);
        self.shared.ready.notify_one();
    }
}

impl Drop for SlotPublisher {
    fn drop(&mut self) {
        self.close();
    }
}

/// Session side of the slot.
pub struct SlotReceiver {
    shared: Arc<Shared>,
}

impl SlotReceiver {
    /// Wait for the next frame. `None` once the publisher is closed and
    /// the last frame has been taken.
    pub async fn take(&self) -> Option<CapturedFrame> {
        loop {
            if let Some(frame) = self.try_take() {
                return Some(frame);
            }
            if self.shared.closed.load(Ordering::SeqCst) {
                return self.try_take();
            }
            self.shared.ready.notified().await;
        }
    }

    pub fn try_take(&self) -> Option<CapturedFrame> {
        match self.shared.frame.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }

    /// Frames replaced before the session took them.
    pub fn overwritten(&self) -> u64 {
        self.shared.overwritten.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl FrameSource for SlotReceiver {
    async fn next_frame(&mut self) -> Result<CapturedFrame, MirrorError> {
        self.take().await.ok_or(MirrorError::EndOfStream)
    }

    fn dropped_frames(&self) -> u64 {
        self.overwritten()
    }
}
