//! # mirror-core
//!
//! Protocol core for streaming a desktop to AirPlay-style mirroring
//! receivers.
//!
//! This crate contains:
//! - **Header**: the fixed 128-byte message header, `build_header`
//! - **Reframe**: Annex B → codec configuration record and length-prefixed access units
//! - **Sink**: `SinkSet`, ordered fan-out to sockets, files and stdout
//! - **Handshake**: the one-shot `POST /stream` request
//! - **Capture**: frame types, stride removal / flip, single-slot handoff
//! - **Encoder**: the `VideoEncoder` collaborator trait
//! - **Session**: `MirrorSession`, the paced capture → encode → emit loop
//! - **State**: session and per-frame cycle state machines
//! - **Codec**: `MirrorCodec` for reading recorded streams via `tokio_util`
//! - **Error**: `MirrorError`, a typed, `thiserror`-based error hierarchy

pub mod capture;
pub mod codec;
pub mod encoder;
pub mod error;
pub mod handshake;
pub mod header;
pub mod reframe;
pub mod session;
pub mod sink;
pub mod state;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use capture::{
    CapturedFrame, FrameSource, PackedFrame, PixelFormat, SlotPublisher, SlotReceiver,
    frame_slot, pack_frame,
};
pub use codec::{MirrorCodec, MirrorMessage};
pub use encoder::{EncodedOutput, VideoEncoder};
pub use error::MirrorError;
pub use handshake::{ClientIdentity, DEFAULT_CAPABILITIES_FILE, SessionHandshake};
pub use header::{HEADER_SIZE, MirrorGeometry, MirrorHeader, PayloadType, build_header};
pub use reframe::{
    CodecConfigRecord, LengthPrefixedUnits, NalKind, ReframedUnit, extract_codec_config,
    rewrite_access_unit,
};
pub use session::{FramePacer, MirrorSession, SessionConfig, SessionStats};
pub use sink::{BroadcastReport, Destination, DestinationKind, MAX_DESTINATIONS, SinkSet};
pub use state::{CyclePhase, SessionPhase};
