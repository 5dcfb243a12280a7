//! The fixed 128-byte mirroring header.
//!
//! Every message on a mirroring connection is a header followed by
//! `payload_size` bytes of payload. The header is always emitted in
//! full; fields a message type does not use stay zero.
//!
//! ## Wire format (little-endian)
//! ```text
//! offset  size  field
//!      0     4  payload size            (u32)
//!      4     2  payload type            (u16)
//!      6     2  payload option          (u16)
//!      8     4  timestamp fraction, µs  (u32)   config + data
//!     12     4  timestamp seconds       (u32)   config + data
//!     16     4  source width            (f32)   config only
//!     20     4  source height           (f32)   config only
//!     40     4  display width           (f32)   config + data
//!     44     4  display height          (f32)   config + data
//!     48     4  horizontal center offset(f32)   config + data
//!     52     4  vertical center offset  (f32)   config + data
//!     56     4  supported width         (f32)   config + data
//!     60     4  supported height        (f32)   config + data
//! ```

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::MirrorError;

// ── Constants ────────────────────────────────────────────────────

/// Size of every header on the wire.
pub const HEADER_SIZE: usize = 128;

/// Largest payload the 32-bit size field can describe.
pub const MAX_PAYLOAD_SIZE: usize = u32::MAX as usize;

/// Payload option carried by video config and video data messages.
pub const OPTION_VIDEO: u16 = 0x0006;

/// Payload option carried by heartbeat messages.
pub const OPTION_HEARTBEAT: u16 = 0x001e;

/// Byte offsets of every header field.
pub mod offset {
    pub const PAYLOAD_SIZE: usize = 0;
    pub const PAYLOAD_TYPE: usize = 4;
    pub const PAYLOAD_OPTION: usize = 6;
    pub const TIMESTAMP_FRACTION: usize = 8;
    pub const TIMESTAMP_SECONDS: usize = 12;
    pub const SOURCE_WIDTH: usize = 16;
    pub const SOURCE_HEIGHT: usize = 20;
    pub const DISPLAY_WIDTH: usize = 40;
    pub const DISPLAY_HEIGHT: usize = 44;
    pub const CENTER_X: usize = 48;
    pub const CENTER_Y: usize = 52;
    pub const SUPPORTED_WIDTH: usize = 56;
    pub const SUPPORTED_HEIGHT: usize = 60;
}

pub type HeaderBytes = [u8; HEADER_SIZE];

// ── PayloadType ──────────────────────────────────────────────────

/// Kind of payload following a header.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadType {
    /// Length-prefixed coded access unit.
    VideoData = 0,
    /// Codec configuration record.
    VideoConfig = 1,
    /// Keep-alive, no payload.
    Heartbeat = 2,
}

impl PayloadType {
    /// Option value the receiver expects for this payload type.
    pub const fn option(self) -> u16 {
        match self {
            PayloadType::Heartbeat => OPTION_HEARTBEAT,
            PayloadType::VideoData | PayloadType::VideoConfig => OPTION_VIDEO,
        }
    }
}

impl TryFrom<u16> for PayloadType {
    type Error = MirrorError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(PayloadType::VideoData),
            1 => Ok(PayloadType::VideoConfig),
            2 => Ok(PayloadType::Heartbeat),
            _ => Err(MirrorError::UnknownVariant {
                type_name: "PayloadType",
                value: value as u64,
            }),
        }
    }
}

impl fmt::Display for PayloadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayloadType::VideoData => write!(f, "VIDEO_DATA"),
            PayloadType::VideoConfig => write!(f, "VIDEO_CONFIG"),
            PayloadType::Heartbeat => write!(f, "HEARTBEAT"),
        }
    }
}

// ── MirrorGeometry ───────────────────────────────────────────────

/// Screen geometry advertised to the receiver, in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MirrorGeometry {
    pub source_width: f32,
    pub source_height: f32,
    pub display_width: f32,
    pub display_height: f32,
    /// `(real width - sent width) / 2`, letterboxing on the receiver.
    pub center_x: f32,
    /// `(real height - sent height) / 2`.
    pub center_y: f32,
    pub supported_width: f32,
    pub supported_height: f32,
}

impl MirrorGeometry {
    /// Same size everywhere, no centering offset.
    pub fn uniform(width: f32, height: f32) -> Self {
        Self {
            source_width: width,
            source_height: height,
            display_width: width,
            display_height: height,
            center_x: 0.0,
            center_y: 0.0,
            supported_width: width,
            supported_height: height,
        }
    }
}

impl Default for MirrorGeometry {
    fn default() -> Self {
        Self::uniform(1920.0, 1080.0)
    }
}

// ── MirrorHeader ─────────────────────────────────────────────────

/// Decoded view of one 128-byte header.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MirrorHeader {
    pub payload_size: u32,
    pub payload_type: PayloadType,
    pub option: u16,
    pub timestamp_fraction: u32,
    pub timestamp_seconds: u32,
    /// Geometry fields, unset on `Heartbeat`. Source size is zero
    /// except on `VideoConfig`.
    pub layout: Option<MirrorGeometry>,
}

impl MirrorHeader {
    /// Header for `kind` stamped with the given wall-clock instant.
    pub fn new(
        kind: PayloadType,
        payload_size: u32,
        geometry: &MirrorGeometry,
        now: SystemTime,
    ) -> Self {
        if kind == PayloadType::Heartbeat {
            return Self::heartbeat();
        }

        let since_epoch = now.duration_since(UNIX_EPOCH).unwrap_or_default();
        let layout = match kind {
            PayloadType::VideoConfig => *geometry,
            _ => MirrorGeometry {
                source_width: 0.0,
                source_height: 0.0,
                ..*geometry
            },
        };

        Self {
            payload_size,
            payload_type: kind,
            option: kind.option(),
            timestamp_fraction: since_epoch.subsec_micros(),
            timestamp_seconds: since_epoch.as_secs() as u32,
            layout: Some(layout),
        }
    }

    /// Keep-alive header: no payload, no timestamp, no geometry.
    pub fn heartbeat() -> Self {
        Self {
            payload_size: 0,
            payload_type: PayloadType::Heartbeat,
            option: OPTION_HEARTBEAT,
            timestamp_fraction: 0,
            timestamp_seconds: 0,
            layout: None,
        }
    }

    /// Serialize to the fixed 128-byte layout.
    pub fn to_bytes(&self) -> HeaderBytes {
        let mut buf: HeaderBytes = [0; HEADER_SIZE];
        put_u32(&mut buf, offset::PAYLOAD_SIZE, self.payload_size);
        put_u16(&mut buf, offset::PAYLOAD_TYPE, self.payload_type as u16);
        put_u16(&mut buf, offset::PAYLOAD_OPTION, self.option);

        if self.payload_type == PayloadType::Heartbeat {
            return buf;
        }

        put_u32(&mut buf, offset::TIMESTAMP_FRACTION, self.timestamp_fraction);
        put_u32(&mut buf, offset::TIMESTAMP_SECONDS, self.timestamp_seconds);

        if let Some(g) = &self.layout {
            put_f32(&mut buf, offset::SOURCE_WIDTH, g.source_width);
            put_f32(&mut buf, offset::SOURCE_HEIGHT, g.source_height);
            put_f32(&mut buf, offset::DISPLAY_WIDTH, g.display_width);
            put_f32(&mut buf, offset::DISPLAY_HEIGHT, g.display_height);
            put_f32(&mut buf, offset::CENTER_X, g.center_x);
            put_f32(&mut buf, offset::CENTER_Y, g.center_y);
            put_f32(&mut buf, offset::SUPPORTED_WIDTH, g.supported_width);
            put_f32(&mut buf, offset::SUPPORTED_HEIGHT, g.supported_height);
        }

        buf
    }

    /// Parse a header previously produced by [`to_bytes`](Self::to_bytes).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MirrorError> {
        if bytes.len() < HEADER_SIZE {
            return Err(MirrorError::InvalidHeader("shorter than 128 bytes"));
        }

        let payload_type = PayloadType::try_from(get_u16(bytes, offset::PAYLOAD_TYPE))?;
        let option = get_u16(bytes, offset::PAYLOAD_OPTION);
        if option != payload_type.option() {
            return Err(MirrorError::InvalidHeader("payload option does not match type"));
        }
        let payload_size = get_u32(bytes, offset::PAYLOAD_SIZE);

        if payload_type == PayloadType::Heartbeat {
            return Ok(Self {
                payload_size,
                ..Self::heartbeat()
            });
        }

        let layout = MirrorGeometry {
            source_width: get_f32(bytes, offset::SOURCE_WIDTH),
            source_height: get_f32(bytes, offset::SOURCE_HEIGHT),
            display_width: get_f32(bytes, offset::DISPLAY_WIDTH),
            display_height: get_f32(bytes, offset::DISPLAY_HEIGHT),
            center_x: get_f32(bytes, offset::CENTER_X),
            center_y: get_f32(bytes, offset::CENTER_Y),
            supported_width: get_f32(bytes, offset::SUPPORTED_WIDTH),
            supported_height: get_f32(bytes, offset::SUPPORTED_HEIGHT),
        };
        Ok(Self {
            payload_size,
            payload_type,
            option,
            timestamp_fraction: get_u32(bytes, offset::TIMESTAMP_FRACTION),
            timestamp_seconds: get_u32(bytes, offset::TIMESTAMP_SECONDS),
            layout: Some(layout),
        })
    }
}

/// Build the 128-byte header for `kind`, stamped with the current time.
pub fn build_header(kind: PayloadType, payload_size: u32, geometry: &MirrorGeometry) -> HeaderBytes {
    MirrorHeader::new(kind, payload_size, geometry, SystemTime::now()).to_bytes()
}

// ── Field helpers ────────────────────────────────────────────────

fn put_u16(buf: &mut HeaderBytes, at: usize, value: u16) {
    buf[at..at + 2].copy_from_slice(&value.to_le_bytes());
}

fn put_u32(buf: &mut HeaderBytes, at: usize, value: u32) {
    buf[at..at + 4].copy_from_slice(&value.to_le_bytes());
}

fn put_f32(buf: &mut HeaderBytes, at: usize, value: f32) {
    buf[at..at + 4].copy_from_slice(&value.to_le_bytes());
}

fn get_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

fn get_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

fn get_f32(bytes: &[u8], at: usize) -> f32 {
    f32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

// ── Tests ────────────────────────────────────────────────────────
