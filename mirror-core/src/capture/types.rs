//! Frame representations passed between capture, conversion and the
//! encoder.

use std::fmt;
use std::time::Duration;

use bytes::Bytes;

// ── PixelFormat ──────────────────────────────────────────────────

/// Pixel layout of a captured buffer, named after the compositor's
/// shared-memory formats (little-endian channel order).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Argb8888,
    Xrgb8888,
    Abgr8888,
    Xbgr8888,
    Rgba8888,
    Rgbx8888,
    Bgra8888,
    Bgrx8888,
    /// 8-bit luma plane followed by an interleaved half-resolution
    /// chroma plane.
    Nv12,
}

const fn fourcc(code: &[u8; 4]) -> u32 {
    (code[0] as u32) | (code[1] as u32) << 8 | (code[2] as u32) << 16 | (code[3] as u32) << 24
}

impl PixelFormat {
    /// Map a shared-memory format code. The two legacy formats use 0 and
    /// 1; the rest are DRM fourcc codes.
    pub const fn from_shm_code(code: u32) -> Option<Self> {
        const ABGR: u32 = fourcc(b"AB24");
        const XBGR: u32 = fourcc(b"XB24");
        const RGBA: u32 = fourcc(b"RA24");
        const RGBX: u32 = fourcc(b"RX24");
        const BGRA: u32 = fourcc(b"BA24");
        const BGRX: u32 = fourcc(b"BX24");
        const NV12: u32 = fourcc(b"NV12");
        match code {
            0 => Some(PixelFormat::Argb8888),
            1 => Some(PixelFormat::Xrgb8888),
            ABGR => Some(PixelFormat::Abgr8888),
            XBGR => Some(PixelFormat::Xbgr8888),
            RGBA => Some(PixelFormat::Rgba8888),
            RGBX => Some(PixelFormat::Rgbx8888),
            BGRA => Some(PixelFormat::Bgra8888),
            BGRX => Some(PixelFormat::Bgrx8888),
            NV12 => Some(PixelFormat::Nv12),
            _ => None,
        }
    }

    /// Bytes per pixel of the first plane.
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Nv12 => 1,
            _ => 4,
        }
    }

    pub const fn is_planar(self) -> bool {
        matches!(self, PixelFormat::Nv12)
    }

    /// Byte order in memory, as encoder libraries name it.
    pub const fn memory_layout(self) -> &'static str {
        match self {
            PixelFormat::Argb8888 => "bgra",
            PixelFormat::Xrgb8888 => "bgr0",
            PixelFormat::Abgr8888 => "rgba",
            PixelFormat::Xbgr8888 => "rgb0",
            PixelFormat::Rgba8888 => "abgr",
            PixelFormat::Rgbx8888 => "0bgr",
            PixelFormat::Bgra8888 => "argb",
            PixelFormat::Bgrx8888 => "0rgb",
            PixelFormat::Nv12 => "nv12",
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.memory_layout())
    }
}

// ── CapturedFrame ────────────────────────────────────────────────

/// A raw frame as the compositor handed it over.
///
/// `data` holds rows of `stride` bytes; `stride` may exceed the packed
/// row length. When `y_inverted` is set, the first row in memory is the
/// bottom of the image.
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    pub width: u32,
    pub height: u32,
    /// Row pitch in bytes.
    pub stride: u32,
    pub format: PixelFormat,
    pub y_inverted: bool,
    pub data: Bytes,
    /// Presentation time relative to the start of capture.
    pub pts: Duration,
}

impl CapturedFrame {
    /// Bytes of one row without padding.
    pub fn row_len(&self) -> usize {
        self.width as usize * self.format.bytes_per_pixel()
    }
}

// ── PackedFrame ──────────────────────────────────────────────────

/// Encoder input: rows packed without padding, top row first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedFrame {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub data: Bytes,
    pub pts: Duration,
}
