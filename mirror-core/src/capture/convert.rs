//! Packs captured buffers into encoder input.
//!
//! Row padding is dropped and bottom-up buffers are flipped, so every
//! packed frame is top row first with `width * bpp` bytes per row.

use bytes::BytesMut;

use crate::capture::types::{CapturedFrame, PackedFrame, PixelFormat};
use crate::error::MirrorError;

/// One plane of a captured buffer.
struct Plane {
    offset: usize,
    rows: usize,
    row_len: usize,
}

fn planes(frame: &CapturedFrame) -> Vec<Plane> {
    let stride = frame.stride as usize;
    let height = frame.height as usize;
    let luma = Plane {
        offset: 0,
        rows: height,
        row_len: frame.row_len(),
    };
    match frame.format {
        PixelFormat::Nv12 => vec![
            luma,
            Plane {
                offset: stride * height,
                rows: height.div_ceil(2),
                row_len: (frame.width as usize).next_multiple_of(2),
            },
        ],
        _ => vec![luma],
    }
}

/// Pack `frame` into a contiguous, top-down buffer.
pub fn pack_frame(frame: &CapturedFrame) -> Result<PackedFrame, MirrorError> {
    let stride = frame.stride as usize;
    if frame.width == 0 || frame.height == 0 {
        return Err(MirrorError::Capture(format!(
            "empty frame {}x{}",
            frame.width, frame.height
        )));
    }

    let planes = planes(frame);
    if planes.iter().any(|p| p.row_len > stride) {
        return Err(MirrorError::Capture(format!(
            "stride {stride} shorter than row of {} bytes",
            frame.row_len()
        )));
    }

    let packed_len: usize = planes.iter().map(|p| p.rows * p.row_len).sum();
    let mut out = BytesMut::with_capacity(packed_len);

    for plane in &planes {
        let needed = plane.offset + (plane.rows - 1) * stride + plane.row_len;
        if frame.data.len() < needed {
            return Err(MirrorError::Capture(format!(
                "buffer of {} bytes too short for {}x{} {} (needs {needed})",
                frame.data.len(),
                frame.width,
                frame.height,
                frame.format,
            )));
        }

        for row in 0..plane.rows {
            let src_row = if frame.y_inverted {
                plane.rows - 1 - row
            } else {
                row
            };
            let start = plane.offset + src_row * stride;
            out.extend_from_slice(&frame.data[start..start + plane.row_len]);
        }
    }

    Ok(PackedFrame {
        width: frame.width,
        height: frame.height,
        format: frame.format,
        data: out.freeze(),
        pts: frame.pts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::time::Duration;

    /// 2x3 XRGB frame with 4 bytes of padding per row; each pixel byte
    /// holds its row number.
    fn padded_frame(y_inverted: bool) -> CapturedFrame {
        let width = 2;
        let height = 3;
        let stride = width * 4 + 4;
        let mut data = Vec::new();
        for y in 0..height {
            data.extend(std::iter::repeat_n(y as u8, (width * 4) as usize));
            data.extend([0xee; 4]);
        }
        CapturedFrame {
            width,
            height,
            stride,
            format: PixelFormat::Xrgb8888,
            y_inverted,
            data: Bytes::from(data),
            pts: Duration::from_millis(40),
        }
    }

    #[test]
    fn padding_is_dropped() {
        let packed = pack_frame(&padded_frame(false)).unwrap();
        assert_eq!(packed.data.len(), 2 * 3 * 4);
        assert!(!packed.data.contains(&0xee));
        assert_eq!(&packed.data[..8], &[0; 8]);
        assert_eq!(&packed.data[16..], &[2; 8]);
        assert_eq!(packed.pts, Duration::from_millis(40));
    }

    #[test]
    fn inverted_frame_is_flipped() {
        let packed = pack_frame(&padded_frame(true)).unwrap();
        assert_eq!(&packed.data[..8], &[2; 8]);
        assert_eq!(&packed.data[8..16], &[1; 8]);
        assert_eq!(&packed.data[16..], &[0; 8]);
    }

    #[test]
    fn short_buffer_is_rejected() {
        let mut frame = padded_frame(false);
        frame.data = frame.data.slice(..20);
        assert!(matches!(pack_frame(&frame), Err(MirrorError::Capture(_))));
    }

    #[test]
    fn narrow_stride_is_rejected() {
        let mut frame = padded_frame(false);
        frame.stride = 4;
        assert!(pack_frame(&frame).is_err());
    }

    #[test]
    fn nv12_packs_both_planes() {
        // 4x2 luma with stride 6, then one chroma row.
        let mut data = vec![1u8; 6 * 2];
        data.extend(vec![9u8; 6]);
        let frame = CapturedFrame {
            width: 4,
            height: 2,
            stride: 6,
            format: PixelFormat::Nv12,
            y_inverted: false,
            data: Bytes::from(data),
            pts: Duration::ZERO,
        };
        let packed = pack_frame(&frame).unwrap();
        assert_eq!(packed.data.len(), 4 * 2 + 4);
        assert_eq!(&packed.data[8..], &[9; 4]);
    }
}
