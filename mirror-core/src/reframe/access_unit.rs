//! In-place access-unit reframing.
//!
//! Each 4-byte start code is overwritten with the big-endian length of
//! the NAL unit that follows it. The buffer never grows; bytes before
//! the first start code are excluded from the payload.

use bytes::{Bytes, BytesMut};

use crate::error::MirrorError;
use crate::reframe::start_code::{StartCode, StartCodes};

/// An access unit rewritten to length-prefixed form.
#[derive(Debug, Clone)]
pub struct ReframedUnit {
    buf: BytesMut,
    first_unit: usize,
    nal_count: usize,
}

impl ReframedUnit {
    /// Offset of the first length prefix in the original buffer.
    pub fn first_unit_offset(&self) -> usize {
        self.first_unit
    }

    /// Number of NAL units in the payload.
    pub fn nal_count(&self) -> usize {
        self.nal_count
    }

    /// The whole rewritten buffer, including any leading bytes.
    pub fn buffer(&self) -> &[u8] {
        &self.buf
    }

    /// The bytes to send: everything from the first length prefix on.
    pub fn payload(&self) -> &[u8] {
        &self.buf[self.first_unit..]
    }

    pub fn payload_len(&self) -> usize {
        self.buf.len() - self.first_unit
    }

    /// Consume the unit and return only the payload.
    pub fn into_payload(mut self) -> Bytes {
        self.buf.split_off(self.first_unit).freeze()
    }
}

/// Rewrite every start code in `raw` into a 4-byte big-endian length.
///
/// A unit ends where the next start code begins, or at the end of the
/// buffer. Returns [`MirrorError::NoStartCode`] when `raw` holds no
/// start code at all.
pub fn rewrite_access_unit(raw: impl Into<BytesMut>) -> Result<ReframedUnit, MirrorError> {
    let mut buf: BytesMut = raw.into();
    let codes: Vec<StartCode> = StartCodes::new(&buf).collect();

    let Some(first) = codes.first() else {
        return Err(MirrorError::NoStartCode { len: buf.len() });
    };
    let first_unit = first.start;

    for (i, code) in codes.iter().enumerate() {
        let unit_end = codes.get(i + 1).map_or(buf.len(), |next| next.start);
        let nal_len = u32::try_from(unit_end - code.end).map_err(|_| {
            MirrorError::PayloadTooLarge {
                size: unit_end - code.end,
                max: u32::MAX as usize,
            }
        })?;
        buf[code.start..code.end].copy_from_slice(&nal_len.to_be_bytes());
    }

    Ok(ReframedUnit {
        buf,
        first_unit,
        nal_count: codes.len(),
    })
}

/// Iterator over the NAL units of a length-prefixed payload.
///
/// Stops at the first truncated unit.
pub struct LengthPrefixedUnits<'a> {
    data: &'a [u8],
}

impl<'a> LengthPrefixedUnits<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    /// Whether the whole payload was consumed without truncation.
    pub fn is_exhausted(&self) -> bool {
        self.data.is_empty()
    }
}

impl<'a> Iterator for LengthPrefixedUnits<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<&'a [u8]> {
        let (prefix, rest) = self.data.split_first_chunk::<4>()?;
        let len = u32::from_be_bytes(*prefix) as usize;
        if rest.len() < len {
            return None;
        }
        let (unit, rest) = rest.split_at(len);
        self.data = rest;
        Some(unit)
    }
}
