//! H.264 NAL unit header classification.
//!
//! The NAL header is one byte: `forbidden(1) | nal_ref_idc(2) | nal_type(5)`.

use std::fmt;

/// The NAL unit types the bridge cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NalKind {
    /// Coded slice of a non-IDR picture (1).
    Slice,
    /// Slice data partitions A, B, C (2..=4).
    Partition,
    /// Coded slice of an IDR picture (5).
    Idr,
    /// Supplemental enhancement information (6).
    Sei,
    /// Sequence parameter set (7).
    Sps,
    /// Picture parameter set (8).
    Pps,
    /// Access unit delimiter (9).
    AccessUnitDelimiter,
    /// Anything else.
    Other(u8),
}

impl NalKind {
    /// Classify the NAL unit whose first byte is `header`.
    pub const fn from_header(header: u8) -> Self {
        match header & 0x1f {
            1 => NalKind::Slice,
            2..=4 => NalKind::Partition,
            5 => NalKind::Idr,
            6 => NalKind::Sei,
            7 => NalKind::Sps,
            8 => NalKind::Pps,
            9 => NalKind::AccessUnitDelimiter,
            other => NalKind::Other(other),
        }
    }

    /// Classify a NAL unit, `None` if it is empty.
    pub fn of(unit: &[u8]) -> Option<Self> {
        unit.first().map(|&b| Self::from_header(b))
    }

    /// Whether this unit carries coded picture data.
    pub const fn is_vcl(self) -> bool {
        matches!(self, NalKind::Slice | NalKind::Partition | NalKind::Idr)
    }

    /// Whether this unit is an SPS or PPS.
    pub const fn is_parameter_set(self) -> bool {
        matches!(self, NalKind::Sps | NalKind::Pps)
    }
}

impl fmt::Display for NalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NalKind::Slice => write!(f, "slice"),
            NalKind::Partition => write!(f, "partition"),
            NalKind::Idr => write!(f, "idr"),
            NalKind::Sei => write!(f, "sei"),
            NalKind::Sps => write!(f, "sps"),
            NalKind::Pps => write!(f, "pps"),
            NalKind::AccessUnitDelimiter => write!(f, "aud"),
            NalKind::Other(t) => write!(f, "type-{t}"),
        }
    }
}
