//! Domain-specific error types for the mirroring bridge.
//!
//! All fallible operations return `Result<T, MirrorError>`.
//! Only the top-level binary decides whether an error ends the process.

use thiserror::Error;

/// The canonical error type for the mirroring bridge.
#[derive(Debug, Error)]
pub enum MirrorError {
    // ── Configuration Errors ─────────────────────────────────────
    /// The parameter-set blob carries more than one SPS/PPS pair.
    #[error("unexpected extra parameter set at offset {offset}: multi parameter-set streams are unsupported")]
    ExtraParameterSet { offset: usize },

    /// The parameter-set blob does not contain both an SPS and a PPS.
    #[error("parameter-set blob holds {found} unit(s), expected SPS and PPS")]
    MissingParameterSet { found: usize },

    /// A parameter set is too short or too long to be framed.
    #[error("invalid parameter set: {0}")]
    InvalidParameterSet(&'static str),

    /// More destinations were registered than the sink set allows.
    #[error("too many destinations: capacity is {max}")]
    SinkCapacity { max: usize },

    /// Streaming was requested with no destination registered.
    #[error("no destination registered")]
    NoSinks,

    /// Destinations cannot change once streaming has begun.
    #[error("sink set is sealed: destinations cannot change while streaming")]
    SinksSealed,

    /// Any other startup configuration problem.
    #[error("configuration error: {0}")]
    Configuration(String),

    // ── Stream Errors ────────────────────────────────────────────
    /// An encoded access unit contained no start code at all.
    #[error("malformed access unit: no start code in {len} bytes")]
    NoStartCode { len: usize },

    /// A payload does not fit the 32-bit size field of the header.
    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// A received header could not be parsed.
    #[error("invalid header: {0}")]
    InvalidHeader(&'static str),

    /// A numeric value did not map to any known enum variant.
    #[error("unknown {type_name} discriminant: {value:#x}")]
    UnknownVariant { type_name: &'static str, value: u64 },

    // ── Transport Errors ─────────────────────────────────────────
    /// The underlying I/O layer reported an error.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// Every destination failed on the same broadcast.
    #[error("all {count} destination(s) failed")]
    AllSinksFailed { count: usize },

    // ── Collaborator Errors ──────────────────────────────────────
    /// The capture collaborator failed.
    #[error("capture error: {0}")]
    Capture(String),

    /// The encoder collaborator failed.
    #[error("encoder error: {0}")]
    Encoder(String),

    /// A collaborator reached the end of its input.
    #[error("end of stream")]
    EndOfStream,

    // ── Protocol Errors ──────────────────────────────────────────
    /// The session loop attempted an invalid phase transition.
    #[error("protocol violation: {0}")]
    ProtocolViolation(&'static str),

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

impl MirrorError {
    /// Whether the error prevents a session from starting at all.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::ExtraParameterSet { .. }
                | Self::MissingParameterSet { .. }
                | Self::InvalidParameterSet(_)
                | Self::SinkCapacity { .. }
                | Self::NoSinks
                | Self::SinksSealed
                | Self::Configuration(_)
        )
    }
}

// ── Convenient From implementations ──────────────────────────────

impl From<String> for MirrorError {
    fn from(s: String) -> Self {
        MirrorError::Other(s)
    }
}

impl From<&str> for MirrorError {
    fn from(s: &str) -> Self {
        MirrorError::Other(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let e = MirrorError::ExtraParameterSet { offset: 42 };
        assert!(e.to_string().contains("42"));

        let e = MirrorError::PayloadTooLarge {
            size: 1000,
            max: 500,
        };
        assert!(e.to_string().contains("1000"));
        assert!(e.to_string().contains("500"));
    }

    #[test]
    fn configuration_classification() {
        assert!(MirrorError::SinkCapacity { max: 255 }.is_configuration());
        assert!(MirrorError::MissingParameterSet { found: 1 }.is_configuration());
        assert!(!MirrorError::NoStartCode { len: 3 }.is_configuration());
        assert!(!MirrorError::EndOfStream.is_configuration());
    }

    #[test]
    fn from_string() {
        let e: MirrorError = "something broke".into();
        assert!(matches!(e, MirrorError::Other(_)));
    }

    #[test]
    fn from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broke");
        let e: MirrorError = io_err.into();
        assert!(matches!(e, MirrorError::Transport(_)));
    }
}
