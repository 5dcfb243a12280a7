//! Encoder collaborator interface.
//!
//! The session does not encode anything itself. An implementation turns
//! packed frames into Annex B access units and reports its out-of-band
//! parameter sets whenever it (re)initializes.

use bytes::{Bytes, BytesMut};

use crate::capture::PackedFrame;
use crate::error::MirrorError;

/// What one `encode` call produced.
#[derive(Debug, Clone, Default)]
pub struct EncodedOutput {
    /// Annex B SPS + PPS blob. Present on the first call after the
    /// encoder (re)initialized, `None` otherwise.
    pub parameter_sets: Option<Bytes>,
    /// Zero or more Annex B access units, in decode order.
    pub units: Vec<BytesMut>,
}

impl EncodedOutput {
    pub fn is_empty(&self) -> bool {
        self.parameter_sets.is_none() && self.units.is_empty()
    }
}

/// A blocking video encoder.
pub trait VideoEncoder: Send {
    /// Feed one frame and collect every unit ready so far.
    fn encode(&mut self, frame: &PackedFrame) -> Result<EncodedOutput, MirrorError>;

    /// Short name for logging.
    fn name(&self) -> &str {
        "encoder"
    }
}
