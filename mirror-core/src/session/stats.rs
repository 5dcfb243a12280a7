//! Session counters.

use std::fmt;

/// Running totals for one session. Returned when the session ends.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Frames taken from the source.
    pub frames: u64,
    /// Access units emitted as `VIDEO_DATA`.
    pub access_units: u64,
    /// NAL units inside those access units.
    pub nal_units: u64,
    /// Codec configuration records emitted.
    pub config_records: u64,
    pub heartbeats: u64,
    /// Header and payload bytes broadcast, per destination.
    pub bytes_sent: u64,
    /// Access units dropped because they had no start code.
    pub malformed_units: u64,
    /// Frames the source dropped before the session took them.
    pub dropped_frames: u64,
    /// Cycles that ran past their frame interval.
    pub overruns: u64,
    /// Per-destination write failures across all broadcasts.
    pub sink_failures: u64,
    /// Failure count of each destination, in registration order. Filled
    /// in at teardown.
    pub destination_failures: Vec<(String, u64)>,
}

impl fmt::Display for SessionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} frames, {} units ({} NALs), {} configs, {} heartbeats, {} bytes, \
             {} malformed, {} dropped, {} overruns, {} sink failures",
            self.frames,
            self.access_units,
            self.nal_units,
            self.config_records,
            self.heartbeats,
            self.bytes_sent,
            self.malformed_units,
            self.dropped_frames,
            self.overruns,
            self.sink_failures,
        )
    }
}
