//! Frame pacing.
//!
//! At the end of each cycle the pacer sleeps for whatever is left of the
//! frame interval, measured from the moment the cycle's frame became
//! ready. Late cycles are not made up for, and a remainder at or above
//! the sanity ceiling is treated as a clock anomaly and skipped.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, trace};

use crate::error::MirrorError;

/// Default target rate.
pub const DEFAULT_FPS: u32 = 20;

/// Longest sleep the pacer will ever perform.
pub const SLEEP_CEILING: Duration = Duration::from_secs(1);

/// How a cycle ended with respect to its deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaceOutcome {
    /// Slept for the remainder of the interval.
    Slept(Duration),
    /// The cycle took at least the whole interval.
    Overrun(Duration),
    /// The computed remainder was implausibly large; no sleep.
    Anomalous(Duration),
}

/// Remaining sleep for a cycle that took `elapsed`, if any.
///
/// Only a remainder strictly between zero and `ceiling` yields a sleep.
pub fn remaining(interval: Duration, elapsed: Duration, ceiling: Duration) -> Option<Duration> {
    interval
        .checked_sub(elapsed)
        .filter(|left| !left.is_zero() && *left < ceiling)
}

#[derive(Debug, Clone)]
pub struct FramePacer {
    interval: Duration,
    ceiling: Duration,
    cycle_start: Option<Instant>,
    overruns: u64,
}

impl FramePacer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            ceiling: SLEEP_CEILING,
            cycle_start: None,
            overruns: 0,
        }
    }

    /// Pacer targeting `fps` frames per second.
    pub fn from_fps(fps: u32) -> Result<Self, MirrorError> {
        if fps == 0 {
            return Err(MirrorError::Configuration(
                "frame rate must be at least 1".to_string(),
            ));
        }
        Ok(Self::new(Duration::from_secs(1) / fps))
    }

    pub fn with_ceiling(mut self, ceiling: Duration) -> Self {
        self.ceiling = ceiling;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Cycles that ran past their interval.
    pub fn overruns(&self) -> u64 {
        self.overruns
    }

    /// Mark the start of a cycle (the moment its frame became ready).
    pub fn begin_cycle(&mut self) -> Instant {
        let now = Instant::now();
        self.cycle_start = Some(now);
        now
    }

    /// Classify a cycle that took `elapsed`.
    pub fn plan(&self, elapsed: Duration) -> PaceOutcome {
        match remaining(self.interval, elapsed, self.ceiling) {
            Some(left) => PaceOutcome::Slept(left),
            None if elapsed >= self.interval => PaceOutcome::Overrun(elapsed - self.interval),
            None => PaceOutcome::Anomalous(self.interval - elapsed),
        }
    }

    /// Sleep off the rest of the current cycle.
    pub async fn pace(&mut self) -> PaceOutcome {
        let elapsed = self
            .cycle_start
            .take()
            .map_or(Duration::ZERO, |start| start.elapsed());

        let outcome = self.plan(elapsed);
        match outcome {
            PaceOutcome::Slept(left) => {
                trace!(?left, "pacing");
                tokio::time::sleep(left).await;
            }
            PaceOutcome::Overrun(late) => {
                self.overruns += 1;
                debug!(?late, "cycle overran frame interval");
            }
            PaceOutcome::Anomalous(left) => {
                debug!(?left, "skipping implausible pacing sleep");
            }
        }
        outcome
    }
}

impl Default for FramePacer {
    fn default() -> Self {
        Self::new(Duration::from_secs(1) / DEFAULT_FPS)
    }
}
