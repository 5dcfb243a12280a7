//! Outgoing throughput over a rolling window.
//!
//! Records `(when, bytes)` for every broadcast and derives bytes per
//! second over the most recent window. Used for the periodic stats line.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

pub struct ThroughputMeter {
    samples: VecDeque<(Instant, u64)>,
    window: Duration,
    /// Bytes currently inside the window.
    window_bytes: u64,
    /// Bytes since creation.
    total_bytes: u64,
}

impl ThroughputMeter {
    /// Meter with a 1-second window.
    pub fn new() -> Self {
        Self::with_window(Duration::from_secs(1))
    }

    pub fn with_window(window: Duration) -> Self {
        Self {
            samples: VecDeque::with_capacity(128),
            window,
            window_bytes: 0,
            total_bytes: 0,
        }
    }

    pub fn record(&mut self, bytes: u64) {
        self.record_at(Instant::now(), bytes);
    }

    pub fn record_at(&mut self, when: Instant, bytes: u64) {
        self.samples.push_back((when, bytes));
        self.window_bytes += bytes;
        self.total_bytes += bytes;
        self.evict(when);
    }

    /// Bytes per second across the samples still in the window.
    pub fn bytes_per_sec(&self) -> u64 {
        let (Some((first, _)), Some((last, _))) = (self.samples.front(), self.samples.back())
        else {
            return 0;
        };
        let span = last.duration_since(*first).max(Duration::from_millis(1));
        (self.window_bytes as f64 / span.as_secs_f64()) as u64
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    fn evict(&mut self, now: Instant) {
        while let Some(&(ts, bytes)) = self.samples.front() {
            if now.duration_since(ts) <= self.window {
                break;
            }
            self.samples.pop_front();
            self.window_bytes = self.window_bytes.saturating_sub(bytes);
        }
    }
}

impl Default for ThroughputMeter {
    fn default() -> Self {
        Self::new()
    }
}
