//! The mirroring session loop.
//!
//! One session owns the frame source, the encoder, the sink set and the
//! pacer, and runs cycles until the source ends, a stop is requested or
//! a fatal error occurs. Teardown always runs before [`run`] returns.
//!
//! [`run`]: MirrorSession::run

pub mod pacer;
pub mod stats;
pub mod throughput;

pub use pacer::{DEFAULT_FPS, FramePacer, PaceOutcome, SLEEP_CEILING};
pub use stats::SessionStats;
pub use throughput::ThroughputMeter;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::{debug, error, info, trace, warn};

use crate::capture::{FrameSource, pack_frame};
use crate::encoder::VideoEncoder;
use crate::error::MirrorError;
use crate::handshake::SessionHandshake;
use crate::header::{MAX_PAYLOAD_SIZE, MirrorGeometry, PayloadType, build_header};
use crate::reframe::{CodecConfigRecord, ReframedUnit, extract_codec_config, rewrite_access_unit};
use crate::sink::SinkSet;
use crate::state::{CyclePhase, SessionPhase};

// ── SessionConfig ────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Target frames per second.
    pub fps: u32,
    pub geometry: MirrorGeometry,
    /// Send a keep-alive whenever this much time passed since the last
    /// one. `None` sends heartbeats only ahead of each config record.
    pub heartbeat_interval: Option<Duration>,
    /// How often the stats line is logged.
    pub stats_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            fps: DEFAULT_FPS,
            geometry: MirrorGeometry::default(),
            heartbeat_interval: None,
            stats_interval: Duration::from_secs(5),
        }
    }
}

// ── MirrorSession ────────────────────────────────────────────────

pub struct MirrorSession<S, E> {
    source: S,
    encoder: E,
    sinks: SinkSet,
    handshake: SessionHandshake,
    config: SessionConfig,
    pacer: FramePacer,
    phase: SessionPhase,
    cycle: CyclePhase,
    codec_config: Option<CodecConfigRecord>,
    /// Set when the encoder (re)initialized and the record has not been
    /// sent yet.
    config_pending: bool,
    last_heartbeat: Option<Instant>,
    stats: SessionStats,
    throughput: ThroughputMeter,
    last_report: Instant,
    running: Arc<AtomicBool>,
}

impl<S, E> MirrorSession<S, E>
where
    S: FrameSource,
    E: VideoEncoder,
{
    pub fn new(
        source: S,
        encoder: E,
        sinks: SinkSet,
        handshake: SessionHandshake,
        config: SessionConfig,
    ) -> Result<Self, MirrorError> {
        let pacer = FramePacer::from_fps(config.fps)?;
        Ok(Self {
            source,
            encoder,
            sinks,
            handshake,
            config,
            pacer,
            phase: SessionPhase::default(),
            cycle: CyclePhase::default(),
            codec_config: None,
            config_pending: false,
            last_heartbeat: None,
            stats: SessionStats::default(),
            throughput: ThroughputMeter::new(),
            last_report: Instant::now(),
            running: Arc::new(AtomicBool::new(true)),
        })
    }

    /// Clearing the flag stops the session before its next frame.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Share a flag owned by the caller instead.
    pub fn with_stop_handle(mut self, running: Arc<AtomicBool>) -> Self {
        self.running = running;
        self
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub fn phase(&self) -> &SessionPhase {
        &self.phase
    }

    /// Run to completion. End of the source is a clean finish.
    pub async fn run(mut self) -> Result<SessionStats, MirrorError> {
        let result = self.stream().await;
        self.teardown().await;

        match result {
            Ok(()) | Err(MirrorError::EndOfStream) => {
                info!(stats = %self.stats, "session finished");
                Ok(self.stats)
            }
            Err(e) => {
                error!(stats = %self.stats, "session failed: {e}");
                Err(e)
            }
        }
    }

    async fn stream(&mut self) -> Result<(), MirrorError> {
        self.phase.begin_handshake()?;
        self.sinks.seal()?;
        let report = self.handshake.send(&mut self.sinks).await?;
        self.stats.sink_failures += report.failure_count() as u64;

        self.phase.begin_streaming()?;
        info!(
            destinations = self.sinks.len(),
            fps = self.config.fps,
            encoder = self.encoder.name(),
            "streaming"
        );

        while self.running.load(Ordering::SeqCst) {
            self.run_cycle().await?;
        }
        info!("stop requested");
        Ok(())
    }

    async fn run_cycle(&mut self) -> Result<(), MirrorError> {
        let frame = self.source.next_frame().await?;
        self.pacer.begin_cycle();
        self.stats.frames += 1;
        self.stats.dropped_frames = self.source.dropped_frames();

        self.enter(CyclePhase::Convert)?;
        let packed = pack_frame(&frame)?;

        self.enter(CyclePhase::Encode)?;
        let output = self.encoder.encode(&packed)?;
        if let Some(blob) = output.parameter_sets {
            self.codec_config = Some(extract_codec_config(&blob)?);
            self.config_pending = true;
            debug!(encoder = self.encoder.name(), "encoder initialized");
        }

        let mut sent_data = false;
        for raw in output.units {
            if self.codec_config.is_none() {
                return Err(MirrorError::ProtocolViolation(
                    "access unit before codec configuration",
                ));
            }
            if self.config_pending {
                self.enter(CyclePhase::EmitConfig)?;
                self.emit_config().await?;
            }

            self.enter(CyclePhase::Reframe)?;
            let unit = match rewrite_access_unit(raw) {
                Ok(unit) => unit,
                Err(e @ MirrorError::NoStartCode { .. }) => {
                    warn!(frame = self.stats.frames, "dropping access unit: {e}");
                    self.stats.malformed_units += 1;
                    break;
                }
                Err(e) => return Err(e),
            };

            self.enter(CyclePhase::EmitData)?;
            if self.heartbeat_due() {
                self.emit_heartbeat().await?;
            }
            self.emit_data(unit).await?;
            sent_data = true;
        }

        self.enter(CyclePhase::PaceSleep)?;
        // Keep-alive on cycles that carried no video.
        if !sent_data && self.heartbeat_due() {
            self.emit_heartbeat().await?;
        }
        self.report_if_due();
        self.pacer.pace().await;
        self.stats.overruns = self.pacer.overruns();
        self.enter(CyclePhase::WaitFrame)
    }

    fn enter(&mut self, next: CyclePhase) -> Result<(), MirrorError> {
        self.cycle.advance(next)?;
        trace!(phase = %next, "cycle");
        Ok(())
    }

    // ── Emission ─────────────────────────────────────────────────

    async fn emit_config(&mut self) -> Result<(), MirrorError> {
        let record: Bytes = match &self.codec_config {
            Some(record) => record.to_bytes(),
            None => return Err(MirrorError::ProtocolViolation("no codec configuration")),
        };
        self.emit_heartbeat().await?;
        self.send_message(PayloadType::VideoConfig, &record).await?;
        self.stats.config_records += 1;
        self.config_pending = false;
        info!(len = record.len(), "codec configuration sent");
        Ok(())
    }

    async fn emit_heartbeat(&mut self) -> Result<(), MirrorError> {
        self.send_message(PayloadType::Heartbeat, &[]).await?;
        self.stats.heartbeats += 1;
        self.last_heartbeat = Some(Instant::now());
        Ok(())
    }

    async fn emit_data(&mut self, unit: ReframedUnit) -> Result<(), MirrorError> {
        self.send_message(PayloadType::VideoData, unit.payload()).await?;
        self.stats.access_units += 1;
        self.stats.nal_units += unit.nal_count() as u64;
        Ok(())
    }

    fn heartbeat_due(&self) -> bool {
        match self.config.heartbeat_interval {
            Some(interval) => self
                .last_heartbeat
                .is_none_or(|last| last.elapsed() >= interval),
            None => false,
        }
    }

    /// Header, then payload, to every destination.
    async fn send_message(&mut self, kind: PayloadType, payload: &[u8]) -> Result<(), MirrorError> {
        let size = u32::try_from(payload.len()).map_err(|_| MirrorError::PayloadTooLarge {
            size: payload.len(),
            max: MAX_PAYLOAD_SIZE,
        })?;
        let header = build_header(kind, size, &self.config.geometry);
        self.broadcast(&header).await?;
        if !payload.is_empty() {
            self.broadcast(payload).await?;
        }
        debug!(%kind, size, "message sent");
        Ok(())
    }

    async fn broadcast(&mut self, bytes: &[u8]) -> Result<(), MirrorError> {
        let report = self.sinks.broadcast(bytes).await?;
        self.stats.bytes_sent += bytes.len() as u64;
        self.stats.sink_failures += report.failure_count() as u64;
        self.throughput.record(bytes.len() as u64);
        Ok(())
    }

    fn report_if_due(&mut self) {
        if self.last_report.elapsed() < self.config.stats_interval {
            return;
        }
        self.last_report = Instant::now();
        info!(
            throughput_bps = self.throughput.bytes_per_sec(),
            stats = %self.stats,
            "session stats"
        );
    }

    // ── Teardown ─────────────────────────────────────────────────

    async fn teardown(&mut self) {
        if let Err(e) = self.phase.begin_teardown() {
            debug!("teardown from {}: {e}", self.phase);
        }
        self.cycle.reset();

        self.stats.destination_failures = self
            .sinks
            .destinations()
            .iter()
            .map(|dest| (dest.label().to_string(), dest.failures()))
            .collect();
        for (label, failures) in &self.stats.destination_failures {
            if *failures > 0 {
                warn!(destination = %label, failures, "destination had write failures");
            }
        }

        let failed = self.sinks.shutdown().await;
        if failed > 0 {
            warn!(failed, "some destinations did not close cleanly");
        }
        self.handshake.reset();
        self.stats.overruns = self.pacer.overruns();
        self.stats.dropped_frames = self.source.dropped_frames();

        if self.phase.finish_teardown().is_ok() {
            debug!(total_bytes = self.throughput.total_bytes(), "session closed");
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
