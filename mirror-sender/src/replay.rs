//! Replay collaborators: stream a pre-encoded H.264 elementary stream
//! through a mirroring session.
//!
//! A reader task splits the Annex B input into NAL units, groups them
//! into access units and queues them. [`ReplayEncoder`] hands one queued
//! access unit to the session per cycle; [`ReplayClock`] stands in for
//! screen capture and simply ticks once per cycle. The session's pacer
//! therefore sets the replay rate.
//!
//! Input may use 3- or 4-byte start codes. Access units are re-emitted
//! with 4-byte start codes only.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use futures::StreamExt;
use tokio::io::AsyncRead;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::task::JoinHandle;
use tokio_util::codec::{Decoder, FramedRead};
use tracing::{debug, trace, warn};

use mirror_core::{
    CapturedFrame, EncodedOutput, FrameSource, MirrorError, NalKind, PackedFrame, PixelFormat,
    VideoEncoder,
};

const START_CODE: [u8; 4] = [0, 0, 0, 1];

// ── NAL splitting ────────────────────────────────────────────────

/// Position of the next `00 00 01` at or after `from`: `(start, end)`.
fn find_code(buf: &[u8], from: usize) -> Option<(usize, usize)> {
    buf.get(from..)?
        .windows(3)
        .position(|w| w == [0, 0, 1])
        .map(|p| (from + p, from + p + 3))
}

/// Drop trailing zero bytes (the leading zero of a following 4-byte
/// start code, or stuffing).
fn trim_trailing_zeros(unit: Bytes) -> Bytes {
    let len = unit.iter().rposition(|&b| b != 0).map_or(0, |p| p + 1);
    unit.slice(..len)
}

/// Splits an Annex B byte stream into NAL units without start codes.
#[derive(Debug, Default)]
pub struct NalUnitCodec;

impl Decoder for NalUnitCodec {
    type Item = Bytes;
    type Error = MirrorError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>, MirrorError> {
        loop {
            let Some((_, first_end)) = find_code(src, 0) else {
                // Keep a possible partial start code, drop the rest.
                if src.len() > 2 {
                    src.advance(src.len() - 2);
                }
                return Ok(None);
            };
            let Some((next_start, _)) = find_code(src, first_end) else {
                return Ok(None);
            };

            src.advance(first_end);
            let unit = trim_trailing_zeros(src.split_to(next_start - first_end).freeze());
            if !unit.is_empty() {
                return Ok(Some(unit));
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>, MirrorError> {
        if let Some(unit) = self.decode(src)? {
            return Ok(Some(unit));
        }
        let Some((_, end)) = find_code(src, 0) else {
            src.clear();
            return Ok(None);
        };
        src.advance(end);
        let unit = trim_trailing_zeros(src.split().freeze());
        Ok((!unit.is_empty()).then_some(unit))
    }
}

// ── Access units ─────────────────────────────────────────────────

/// NAL units of one picture, plus the parameter sets that took effect
/// just before it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessUnit {
    pub parameter_sets: Option<Bytes>,
    pub nals: Vec<Bytes>,
}

impl AccessUnit {
    /// The unit in Annex B form with 4-byte start codes.
    pub fn to_annex_b(&self) -> BytesMut {
        let len = self.nals.iter().map(|n| START_CODE.len() + n.len()).sum();
        let mut out = BytesMut::with_capacity(len);
        for nal in &self.nals {
            out.put_slice(&START_CODE);
            out.put_slice(nal);
        }
        out
    }

    pub fn is_keyframe(&self) -> bool {
        self.nals.iter().any(|n| NalKind::of(n) == Some(NalKind::Idr))
    }
}

/// `first_mb_in_slice == 0`: the leading ue(v) bit of the slice header
/// is set.
fn starts_picture(nal: &[u8]) -> bool {
    nal.get(1).is_some_and(|b| b & 0x80 != 0)
}

/// Groups NAL units into access units.
///
/// The first SPS and PPS form the parameter-set blob. Repeats are
/// dropped; a different SPS or PPS starts a new blob, attached to the
/// access unit holding the next picture. Units arriving before any
/// complete pair are discarded.
#[derive(Debug, Default)]
pub struct AccessUnitAssembler {
    current: AccessUnit,
    has_vcl: bool,
    sps: Option<Bytes>,
    pps: Option<Bytes>,
    /// A pair not yet attached to an access unit.
    fresh: bool,
    discarded: u64,
}

impl AccessUnitAssembler {
    /// Feed one NAL unit. Returns the previous access unit when `nal`
    /// begins a new one.
    pub fn push(&mut self, nal: Bytes) -> Option<AccessUnit> {
        let kind = NalKind::of(&nal)?;
        let begins_unit = match kind {
            NalKind::Sps | NalKind::Pps | NalKind::Sei | NalKind::AccessUnitDelimiter => true,
            k if k.is_vcl() => starts_picture(&nal),
            _ => false,
        };
        let done = if self.has_vcl && begins_unit {
            self.flush()
        } else {
            None
        };

        match kind {
            NalKind::Sps => self.on_sps(nal),
            NalKind::Pps => self.on_pps(nal),
            _ if self.pps.is_none() => {
                self.discarded += 1;
                trace!(%kind, "no parameter sets yet, discarding");
            }
            _ => {
                // The pair belongs to the first picture after it, even when
                // an AUD or SEI opened the unit before the pair arrived.
                if kind.is_vcl() && self.fresh {
                    self.current.parameter_sets = self.blob();
                    self.fresh = false;
                }
                self.has_vcl |= kind.is_vcl();
                self.current.nals.push(nal);
            }
        }
        done
    }

    /// Return whatever is left at end of input.
    pub fn finish(&mut self) -> Option<AccessUnit> {
        self.flush()
    }

    /// NAL units dropped because no parameter sets had been seen.
    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    fn flush(&mut self) -> Option<AccessUnit> {
        self.has_vcl = false;
        if self.current.nals.is_empty() {
            return None;
        }
        Some(std::mem::take(&mut self.current))
    }

    fn on_sps(&mut self, nal: Bytes) {
        if self.sps.as_ref() == Some(&nal) {
            trace!("repeated SPS dropped");
            return;
        }
        if self.sps.is_some() {
            debug!("SPS changed, new codec configuration follows");
        }
        self.sps = Some(nal);
        self.pps = None;
        self.fresh = false;
    }

    fn on_pps(&mut self, nal: Bytes) {
        if self.sps.is_none() {
            self.discarded += 1;
            warn!("PPS before any SPS, discarding");
            return;
        }
        if self.pps.as_ref() == Some(&nal) {
            trace!("repeated PPS dropped");
            return;
        }
        self.pps = Some(nal);
        self.fresh = true;
    }

    fn blob(&self) -> Option<Bytes> {
        let (sps, pps) = (self.sps.as_ref()?, self.pps.as_ref()?);
        let mut out = BytesMut::with_capacity(8 + sps.len() + pps.len());
        out.put_slice(&START_CODE);
        out.put_slice(sps);
        out.put_slice(&START_CODE);
        out.put_slice(pps);
        Some(out.freeze())
    }
}

// ── Reader task ──────────────────────────────────────────────────

/// Read `input` to the end on a background task, queueing access units.
///
/// The task returns how many units it queued. It stops early, without
/// error, once the receiver is dropped.
pub fn spawn_reader<R>(
    input: R,
    capacity: usize,
) -> (mpsc::Receiver<AccessUnit>, JoinHandle<Result<u64, MirrorError>>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let handle = tokio::spawn(async move {
        let mut nals = FramedRead::new(input, NalUnitCodec);
        let mut assembler = AccessUnitAssembler::default();
        let mut queued = 0u64;

        while let Some(nal) = nals.next().await {
            if let Some(unit) = assembler.push(nal?) {
                if tx.send(unit).await.is_err() {
                    return Ok(queued);
                }
                queued += 1;
            }
        }
        if let Some(unit) = assembler.finish() {
            if tx.send(unit).await.is_ok() {
                queued += 1;
            }
        }
        debug!(
            access_units = queued,
            discarded = assembler.discarded(),
            "input exhausted"
        );
        Ok(queued)
    });
    (rx, handle)
}

/// Stop the reader task and collect its result.
///
/// Called once the session is over. A reader still blocked on input
/// that will never come is cancelled and yields `None`.
pub async fn stop_reader(
    reader: JoinHandle<Result<u64, MirrorError>>,
) -> Result<Option<u64>, MirrorError> {
    reader.abort();
    match reader.await {
        Ok(result) => result.map(Some),
        Err(e) if e.is_cancelled() => {
            debug!("reader cancelled while waiting for input");
            Ok(None)
        }
        Err(e) => Err(MirrorError::Other(format!("reader task failed: {e}"))),
    }
}

// ── Collaborators ────────────────────────────────────────────────

/// Hands queued access units to the session, one per cycle.
pub struct ReplayEncoder {
    units: mpsc::Receiver<AccessUnit>,
    starved: u64,
}

impl ReplayEncoder {
    pub fn new(units: mpsc::Receiver<AccessUnit>) -> Self {
        Self { units, starved: 0 }
    }

    /// Cycles on which no access unit was ready yet.
    pub fn starved(&self) -> u64 {
        self.starved
    }
}

impl VideoEncoder for ReplayEncoder {
    fn encode(&mut self, _frame: &PackedFrame) -> Result<EncodedOutput, MirrorError> {
        match self.units.try_recv() {
            Ok(unit) => Ok(EncodedOutput {
                parameter_sets: unit.parameter_sets.clone(),
                units: vec![unit.to_annex_b()],
            }),
            Err(TryRecvError::Empty) => {
                self.starved += 1;
                trace!("input not ready");
                Ok(EncodedOutput::default())
            }
            Err(TryRecvError::Disconnected) => Err(MirrorError::EndOfStream),
        }
    }

    fn name(&self) -> &str {
        "replay"
    }
}

/// Frame clock: yields a small blank frame every time it is asked.
pub struct ReplayClock {
    started: Instant,
    blank: Bytes,
}

impl ReplayClock {
    const SIDE: u32 = 16;

    pub fn new() -> Self {
        let len = (Self::SIDE * Self::SIDE * 4) as usize;
        Self {
            started: Instant::now(),
            blank: Bytes::from(vec![0u8; len]),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

impl Default for ReplayClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FrameSource for ReplayClock {
    async fn next_frame(&mut self) -> Result<CapturedFrame, MirrorError> {
        Ok(CapturedFrame {
            width: Self::SIDE,
            height: Self::SIDE,
            stride: Self::SIDE * 4,
            format: PixelFormat::Xrgb8888,
            y_inverted: false,
            data: self.blank.clone(),
            pts: self.elapsed(),
        })
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const SPS: [u8; 5] = [0x67, 0x42, 0x00, 0x1e, 0x95];
    pub(crate) const PPS: [u8; 3] = [0x68, 0xce, 0x3c];
    /// IDR slice, first_mb_in_slice = 0.
    pub(crate) const IDR: [u8; 3] = [0x65, 0x88, 0x84];
    /// Non-IDR slice, first_mb_in_slice = 0.
    pub(crate) const P: [u8; 3] = [0x41, 0x9a, 0x02];

    /// Elementary stream in the style x264 writes: 4-byte codes for
    /// parameter sets, 3-byte codes inside pictures.
    pub(crate) fn elementary_stream() -> Vec<u8> {
        let mut out = Vec::new();
        for (code, nal) in [
            (&[0u8, 0, 0, 1][..], &SPS[..]),
            (&[0, 0, 0, 1], &PPS),
            (&[0, 0, 1], &[0x06, 0x05, 0x01, 0x80]),
            (&[0, 0, 1], &IDR),
            (&[0, 0, 0, 1], &P),
            (&[0, 0, 0, 1], &P),
        ] {
            out.extend_from_slice(code);
            out.extend_from_slice(nal);
        }
        out
    }

    fn split(data: &[u8]) -> Vec<Bytes> {
        let mut codec = NalUnitCodec;
        let mut buf = BytesMut::from(data);
        let mut out = Vec::new();
        while let Some(nal) = codec.decode_eof(&mut buf).unwrap() {
            out.push(nal);
        }
        out
    }

    #[test]
    fn splits_on_three_and_four_byte_codes() {
        let nals = split(&elementary_stream());
        assert_eq!(nals.len(), 6);
        assert_eq!(nals[0].as_ref(), &SPS);
        assert_eq!(nals[1].as_ref(), &PPS);
        assert_eq!(nals[3].as_ref(), &IDR);
        assert_eq!(nals[5].as_ref(), &P);
    }

    #[test]
    fn incomplete_unit_waits_for_more_input() {
        let mut codec = NalUnitCodec;
        let mut buf = BytesMut::from(&[0u8, 0, 0, 1, 0x67, 0x42][..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        assert_eq!(buf.len(), 6);
    }

    #[test]
    fn leading_garbage_is_skipped() {
        let nals = split(&[0xaa, 0xbb, 0xcc, 0, 0, 1, 0x41, 0x9a]);
        assert_eq!(nals, vec![Bytes::from_static(&[0x41, 0x9a])]);
    }

    #[test]
    fn groups_pictures_and_attaches_parameters_once() {
        let mut asm = AccessUnitAssembler::default();
        let mut units: Vec<AccessUnit> = split(&elementary_stream())
            .into_iter()
            .filter_map(|nal| asm.push(nal))
            .collect();
        units.extend(asm.finish());

        assert_eq!(units.len(), 3);
        assert!(units[0].is_keyframe());
        assert_eq!(units[0].nals.len(), 2, "SEI belongs to the IDR picture");
        let blob = units[0].parameter_sets.as_ref().unwrap();
        assert_eq!(&blob[4..9], &SPS);
        assert!(units[1].parameter_sets.is_none());
        assert_eq!(units[2].to_annex_b().as_ref(), &[0, 0, 0, 1, 0x41, 0x9a, 0x02]);
    }

    #[test]
    fn second_slice_of_a_picture_stays_together() {
        let mut asm = AccessUnitAssembler::default();
        asm.push(Bytes::from_static(&SPS));
        asm.push(Bytes::from_static(&PPS));
        assert!(asm.push(Bytes::from_static(&IDR)).is_none());
        // first_mb_in_slice != 0
        assert!(asm.push(Bytes::from_static(&[0x65, 0x08, 0x44])).is_none());
        let unit = asm.finish().unwrap();
        assert_eq!(unit.nals.len(), 2);
    }

    #[test]
    fn repeated_parameters_are_dropped_and_changes_rearm() {
        let mut asm = AccessUnitAssembler::default();
        for nal in [&SPS[..], &PPS, &IDR, &SPS, &PPS, &IDR] {
            asm.push(Bytes::copy_from_slice(nal));
        }
        let second = asm.finish().unwrap();
        assert!(second.parameter_sets.is_none());

        let changed_sps = [0x67, 0x64, 0x00, 0x28, 0xac];
        for nal in [&changed_sps[..], &PPS, &IDR] {
            asm.push(Bytes::copy_from_slice(nal));
        }
        let third = asm.finish().unwrap();
        let blob = third.parameter_sets.unwrap();
        assert_eq!(&blob[4..9], &changed_sps);
    }

    #[test]
    fn changed_parameters_ride_on_the_picture_after_a_delimiter() {
        const AUD: [u8; 2] = [0x09, 0xf0];
        let high_sps = [0x67, 0x64, 0x00, 0x28, 0xac];
        let stream: [&[u8]; 14] = [
            &AUD, &SPS, &PPS, &IDR, //
            &AUD, &P, //
            &AUD, &high_sps, &PPS, &IDR, //
            &AUD, &P, //
            &AUD, &P,
        ];

        let mut asm = AccessUnitAssembler::default();
        let mut units: Vec<AccessUnit> = stream
            .iter()
            .filter_map(|nal| asm.push(Bytes::copy_from_slice(nal)))
            .collect();
        units.extend(asm.finish());

        assert_eq!(units.len(), 5);
        let profiles: Vec<Option<u8>> = units
            .iter()
            .map(|u| u.parameter_sets.as_ref().map(|blob| blob[5]))
            .collect();
        assert_eq!(profiles, vec![Some(0x42), None, Some(0x64), None, None]);
        assert!(units[2].is_keyframe());
        assert_eq!(units[2].nals[0].as_ref(), &AUD);
    }

    #[test]
    fn pictures_before_parameters_are_discarded() {
        let mut asm = AccessUnitAssembler::default();
        assert!(asm.push(Bytes::from_static(&P)).is_none());
        assert!(asm.finish().is_none());
        assert_eq!(asm.discarded(), 1);
    }

    #[tokio::test]
    async fn encoder_drains_queue_then_ends() {
        let reader = tokio_test::io::Builder::new()
            .read(&elementary_stream())
            .build();
        let (rx, handle) = spawn_reader(reader, 4);
        assert_eq!(handle.await.unwrap().unwrap(), 3);

        let mut encoder = ReplayEncoder::new(rx);
        let mut clock = ReplayClock::new();
        let frame = mirror_core::pack_frame(&clock.next_frame().await.unwrap()).unwrap();

        let first = encoder.encode(&frame).unwrap();
        assert!(first.parameter_sets.is_some());
        assert_eq!(first.units.len(), 1);
        encoder.encode(&frame).unwrap();
        encoder.encode(&frame).unwrap();
        assert!(matches!(
            encoder.encode(&frame),
            Err(MirrorError::EndOfStream)
        ));
    }

    #[tokio::test]
    async fn stalled_reader_is_cancelled() {
        // Writer half stays open: the reader waits forever.
        let (_writer, reader) = tokio::io::duplex(64);
        let (rx, handle) = spawn_reader(reader, 4);
        drop(rx);

        let stopped = tokio::time::timeout(Duration::from_secs(1), stop_reader(handle))
            .await
            .expect("stop_reader must not wait for input");
        assert_eq!(stopped.unwrap(), None);
    }

    #[tokio::test]
    async fn finished_reader_keeps_its_count() {
        let reader = tokio_test::io::Builder::new()
            .read(&elementary_stream())
            .build();
        let (mut rx, handle) = spawn_reader(reader, 4);
        for _ in 0..3 {
            rx.recv().await.unwrap();
        }
        assert!(rx.recv().await.is_none());
        assert_eq!(stop_reader(handle).await.unwrap(), Some(3));
    }

    #[tokio::test]
    async fn empty_queue_yields_nothing() {
        let (_tx, rx) = mpsc::channel::<AccessUnit>(1);
        let mut encoder = ReplayEncoder::new(rx);
        let frame = mirror_core::pack_frame(&ReplayClock::new().next_frame().await.unwrap())
            .unwrap();
        assert!(encoder.encode(&frame).unwrap().is_empty());
        assert_eq!(encoder.starved(), 1);
    }
}
