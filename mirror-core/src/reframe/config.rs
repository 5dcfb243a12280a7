//! Codec configuration record (AVCDecoderConfigurationRecord).
//!
//! Built once per encoder lifetime from the encoder's out-of-band
//! parameter-set blob, which must hold exactly one SPS followed by one
//! PPS, each behind a start code.
//!
//! ```text
//! version(1) = 0x01
//! profile(1) compatibility(1) level(1)      copied from SPS bytes 1..=3
//! 0xFF                                      reserved(6) | length size - 1 = 3
//! 0xE1                                      reserved(3) | SPS count = 1
//! sps_len(u16 BE) sps[..]
//! 0x01                                      PPS count
//! pps_len(u16 BE) pps[..]
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::MirrorError;
use crate::reframe::start_code::{StartCode, StartCodes};

const CONFIG_VERSION: u8 = 0x01;
/// NAL length prefixes are 4 bytes; the field stores `size - 1`.
const LENGTH_SIZE_BYTE: u8 = 0xFC | 0x03;
const SPS_COUNT_BYTE: u8 = 0xE0 | 0x01;
const PPS_COUNT: u8 = 0x01;

/// Fixed bytes around the two parameter sets.
const FRAMING_OVERHEAD: usize = 11;

/// One SPS/PPS pair in AVCC form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecConfigRecord {
    sps: Bytes,
    pps: Bytes,
}

impl CodecConfigRecord {
    /// Validate a parameter-set pair. The SPS must be long enough to
    /// carry profile, compatibility and level.
    pub fn new(sps: Bytes, pps: Bytes) -> Result<Self, MirrorError> {
        if sps.len() < 4 {
            return Err(MirrorError::InvalidParameterSet("SPS shorter than 4 bytes"));
        }
        if pps.is_empty() {
            return Err(MirrorError::InvalidParameterSet("empty PPS"));
        }
        if sps.len() > u16::MAX as usize || pps.len() > u16::MAX as usize {
            return Err(MirrorError::InvalidParameterSet(
                "parameter set longer than 65535 bytes",
            ));
        }
        Ok(Self { sps, pps })
    }

    pub fn profile(&self) -> u8 {
        self.sps[1]
    }

    pub fn compatibility(&self) -> u8 {
        self.sps[2]
    }

    pub fn level(&self) -> u8 {
        self.sps[3]
    }

    pub fn sps(&self) -> &[u8] {
        &self.sps
    }

    pub fn pps(&self) -> &[u8] {
        &self.pps
    }

    /// Encoded size of the record.
    pub fn encoded_len(&self) -> usize {
        FRAMING_OVERHEAD + self.sps.len() + self.pps.len()
    }

    /// Append the record to `dst`.
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(self.encoded_len());
        dst.put_u8(CONFIG_VERSION);
        dst.put_u8(self.profile());
        dst.put_u8(self.compatibility());
        dst.put_u8(self.level());
        dst.put_u8(LENGTH_SIZE_BYTE);
        dst.put_u8(SPS_COUNT_BYTE);
        dst.put_u16(self.sps.len() as u16);
        dst.put_slice(&self.sps);
        dst.put_u8(PPS_COUNT);
        dst.put_u16(self.pps.len() as u16);
        dst.put_slice(&self.pps);
    }

    /// The encoded record as a standalone buffer.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode(&mut buf);
        buf.freeze()
    }

    /// Read back a record produced by [`encode`](Self::encode).
    pub fn parse(mut data: &[u8]) -> Result<Self, MirrorError> {
        const TRUNCATED: MirrorError = MirrorError::InvalidParameterSet("truncated record");

        if data.remaining() < 6 {
            return Err(TRUNCATED);
        }
        if data.get_u8() != CONFIG_VERSION {
            return Err(MirrorError::InvalidParameterSet("unknown record version"));
        }
        data.advance(4);
        if data.get_u8() & 0x1f != 1 {
            return Err(MirrorError::InvalidParameterSet("expected exactly one SPS"));
        }
        let sps = take_prefixed(&mut data).ok_or(TRUNCATED)?;

        if data.remaining() < 1 || data.get_u8() != PPS_COUNT {
            return Err(MirrorError::InvalidParameterSet("expected exactly one PPS"));
        }
        let pps = take_prefixed(&mut data).ok_or(TRUNCATED)?;
        Self::new(sps, pps)
    }
}

fn take_prefixed(data: &mut &[u8]) -> Option<Bytes> {
    if data.remaining() < 2 {
        return None;
    }
    let len = data.get_u16() as usize;
    if data.remaining() < len {
        return None;
    }
    Some(data.copy_to_bytes(len))
}

/// Split an Annex B parameter-set blob into its SPS and PPS and build
/// the configuration record.
///
/// Fails with [`MirrorError::ExtraParameterSet`] when a third unit
/// follows the PPS. Nothing is produced unless the whole blob is valid.
pub fn extract_codec_config(blob: &[u8]) -> Result<CodecConfigRecord, MirrorError> {
    let mut codes = StartCodes::new(blob);
    let (sps_code, pps_code) = match (codes.next(), codes.next()) {
        (Some(sps), Some(pps)) => (sps, pps),
        (first, _) => {
            return Err(MirrorError::MissingParameterSet {
                found: first.is_some() as usize,
            });
        }
    };

    if let Some(StartCode { start, .. }) = codes.next() {
        return Err(MirrorError::ExtraParameterSet { offset: start });
    }

    let sps = Bytes::copy_from_slice(&blob[sps_code.end..pps_code.start]);
    let pps = Bytes::copy_from_slice(&blob[pps_code.end..]);
    CodecConfigRecord::new(sps, pps)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPS: [u8; 8] = [0x67, 0x42, 0x00, 0x1e, 0x95, 0xa8, 0x28, 0x0f];
    const PPS: [u8; 4] = [0x68, 0xce, 0x3c, 0x80];

    fn blob(units: &[&[u8]]) -> Vec<u8> {
        let mut out = Vec::new();
        for unit in units {
            out.extend_from_slice(&[0, 0, 0, 1]);
            out.extend_from_slice(unit);
        }
        out
    }

    #[test]
    fn builds_record_from_sps_and_pps() {
        let record = extract_codec_config(&blob(&[&SPS, &PPS])).unwrap();
        let bytes = record.to_bytes();

        assert_eq!(&bytes[..6], &[0x01, 0x42, 0x00, 0x1e, 0xff, 0xe1]);
        assert_eq!(&bytes[6..8], &(SPS.len() as u16).to_be_bytes());
        assert_eq!(&bytes[8..16], &SPS);
        assert_eq!(bytes[16], 0x01);
        assert_eq!(&bytes[17..19], &(PPS.len() as u16).to_be_bytes());
        assert_eq!(&bytes[19..], &PPS);
        assert_eq!(bytes.len(), record.encoded_len());
    }

    #[test]
    fn copies_profile_compatibility_level() {
        let sps = [0x67, 0x64, 0xc0, 0x28, 0xac];
        let record = extract_codec_config(&blob(&[&sps, &PPS])).unwrap();
        assert_eq!(record.profile(), 0x64);
        assert_eq!(record.compatibility(), 0xc0);
        assert_eq!(record.level(), 0x28);
    }

    #[test]
    fn leading_bytes_before_sps_are_ignored() {
        let mut data = vec![0xde, 0xad];
        data.extend(blob(&[&SPS, &PPS]));
        let record = extract_codec_config(&data).unwrap();
        assert_eq!(record.sps(), &SPS);
        assert_eq!(record.pps(), &PPS);
    }

    #[test]
    fn third_unit_is_rejected() {
        let data = blob(&[&SPS, &PPS, &[0x68, 0xee]]);
        let err = extract_codec_config(&data).unwrap_err();
        assert!(matches!(err, MirrorError::ExtraParameterSet { offset } if offset == 4 + SPS.len() + 4 + PPS.len()));
        assert!(err.is_configuration());
    }

    #[test]
    fn single_unit_is_rejected() {
        let err = extract_codec_config(&blob(&[&SPS])).unwrap_err();
        assert!(matches!(err, MirrorError::MissingParameterSet { found: 1 }));

        let err = extract_codec_config(&[0x67, 0x42]).unwrap_err();
        assert!(matches!(err, MirrorError::MissingParameterSet { found: 0 }));
    }

    #[test]
    fn truncated_sps_is_rejected() {
        let err = extract_codec_config(&blob(&[&[0x67, 0x42], &PPS])).unwrap_err();
        assert!(matches!(err, MirrorError::InvalidParameterSet(_)));
    }

    #[test]
    fn parse_reads_back_encoded_record() {
        let record = extract_codec_config(&blob(&[&SPS, &PPS])).unwrap();
        let parsed = CodecConfigRecord::parse(&record.to_bytes()).unwrap();
        assert_eq!(parsed, record);

        let bytes = record.to_bytes();
        assert!(CodecConfigRecord::parse(&bytes[..bytes.len() - 1]).is_err());
        assert!(CodecConfigRecord::parse(&[0x02, 0, 0, 0, 0xff, 0xe1]).is_err());
    }

    #[test]
    fn encode_appends_to_existing_buffer() {
        let record = extract_codec_config(&blob(&[&SPS, &PPS])).unwrap();
        let mut buf = BytesMut::from(&b"xy"[..]);
        record.encode(&mut buf);
        assert_eq!(&buf[..2], b"xy");
        assert_eq!(buf.len(), 2 + record.encoded_len());
    }
}
