//! Inspect mode: decode a recorded stream and print what it contains.

use std::fmt;
use std::io::Write;
use std::path::Path;

use futures::StreamExt;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio_util::codec::FramedRead;
use tracing::{debug, warn};

use mirror_core::handshake::parse_request_envelope;
use mirror_core::{
    CodecConfigRecord, LengthPrefixedUnits, MirrorCodec, MirrorError, MirrorMessage, NalKind,
    PayloadType,
};

/// Totals over one recording.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InspectSummary {
    /// Bytes of the stream request at the front, 0 if absent.
    pub envelope_bytes: usize,
    pub messages: u64,
    pub configs: u64,
    pub heartbeats: u64,
    pub data: u64,
    pub nal_units: u64,
    pub payload_bytes: u64,
    /// The recording ended inside a message.
    pub truncated: bool,
}

impl fmt::Display for InspectSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} messages: {} config, {} heartbeat, {} data ({} NAL units), {} payload bytes",
            self.messages,
            self.configs,
            self.heartbeats,
            self.data,
            self.nal_units,
            self.payload_bytes,
        )?;
        if self.truncated {
            write!(f, ", truncated")?;
        }
        Ok(())
    }
}

/// Open `path` and describe it to `out`.
pub async fn inspect_file<W: Write>(path: &Path, out: &mut W) -> Result<InspectSummary, MirrorError> {
    let file = tokio::fs::File::open(path).await.map_err(|e| {
        MirrorError::Configuration(format!("cannot open recording {}: {e}", path.display()))
    })?;
    inspect(BufReader::new(file), out).await
}

/// Describe a recorded stream, one line per message, then the summary.
pub async fn inspect<R, W>(mut reader: R, out: &mut W) -> Result<InspectSummary, MirrorError>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut summary = InspectSummary {
        envelope_bytes: skip_envelope(&mut reader).await?,
        ..InspectSummary::default()
    };
    if summary.envelope_bytes > 0 {
        writeln!(out, "stream request: {} bytes", summary.envelope_bytes)?;
    }

    let mut messages = FramedRead::new(reader, MirrorCodec::new());
    while let Some(message) = messages.next().await {
        let message = match message {
            Ok(message) => message,
            Err(e) => {
                warn!("recording ends early: {e}");
                summary.truncated = true;
                break;
            }
        };
        summary.messages += 1;
        summary.payload_bytes += message.payload.len() as u64;
        describe(summary.messages, &message, &mut summary, out)?;
    }

    writeln!(out, "{summary}")?;
    Ok(summary)
}

/// Skip a leading `POST /stream` request and its body, if present.
async fn skip_envelope<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<usize, MirrorError> {
    if !reader.fill_buf().await?.starts_with(b"POST ") {
        return Ok(0);
    }

    let mut head = Vec::new();
    while !head.ends_with(b"\r\n\r\n") {
        if reader.read_until(b'\n', &mut head).await? == 0 {
            return Err(MirrorError::ProtocolViolation("truncated stream request"));
        }
    }
    let (head_len, body_len) = parse_request_envelope(&head)
        .ok_or(MirrorError::ProtocolViolation("malformed stream request"))?;

    let skipped =
        tokio::io::copy(&mut (&mut *reader).take(body_len as u64), &mut tokio::io::sink()).await?;
    if skipped < body_len as u64 {
        return Err(MirrorError::ProtocolViolation("truncated stream request"));
    }
    debug!(head_len, body_len, "stream request skipped");
    Ok(head_len + body_len)
}

fn describe<W: Write>(
    index: u64,
    message: &MirrorMessage,
    summary: &mut InspectSummary,
    out: &mut W,
) -> Result<(), MirrorError> {
    let header = &message.header;
    write!(
        out,
        "#{index} {} size={} ts={}.{:06}",
        header.payload_type, header.payload_size, header.timestamp_seconds, header.timestamp_fraction
    )?;

    match header.payload_type {
        PayloadType::Heartbeat => summary.heartbeats += 1,
        PayloadType::VideoConfig => {
            summary.configs += 1;
            match CodecConfigRecord::parse(&message.payload) {
                Ok(record) => write!(
                    out,
                    " profile=0x{:02x} compat=0x{:02x} level=0x{:02x} sps={} pps={}",
                    record.profile(),
                    record.compatibility(),
                    record.level(),
                    record.sps().len(),
                    record.pps().len()
                )?,
                Err(e) => write!(out, " ({e})")?,
            }
        }
        PayloadType::VideoData => {
            summary.data += 1;
            let mut units = LengthPrefixedUnits::new(&message.payload);
            let kinds: Vec<String> = units
                .by_ref()
                .filter_map(NalKind::of)
                .map(|kind| kind.to_string())
                .collect();
            summary.nal_units += kinds.len() as u64;
            write!(out, " nals=[{}]", kinds.join(","))?;
            if !units.is_exhausted() {
                write!(out, " (truncated unit)")?;
            }
        }
    }
    writeln!(out)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;
    use mirror_core::handshake::request_envelope;
    use mirror_core::{
        ClientIdentity, MirrorGeometry, build_header, extract_codec_config, rewrite_access_unit,
    };

    fn recording() -> Vec<u8> {
        let geometry = MirrorGeometry::default();
        let body = b"bplist00";
        let mut out = request_envelope(&ClientIdentity::default(), body.len()).into_bytes();
        out.extend_from_slice(body);

        out.extend_from_slice(&build_header(PayloadType::Heartbeat, 0, &geometry));

        let blob = [
            0, 0, 0, 1, 0x67, 0x42, 0x00, 0x1e, 0x95, 0, 0, 0, 1, 0x68, 0xce, 0x3c,
        ];
        let record = extract_codec_config(&blob).unwrap().to_bytes();
        out.extend_from_slice(&build_header(
            PayloadType::VideoConfig,
            record.len() as u32,
            &geometry,
        ));
        out.extend_from_slice(&record);

        let unit = rewrite_access_unit(BytesMut::from(
            &[0, 0, 0, 1, 0x06, 0x05, 0x80, 0, 0, 0, 1, 0x65, 0x88][..],
        ))
        .unwrap();
        out.extend_from_slice(&build_header(
            PayloadType::VideoData,
            unit.payload_len() as u32,
            &geometry,
        ));
        out.extend_from_slice(unit.payload());
        out
    }

    #[tokio::test]
    async fn describes_every_message() {
        let data = recording();
        let mut out = Vec::new();
        let summary = inspect(&data[..], &mut out).await.unwrap();

        assert_eq!(summary.messages, 3);
        assert_eq!(summary.configs, 1);
        assert_eq!(summary.heartbeats, 1);
        assert_eq!(summary.nal_units, 2);
        assert!(summary.envelope_bytes > 8);
        assert!(!summary.truncated);

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("profile=0x42"));
        assert!(text.contains("#3 VIDEO_DATA"));
    }

    #[tokio::test]
    async fn stream_without_request_is_read_directly() {
        let data = recording();
        let (head, body) = parse_request_envelope(&data).unwrap();
        let mut out = Vec::new();
        let summary = inspect(&data[head + body..], &mut out).await.unwrap();
        assert_eq!(summary.envelope_bytes, 0);
        assert_eq!(summary.messages, 3);
    }

    #[tokio::test]
    async fn cut_recording_is_flagged() {
        let data = recording();
        let mut out = Vec::new();
        let summary = inspect(&data[..data.len() - 3], &mut out).await.unwrap();
        assert_eq!(summary.messages, 2);
        assert!(summary.truncated);
    }
}
