//! Session handshake: the HTTP-style stream request sent once to every
//! destination before any mirroring message.
//!
//! The request is fire-and-forget. The receiver's reply is never read.

use std::path::Path;

use bytes::Bytes;
use tracing::{debug, info};

use crate::error::MirrorError;
use crate::sink::{BroadcastReport, SinkSet};

/// Default name of the capability blob next to the binary.
pub const DEFAULT_CAPABILITIES_FILE: &str = "stream-mirror.bplist";

/// Content type of the capability blob.
pub const CONTENT_TYPE: &str = "application/x-apple-binary-plist";

const REQUEST_LINE: &str = "POST /stream HTTP/1.1";

/// Client identity advertised in the request headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    pub user_agent: String,
    pub device_id: String,
    pub client_name: String,
    pub protocol_version: u32,
}

impl Default for ClientIdentity {
    fn default() -> Self {
        Self {
            user_agent: "wlroots-airplay/1.0.0".to_string(),
            device_id: "0x7B:DE:DB:1F:BB:AB".to_string(),
            client_name: "WLRootsAirplay".to_string(),
            protocol_version: 1,
        }
    }
}

/// Render the request line and headers for a body of `body_len` bytes.
pub fn request_envelope(identity: &ClientIdentity, body_len: usize) -> String {
    format!(
        "{REQUEST_LINE}\r\n\
         User-Agent: {}\r\n\
         X-Apple-Device-ID: {}\r\n\
         X-Apple-Client-Name: {}\r\n\
         X-Apple-ProtocolVersion: {}\r\n\
         Content-Type: {CONTENT_TYPE}\r\n\
         Content-Length: {body_len}\r\n\
         \r\n",
        identity.user_agent, identity.device_id, identity.client_name, identity.protocol_version,
    )
}

/// Locate a stream request at the front of `buf`.
///
/// Returns `(envelope_len, body_len)` when `buf` starts with a complete
/// request envelope, `None` otherwise. Used to skip the handshake when
/// reading a recorded stream.
pub fn parse_request_envelope(buf: &[u8]) -> Option<(usize, usize)> {
    if !buf.starts_with(b"POST ") {
        return None;
    }
    let end = buf.windows(4).position(|w| w == b"\r\n\r\n")? + 4;
    let head = std::str::from_utf8(&buf[..end]).ok()?;
    let body_len = head
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse().ok())
        .unwrap_or(0);
    Some((end, body_len))
}

/// Read the capability blob. A missing or empty file is a configuration
/// error.
pub async fn load_capabilities(path: &Path) -> Result<Bytes, MirrorError> {
    let data = tokio::fs::read(path).await.map_err(|e| {
        MirrorError::Configuration(format!(
            "cannot read capability blob {}: {e}",
            path.display()
        ))
    })?;
    if data.is_empty() {
        return Err(MirrorError::Configuration(format!(
            "capability blob {} is empty",
            path.display()
        )));
    }
    debug!(path = %path.display(), len = data.len(), "capability blob loaded");
    Ok(Bytes::from(data))
}

/// One-shot stream request.
#[derive(Debug, Clone)]
pub struct SessionHandshake {
    identity: ClientIdentity,
    capabilities: Bytes,
    sent: bool,
}

impl SessionHandshake {
    pub fn new(identity: ClientIdentity, capabilities: Bytes) -> Self {
        Self {
            identity,
            capabilities,
            sent: false,
        }
    }

    pub async fn from_file(identity: ClientIdentity, path: &Path) -> Result<Self, MirrorError> {
        Ok(Self::new(identity, load_capabilities(path).await?))
    }

    pub fn identity(&self) -> &ClientIdentity {
        &self.identity
    }

    pub fn capabilities(&self) -> &Bytes {
        &self.capabilities
    }

    pub fn is_sent(&self) -> bool {
        self.sent
    }

    /// Forget that the request went out, after the sinks are torn down.
    pub fn reset(&mut self) {
        self.sent = false;
    }

    /// Broadcast the envelope followed by the capability blob.
    pub async fn send(&mut self, sinks: &mut SinkSet) -> Result<BroadcastReport, MirrorError> {
        if self.sent {
            return Err(MirrorError::ProtocolViolation("stream request already sent"));
        }
        let envelope = request_envelope(&self.identity, self.capabilities.len());
        let mut report = sinks.broadcast(envelope.as_bytes()).await?;
        let body = sinks.broadcast(&self.capabilities).await?;
        report.failed.extend(body.failed);
        report.delivered = report.delivered.min(body.delivered);
        self.sent = true;

        info!(
            destinations = sinks.len(),
            body_len = self.capabilities.len(),
            "stream request sent"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::tests::SharedBuf;
    use crate::sink::{Destination, DestinationKind};

    #[test]
    fn envelope_is_byte_exact() {
        let text = request_envelope(&ClientIdentity::default(), 4);
        assert_eq!(
            text,
            "POST /stream HTTP/1.1\r\n\
             User-Agent: wlroots-airplay/1.0.0\r\n\
             X-Apple-Device-ID: 0x7B:DE:DB:1F:BB:AB\r\n\
             X-Apple-Client-Name: WLRootsAirplay\r\n\
             X-Apple-ProtocolVersion: 1\r\n\
             Content-Type: application/x-apple-binary-plist\r\n\
             Content-Length: 4\r\n\r\n"
        );
    }

    #[test]
    fn envelope_round_trips_through_parser() {
        let mut buf = request_envelope(&ClientIdentity::default(), 9).into_bytes();
        let head_len = buf.len();
        buf.extend_from_slice(b"bplist00x");
        assert_eq!(parse_request_envelope(&buf), Some((head_len, 9)));
    }

    #[test]
    fn parser_ignores_other_data() {
        assert_eq!(parse_request_envelope(&[0u8; 128]), None);
        assert_eq!(parse_request_envelope(b"POST /stream HTTP/1.1\r\n"), None);
    }

    #[tokio::test]
    async fn send_writes_envelope_then_body_once() {
        let out = SharedBuf::default();
        let mut sinks = SinkSet::new();
        sinks
            .register(Destination::new("rx", DestinationKind::Stream, out.clone()))
            .unwrap();

        let mut handshake =
            SessionHandshake::new(ClientIdentity::default(), Bytes::from_static(b"bplist00"));
        let report = handshake.send(&mut sinks).await.unwrap();
        assert!(report.is_complete());
        assert!(handshake.is_sent());

        let written = out.contents();
        let (head_len, body_len) = parse_request_envelope(&written).unwrap();
        assert_eq!(body_len, 8);
        assert_eq!(&written[head_len..], b"bplist00");

        let err = handshake.send(&mut sinks).await.unwrap_err();
        assert!(matches!(err, MirrorError::ProtocolViolation(_)));
    }

    #[tokio::test]
    async fn missing_blob_is_configuration_error() {
        let err = load_capabilities(Path::new("/nonexistent/stream-mirror.bplist"))
            .await
            .unwrap_err();
        assert!(err.is_configuration());
    }
}
