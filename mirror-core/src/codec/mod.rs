//! `tokio_util` codec for mirroring messages (header plus payload).
//!
//! The sender writes headers and payloads straight to the sink set;
//! this codec is the reading side, used to inspect recorded streams
//! and to verify what a session emitted.

use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::MirrorError;
use crate::header::{HEADER_SIZE, MirrorHeader, PayloadType};

/// Default ceiling on a single decoded payload.
pub const DEFAULT_MAX_PAYLOAD: usize = 64 * 1024 * 1024;

/// One message: a parsed header and its payload.
#[derive(Debug, Clone, PartialEq)]
pub struct MirrorMessage {
    pub header: MirrorHeader,
    pub payload: Bytes,
}

impl MirrorMessage {
    pub fn kind(&self) -> PayloadType {
        self.header.payload_type
    }
}

/// Length-delimited by the header's `payload_size` field.
#[derive(Debug, Clone)]
pub struct MirrorCodec {
    max_payload: usize,
}

impl MirrorCodec {
    pub fn new() -> Self {
        Self::with_max_payload(DEFAULT_MAX_PAYLOAD)
    }

    pub fn with_max_payload(max_payload: usize) -> Self {
        Self { max_payload }
    }
}

impl Default for MirrorCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for MirrorCodec {
    type Item = MirrorMessage;
    type Error = MirrorError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < HEADER_SIZE {
            return Ok(None);
        }

        let header = MirrorHeader::from_bytes(&src[..HEADER_SIZE])?;
        let payload_len = header.payload_size as usize;
        if payload_len > self.max_payload {
            return Err(MirrorError::PayloadTooLarge {
                size: payload_len,
                max: self.max_payload,
            });
        }

        if src.len() < HEADER_SIZE + payload_len {
            src.reserve(HEADER_SIZE + payload_len - src.len());
            return Ok(None);
        }

        src.advance(HEADER_SIZE);
        let payload = src.split_to(payload_len).freeze();
        Ok(Some(MirrorMessage { header, payload }))
    }
}

impl Encoder<MirrorMessage> for MirrorCodec {
    type Error = MirrorError;

    fn encode(&mut self, item: MirrorMessage, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if item.payload.len() != item.header.payload_size as usize {
            return Err(MirrorError::InvalidHeader(
                "payload size field does not match payload",
            ));
        }
        dst.reserve(HEADER_SIZE + item.payload.len());
        dst.extend_from_slice(&item.header.to_bytes());
        dst.extend_from_slice(&item.payload);
        Ok(())
    }
}
