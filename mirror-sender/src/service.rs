//! Sender service: wires configuration, input and destinations into a
//! mirroring session and runs it to completion.

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::io::AsyncRead;
use tracing::{error, info, warn};

use mirror_core::{MirrorError, MirrorSession, SessionHandshake, SessionStats};

use crate::config::SenderConfig;
use crate::destinations::open_destinations;
use crate::replay::{ReplayClock, ReplayEncoder, spawn_reader, stop_reader};

/// Access units buffered between the reader task and the session.
const QUEUE_DEPTH: usize = 64;

type Input = Pin<Box<dyn AsyncRead + Send>>;

// ── SenderService ────────────────────────────────────────────────

pub struct SenderService {
    config: SenderConfig,
    running: Arc<AtomicBool>,
}

impl SenderService {
    pub fn new(config: SenderConfig) -> Self {
        Self {
            config,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Clearing the flag ends the session after the current frame.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Run one session until the input ends or a stop is requested.
    ///
    /// Configuration problems (missing capabilities blob, unreadable
    /// input, no reachable destination) fail before anything is sent.
    pub async fn run(&self) -> Result<SessionStats, MirrorError> {
        self.running.store(true, Ordering::SeqCst);
        let capture = &self.config.capture;
        info!(
            output = capture.output,
            cursor = capture.cursor,
            vaapi = %capture.vaapi_device,
            "capture settings"
        );

        let handshake =
            SessionHandshake::from_file(self.config.identity(), &self.config.handshake.plist)
                .await?;
        let input = self.open_input().await?;
        let sinks = open_destinations(&self.config).await?;

        let (units, reader) = spawn_reader(input, QUEUE_DEPTH);
        let session = MirrorSession::new(
            ReplayClock::new(),
            ReplayEncoder::new(units),
            sinks,
            handshake,
            self.config.to_session_config(),
        )?
        .with_stop_handle(Arc::clone(&self.running));

        let outcome = session.run().await;
        self.running.store(false, Ordering::SeqCst);

        let read = stop_reader(reader).await;

        match (outcome, read) {
            (Ok(stats), Ok(queued)) => {
                info!(?queued, "sender finished");
                Ok(stats)
            }
            (Ok(_), Err(e)) => {
                error!("input error: {e}");
                Err(e)
            }
            (Err(e), read) => {
                if let Err(read_err) = read {
                    warn!("input error after session failure: {read_err}");
                }
                Err(e)
            }
        }
    }

    async fn open_input(&self) -> Result<Input, MirrorError> {
        let input = self.config.stream.input.as_str();
        if input == "-" {
            info!("reading H.264 from stdin");
            return Ok(Box::pin(tokio::io::stdin()));
        }
        let file = tokio::fs::File::open(input)
            .await
            .map_err(|e| MirrorError::Configuration(format!("cannot open input {input}: {e}")))?;
        info!(input, "reading H.264 from file");
        Ok(Box::pin(file))
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replay::tests::elementary_stream;
    use mirror_core::handshake::parse_request_envelope;
    use mirror_core::{MirrorCodec, PayloadType};
    use tokio_util::codec::Decoder;

    fn config_in(dir: &tempfile::TempDir) -> SenderConfig {
        let plist = dir.path().join("caps.bplist");
        std::fs::write(&plist, b"bplist00\xd1\x01\x02").unwrap();
        let input = dir.path().join("input.h264");
        std::fs::write(&input, elementary_stream()).unwrap();

        let mut config = SenderConfig::default();
        config.handshake.plist = plist;
        config.stream.input = input.display().to_string();
        config.stream.file = dir.path().join("out.bin").display().to_string();
        config.stream.fps = 100;
        config
    }

    #[tokio::test]
    async fn replays_file_into_recording() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir);
        let recording = config.recording_path().unwrap().to_path_buf();

        let stats = SenderService::new(config).run().await.unwrap();
        assert_eq!(stats.access_units, 3);
        assert_eq!(stats.config_records, 1);

        let written = std::fs::read(&recording).unwrap();
        let (head, body) = parse_request_envelope(&written).unwrap();
        let mut buf = bytes::BytesMut::from(&written[head + body..]);
        let mut codec = MirrorCodec::new();
        let mut kinds = Vec::new();
        while let Some(msg) = codec.decode(&mut buf).unwrap() {
            kinds.push(msg.kind());
        }
        assert_eq!(
            kinds,
            vec![
                PayloadType::Heartbeat,
                PayloadType::VideoConfig,
                PayloadType::VideoData,
                PayloadType::VideoData,
                PayloadType::VideoData,
            ]
        );
    }

    #[tokio::test]
    async fn missing_capabilities_fail_before_streaming() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(&dir);
        config.handshake.plist = dir.path().join("absent.bplist");
        let recording = config.recording_path().unwrap().to_path_buf();

        let err = SenderService::new(config).run().await.unwrap_err();
        assert!(err.is_configuration());
        assert!(!recording.exists());
    }

    #[tokio::test]
    async fn missing_input_is_a_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(&dir);
        config.stream.input = dir.path().join("absent.h264").display().to_string();

        let err = SenderService::new(config).run().await.unwrap_err();
        assert!(err.is_configuration());
    }
}
