//! Opening the configured destinations.

use std::path::Path;

use tokio::net::TcpStream;
use tracing::{info, warn};

use mirror_core::{Destination, MirrorError, SinkSet};

use crate::config::SenderConfig;

/// A receiver address split into host and port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    /// Parse `host`, `host:port`, `[v6]`, `[v6]:port` or a bare IPv6
    /// address.
    pub fn parse(spec: &str, default_port: u16) -> Result<Self, MirrorError> {
        let spec = spec.trim();
        if spec.is_empty() {
            return Err(MirrorError::Configuration("empty destination".into()));
        }

        let (host, port) = if let Some(rest) = spec.strip_prefix('[') {
            let (host, tail) = rest.split_once(']').ok_or_else(|| {
                MirrorError::Configuration(format!("unterminated IPv6 address: {spec}"))
            })?;
            match tail.strip_prefix(':') {
                Some(port) => (host, Some(port)),
                None if tail.is_empty() => (host, None),
                None => {
                    return Err(MirrorError::Configuration(format!(
                        "unexpected text after address: {spec}"
                    )));
                }
            }
        } else {
            match spec.split_once(':') {
                Some((host, port)) if !port.contains(':') => (host, Some(port)),
                // More than one colon: a bare IPv6 address.
                Some(_) => (spec, None),
                None => (spec, None),
            }
        };

        let port = match port {
            Some(p) => p.parse::<u16>().map_err(|_| {
                MirrorError::Configuration(format!("invalid port in destination {spec}"))
            })?,
            None => default_port,
        };
        Ok(Self {
            host: host.to_string(),
            port,
        })
    }

    pub fn address(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

/// Connect to one receiver.
pub async fn connect(endpoint: &Endpoint, config: &SenderConfig) -> Result<Destination, MirrorError> {
    let address = endpoint.address();
    let stream = tokio::time::timeout(config.connect_timeout(), TcpStream::connect(&address))
        .await
        .map_err(|_| {
            MirrorError::Transport(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                format!("connect to {address} timed out"),
            ))
        })??;
    Destination::socket(stream)
}

/// Create (truncate) the recording file.
pub async fn create_recording(path: &Path) -> Result<Destination, MirrorError> {
    let file = tokio::fs::File::create(path).await.map_err(|e| {
        MirrorError::Configuration(format!("cannot create {}: {e}", path.display()))
    })?;
    Ok(Destination::file(file, path))
}

/// Open every configured destination, in order: receivers, then the
/// recording file, then stdout.
///
/// An unreachable receiver is logged and skipped. Bad addresses, an
/// uncreatable file or an empty result are errors.
pub async fn open_destinations(config: &SenderConfig) -> Result<SinkSet, MirrorError> {
    let mut sinks = SinkSet::new();

    for spec in &config.network.destinations {
        let endpoint = Endpoint::parse(spec, config.network.default_port)?;
        match connect(&endpoint, config).await {
            Ok(dest) => {
                info!(receiver = %endpoint.address(), "connected");
                sinks.register(dest)?;
            }
            Err(e) => warn!(receiver = %endpoint.address(), "skipping receiver: {e}"),
        }
    }

    if let Some(path) = config.recording_path() {
        sinks.register(create_recording(path).await?)?;
        info!(path = %path.display(), "recording");
    }

    if config.stream.stdout {
        sinks.register(Destination::stdout())?;
    }

    if sinks.is_empty() {
        return Err(MirrorError::NoSinks);
    }
    Ok(sinks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mirror_core::DestinationKind;
    use tokio::net::TcpListener;

    #[test]
    fn parses_host_and_port_forms() {
        assert_eq!(
            Endpoint::parse("192.168.1.20", 7100).unwrap(),
            Endpoint {
                host: "192.168.1.20".into(),
                port: 7100
            }
        );
        assert_eq!(Endpoint::parse("tv.local:7000", 7100).unwrap().port, 7000);
        assert_eq!(Endpoint::parse("[fe80::1]:7001", 7100).unwrap().host, "fe80::1");
        assert_eq!(Endpoint::parse("fe80::1", 7100).unwrap().port, 7100);
        assert_eq!(Endpoint::parse("[::1]", 7100).unwrap().address(), "[::1]:7100");
    }

    #[test]
    fn rejects_bad_destinations() {
        assert!(Endpoint::parse("", 7100).is_err());
        assert!(Endpoint::parse("host:notaport", 7100).is_err());
        assert!(Endpoint::parse("host:70000", 7100).is_err());
        assert!(Endpoint::parse("[::1", 7100).is_err());
        assert!(Endpoint::parse("[::1]x", 7100).unwrap_err().is_configuration());
    }

    #[tokio::test]
    async fn opens_receiver_and_recording_in_order() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let recording = dir.path().join("mirror.bin");

        let mut config = SenderConfig::default();
        config.network.destinations = vec![addr.to_string()];
        config.stream.file = recording.display().to_string();

        let sinks = open_destinations(&config).await.unwrap();
        assert_eq!(sinks.len(), 2);
        assert_eq!(sinks.destinations()[0].kind(), DestinationKind::Socket);
        assert_eq!(sinks.destinations()[1].kind(), DestinationKind::File);
        assert!(recording.exists());
    }

    #[tokio::test]
    async fn nothing_reachable_is_an_error() {
        // Bind then drop so the port is very likely closed.
        let addr = TcpListener::bind("127.0.0.1:0")
            .await
            .unwrap()
            .local_addr()
            .unwrap();
        let mut config = SenderConfig::default();
        config.network.destinations = vec![addr.to_string()];

        let err = open_destinations(&config).await.unwrap_err();
        assert!(matches!(err, MirrorError::NoSinks));
    }
}
