//! Fan-out delivery to every registered destination.
//!
//! Destinations are registered once at startup, then the set is sealed
//! and every broadcast writes the same bytes to each destination in
//! registration order. A failing destination is counted and logged but
//! does not stop delivery to the others.

use std::fmt;
use std::path::Path;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, warn};

use crate::error::MirrorError;

/// Upper bound on registered destinations.
pub const MAX_DESTINATIONS: usize = 255;

type BoxedWriter = Box<dyn AsyncWrite + Unpin + Send>;

// ── Destination ──────────────────────────────────────────────────

/// What a destination writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestinationKind {
    /// A connected mirroring receiver.
    Socket,
    /// A recording on disk.
    File,
    /// Pass-through on standard output.
    Stdout,
    /// Anything else implementing `AsyncWrite`.
    Stream,
}

impl fmt::Display for DestinationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DestinationKind::Socket => write!(f, "socket"),
            DestinationKind::File => write!(f, "file"),
            DestinationKind::Stdout => write!(f, "stdout"),
            DestinationKind::Stream => write!(f, "stream"),
        }
    }
}

/// One output of the fan-out.
pub struct Destination {
    label: String,
    kind: DestinationKind,
    writer: BoxedWriter,
    bytes_written: u64,
    failures: u64,
}

impl Destination {
    pub fn new<W>(label: impl Into<String>, kind: DestinationKind, writer: W) -> Self
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        Self {
            label: label.into(),
            kind,
            writer: Box::new(writer),
            bytes_written: 0,
            failures: 0,
        }
    }

    /// Wrap a connected receiver socket. Nagle is disabled so small
    /// headers go out without waiting for the payload.
    pub fn socket(stream: TcpStream) -> Result<Self, MirrorError> {
        stream.set_nodelay(true)?;
        let label = match stream.peer_addr() {
            Ok(addr) => addr.to_string(),
            Err(_) => "socket".to_string(),
        };
        Ok(Self::new(label, DestinationKind::Socket, stream))
    }

    pub fn file(file: tokio::fs::File, path: &Path) -> Self {
        Self::new(path.display().to_string(), DestinationKind::File, file)
    }

    pub fn stdout() -> Self {
        Self::new("stdout", DestinationKind::Stdout, tokio::io::stdout())
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn kind(&self) -> DestinationKind {
        self.kind
    }

    /// Bytes successfully delivered so far.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Broadcasts that failed on this destination.
    pub fn failures(&self) -> u64 {
        self.failures
    }

    async fn deliver(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.writer.write_all(bytes).await?;
        self.writer.flush().await
    }
}

impl fmt::Debug for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Destination")
            .field("label", &self.label)
            .field("kind", &self.kind)
            .field("bytes_written", &self.bytes_written)
            .field("failures", &self.failures)
            .finish()
    }
}

// ── BroadcastReport ──────────────────────────────────────────────

/// Outcome of one broadcast.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Destinations that received every byte.
    pub delivered: usize,
    /// Labels of the destinations that failed.
    pub failed: Vec<String>,
}

impl BroadcastReport {
    pub fn failure_count(&self) -> usize {
        self.failed.len()
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

// ── SinkSet ──────────────────────────────────────────────────────

/// Ordered, bounded set of destinations.
#[derive(Debug)]
pub struct SinkSet {
    destinations: Vec<Destination>,
    capacity: usize,
    sealed: bool,
}

impl SinkSet {
    /// A set holding up to [`MAX_DESTINATIONS`] destinations.
    pub fn new() -> Self {
        Self::with_capacity(MAX_DESTINATIONS)
    }

    /// A set holding up to `capacity` destinations (never more than
    /// [`MAX_DESTINATIONS`]).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.min(MAX_DESTINATIONS);
        Self {
            destinations: Vec::with_capacity(capacity),
            capacity,
            sealed: false,
        }
    }

    /// Append a destination. Fails once the set is full or sealed.
    pub fn register(&mut self, destination: Destination) -> Result<(), MirrorError> {
        if self.sealed {
            return Err(MirrorError::SinksSealed);
        }
        if self.destinations.len() >= self.capacity {
            return Err(MirrorError::SinkCapacity { max: self.capacity });
        }
        debug!(
            label = destination.label(),
            kind = %destination.kind(),
            "destination registered"
        );
        self.destinations.push(destination);
        Ok(())
    }

    /// Freeze membership. Requires at least one destination.
    pub fn seal(&mut self) -> Result<(), MirrorError> {
        if self.destinations.is_empty() {
            return Err(MirrorError::NoSinks);
        }
        self.sealed = true;
        Ok(())
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn len(&self) -> usize {
        self.destinations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.destinations.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn destinations(&self) -> &[Destination] {
        &self.destinations
    }

    /// Total failed writes across all destinations.
    pub fn total_failures(&self) -> u64 {
        self.destinations.iter().map(|d| d.failures).sum()
    }

    /// Write `bytes` to every destination, in order.
    ///
    /// Seals the set on first use. Returns an error only when no
    /// destination is registered or when every destination failed.
    pub async fn broadcast(&mut self, bytes: &[u8]) -> Result<BroadcastReport, MirrorError> {
        if !self.sealed {
            self.seal()?;
        }

        let mut report = BroadcastReport::default();
        for dest in &mut self.destinations {
            match dest.deliver(bytes).await {
                Ok(()) => {
                    dest.bytes_written += bytes.len() as u64;
                    report.delivered += 1;
                }
                Err(e) => {
                    dest.failures += 1;
                    if dest.failures == 1 {
                        warn!(label = dest.label(), kind = %dest.kind, "write failed: {e}");
                    } else {
                        debug!(
                            label = dest.label(),
                            failures = dest.failures,
                            "write failed again: {e}"
                        );
                    }
                    report.failed.push(dest.label.clone());
                }
            }
        }

        if report.delivered == 0 {
            return Err(MirrorError::AllSinksFailed {
                count: report.failed.len(),
            });
        }
        Ok(report)
    }

    /// Flush and close every destination. Returns how many failed to
    /// close cleanly.
    pub async fn shutdown(&mut self) -> usize {
        let mut failed = 0;
        for dest in &mut self.destinations {
            if let Err(e) = dest.writer.shutdown().await {
                debug!(label = dest.label(), "shutdown failed: {e}");
                failed += 1;
            }
        }
        failed
    }
}

impl Default for SinkSet {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io;
    use std::pin::Pin;
    use std::sync::{Arc, Mutex};
    use std::task::{Context, Poll};

    /// In-memory writer whose contents stay readable after it is boxed.
    #[derive(Clone, Default)]
    pub(crate) struct SharedBuf(pub Arc<Mutex<Vec<u8>>>);

    impl SharedBuf {
        pub(crate) fn contents(&self) -> Vec<u8> {
            self.0.lock().unwrap().clone()
        }
    }

    impl AsyncWrite for SharedBuf {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Poll::Ready(Ok(buf.len()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    /// Writer that fails every write, as a receiver that went away.
    pub(crate) struct FailingWriter;

    impl AsyncWrite for FailingWriter {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            Poll::Ready(Err(io::ErrorKind::BrokenPipe.into()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    fn broken_pipe() -> tokio_test::io::Mock {
        tokio_test::io::Builder::new()
            .write_error(io::Error::new(io::ErrorKind::BrokenPipe, "receiver gone"))
            .build()
    }

    #[tokio::test]
    async fn broadcast_reaches_every_destination_in_order() {
        let a = SharedBuf::default();
        let b = SharedBuf::default();
        let mut sinks = SinkSet::new();
        sinks
            .register(Destination::new("a", DestinationKind::Stream, a.clone()))
            .unwrap();
        sinks
            .register(Destination::new("b", DestinationKind::Stream, b.clone()))
            .unwrap();

        let report = sinks.broadcast(b"header").await.unwrap();
        sinks.broadcast(b"payload").await.unwrap();

        assert_eq!(report.delivered, 2);
        assert!(report.is_complete());
        assert_eq!(a.contents(), b"headerpayload");
        assert_eq!(b.contents(), b"headerpayload");
        assert_eq!(sinks.destinations()[0].bytes_written(), 13);
    }

    #[tokio::test]
    async fn one_failing_destination_does_not_block_the_rest() {
        let good = SharedBuf::default();
        let mut sinks = SinkSet::new();
        sinks
            .register(Destination::new("bad", DestinationKind::Socket, broken_pipe()))
            .unwrap();
        sinks
            .register(Destination::new("good", DestinationKind::File, good.clone()))
            .unwrap();

        let report = sinks.broadcast(&[7u8; 300]).await.unwrap();

        assert_eq!(report.delivered, 1);
        assert_eq!(report.failure_count(), 1);
        assert_eq!(report.failed, vec!["bad".to_string()]);
        assert_eq!(good.contents(), vec![7u8; 300]);
        assert_eq!(sinks.total_failures(), 1);
        assert_eq!(sinks.destinations()[0].failures(), 1);
    }

    #[tokio::test]
    async fn all_destinations_failing_is_an_error() {
        let mut sinks = SinkSet::new();
        sinks
            .register(Destination::new("bad", DestinationKind::Socket, broken_pipe()))
            .unwrap();

        let err = sinks.broadcast(b"x").await.unwrap_err();
        assert!(matches!(err, MirrorError::AllSinksFailed { count: 1 }));
    }

    #[tokio::test]
    async fn broadcast_without_destinations_fails() {
        let mut sinks = SinkSet::new();
        let err = sinks.broadcast(b"x").await.unwrap_err();
        assert!(matches!(err, MirrorError::NoSinks));
    }

    #[test]
    fn capacity_is_enforced_at_register() {
        let mut sinks = SinkSet::with_capacity(2);
        for i in 0..2 {
            sinks
                .register(Destination::new(
                    format!("d{i}"),
                    DestinationKind::Stream,
                    SharedBuf::default(),
                ))
                .unwrap();
        }
        let err = sinks
            .register(Destination::new("d2", DestinationKind::Stream, SharedBuf::default()))
            .unwrap_err();
        assert!(matches!(err, MirrorError::SinkCapacity { max: 2 }));
        assert!(err.is_configuration());
    }

    #[test]
    fn capacity_never_exceeds_protocol_limit() {
        assert_eq!(SinkSet::with_capacity(1000).capacity(), MAX_DESTINATIONS);
    }

    #[test]
    fn sealed_set_rejects_new_destinations() {
        let mut sinks = SinkSet::new();
        sinks
            .register(Destination::new("a", DestinationKind::Stream, SharedBuf::default()))
            .unwrap();
        sinks.seal().unwrap();
        let err = sinks
            .register(Destination::new("b", DestinationKind::Stream, SharedBuf::default()))
            .unwrap_err();
        assert!(matches!(err, MirrorError::SinksSealed));
    }

    #[test]
    fn sealing_empty_set_fails() {
        assert!(matches!(SinkSet::new().seal(), Err(MirrorError::NoSinks)));
    }

    #[tokio::test]
    async fn shutdown_closes_everything() {
        let mut sinks = SinkSet::new();
        sinks
            .register(Destination::new("a", DestinationKind::Stream, SharedBuf::default()))
            .unwrap();
        assert_eq!(sinks.shutdown().await, 0);
    }
}
