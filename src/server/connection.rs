//! Per-connection processing.
//!
//! Each accepted connection is driven by [`ConnectionHandler::handle`] in
//! its own task: read frame(s), parse, stamp a sequence number, deliver,
//! close. Failures are reported to the observability sink and end only
//! that connection.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use crate::protocol::{parse_variables, FrameLimits, FrameReader, RawFrame};
use crate::sink::{MessageSink, ObservabilitySink, ParsedMessage};

/// Monotonic message id source shared by every connection task.
///
/// Ids start at 1 and are only ever produced by an atomic increment.
#[derive(Debug, Clone, Default)]
pub struct SequenceCounter(Arc<AtomicU64>);

impl SequenceCounter {
    /// Create a counter whose first id is 1.
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the next id.
    pub fn next_id(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Last id handed out (0 if none).
    pub fn current(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// How many frames a connection may carry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionMode {
    /// Exactly one frame, then close.
    #[default]
    OneShot,
    /// Frames until the peer closes on a frame boundary.
    Stream,
}

/// Drives accepted connections through framing, parsing and delivery.
pub struct ConnectionHandler {
    limits: FrameLimits,
    mode: ConnectionMode,
    sequence: SequenceCounter,
    sink: Arc<dyn MessageSink>,
    observer: Arc<dyn ObservabilitySink>,
}

impl std::fmt::Debug for ConnectionHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandler")
            .field("limits", &self.limits)
            .field("mode", &self.mode)
            .field("sequence", &self.sequence.current())
            .finish_non_exhaustive()
    }
}

impl ConnectionHandler {
    /// Create a handler with a fresh sequence counter.
    pub fn new(
        limits: FrameLimits,
        mode: ConnectionMode,
        sink: Arc<dyn MessageSink>,
        observer: Arc<dyn ObservabilitySink>,
    ) -> Self {
        Self {
            limits,
            mode,
            sequence: SequenceCounter::new(),
            sink,
            observer,
        }
    }

    /// The counter ids are drawn from.
    pub fn sequence(&self) -> &SequenceCounter {
        &self.sequence
    }

    /// Process one connection to completion and close it.
    ///
    /// Returns the number of messages delivered. Framing failures are
    /// reported to the observer; nothing is written back to the peer.
    pub async fn handle<S>(&self, stream: S, peer: SocketAddr) -> usize
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut reader = FrameReader::new(stream, self.limits);
        let mut delivered = 0;

        loop {
            let next = match self.mode {
                ConnectionMode::OneShot => reader.read_frame().await.map(Some),
                ConnectionMode::Stream => reader.next_frame().await,
            };
            match next {
                Ok(Some(body)) => {
                    self.process(&body, peer);
                    delivered += 1;
                    if self.mode == ConnectionMode::OneShot {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    self.observer.report_connection_error(peer, &e);
                    break;
                }
            }
        }

        let mut stream = reader.into_inner();
        if let Err(e) = stream.shutdown().await {
            log::debug!("[Conn] Shutdown error for {peer}: {e}");
        }
        log::debug!("[Conn] Closed {peer} after {delivered} message(s)");
        delivered
    }

    /// Parse a body, assign its id and hand it to the sink.
    fn process(&self, body: &[u8], peer: SocketAddr) -> u64 {
        let frame = RawFrame::new(body, peer);
        let variables = parse_variables(&frame.text);
        let id = self.sequence.next_id();
        log::info!(
            "[Conn] Message #{id} from {peer}: {} variable(s), {} bytes",
            variables.len(),
            frame.size_bytes
        );
        self.sink.deliver(ParsedMessage::new(id, frame, variables));
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::encode_frame;
    use crate::status::ConnectionStatus;
    use crate::store::MessageStore;
    use std::time::Duration;

    struct Harness {
        store: Arc<MessageStore>,
        status: Arc<ConnectionStatus>,
        handler: ConnectionHandler,
    }

    fn harness(mode: ConnectionMode) -> Harness {
        let store = Arc::new(MessageStore::new(100));
        let status = Arc::new(ConnectionStatus::new());
        let limits = FrameLimits {
            max_body_size: 1024,
            read_timeout: Some(Duration::from_secs(5)),
        };
        let handler = ConnectionHandler::new(
            limits,
            mode,
            Arc::clone(&store) as Arc<dyn MessageSink>,
            Arc::clone(&status) as Arc<dyn ObservabilitySink>,
        );
        Harness { store, status, handler }
    }

    fn peer() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    #[test]
    fn test_sequence_starts_at_one() {
        let seq = SequenceCounter::new();
        assert_eq!(seq.current(), 0);
        assert_eq!(seq.next_id(), 1);
        assert_eq!(seq.clone().next_id(), 2);
        assert_eq!(seq.current(), 2);
    }

    #[tokio::test]
    async fn test_valid_frame_is_parsed_and_delivered() {
        let h = harness(ConnectionMode::OneShot);
        let (mut client, server) = tokio::io::duplex(4096);
        let body = "--- Variable #1 ---\nType: string\nValue: hi\n---END---\n";
        client.write_all(&encode_frame(body.as_bytes()).unwrap()).await.unwrap();

        assert_eq!(h.handler.handle(server, peer()).await, 1);

        let msg = h.store.get(1).unwrap();
        assert_eq!(msg.peer, peer());
        assert_eq!(msg.size_bytes, body.len());
        assert_eq!(msg.raw_data, body);
        assert_eq!(msg.variables[0].value, "hi");
        assert!(h.status.last_error().is_none());
    }

    #[tokio::test]
    async fn test_one_shot_ignores_second_frame() {
        let h = harness(ConnectionMode::OneShot);
        let (mut client, server) = tokio::io::duplex(4096);
        client.write_all(&encode_frame(b"one").unwrap()).await.unwrap();
        client.write_all(&encode_frame(b"two").unwrap()).await.unwrap();

        assert_eq!(h.handler.handle(server, peer()).await, 1);
        assert_eq!(h.store.len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_length_reports_and_delivers_nothing() {
        let h = harness(ConnectionMode::OneShot);
        let (mut client, server) = tokio::io::duplex(4096);
        client.write_all(&2048u32.to_be_bytes()).await.unwrap();

        assert_eq!(h.handler.handle(server, peer()).await, 0);
        assert!(h.store.is_empty());
        assert_eq!(
            h.status.error_for(peer()).unwrap().error,
            "Invalid message length: 2048"
        );
        assert_eq!(h.handler.sequence().current(), 0);
    }

    #[tokio::test]
    async fn test_closed_before_prefix_is_truncated() {
        let h = harness(ConnectionMode::OneShot);
        let (client, server) = tokio::io::duplex(64);
        drop(client);

        assert_eq!(h.handler.handle(server, peer()).await, 0);
        assert_eq!(
            h.status.last_error().unwrap().error,
            "Stream ended before length prefix was complete"
        );
    }

    #[tokio::test]
    async fn test_stream_mode_reads_until_clean_eof() {
        let h = harness(ConnectionMode::Stream);
        let (mut client, server) = tokio::io::duplex(4096);
        for body in ["a", "b", "c"] {
            client.write_all(&encode_frame(body.as_bytes()).unwrap()).await.unwrap();
        }
        drop(client);

        assert_eq!(h.handler.handle(server, peer()).await, 3);
        let bodies: Vec<String> = h.store.messages().into_iter().map(|m| m.raw_data).collect();
        assert_eq!(bodies, ["a", "b", "c"]);
        assert!(h.status.last_error().is_none());
    }

    #[tokio::test]
    async fn test_stream_mode_keeps_messages_before_error() {
        let h = harness(ConnectionMode::Stream);
        let (mut client, server) = tokio::io::duplex(4096);
        client.write_all(&encode_frame(b"good").unwrap()).await.unwrap();
        client.write_all(&10u32.to_be_bytes()).await.unwrap();
        client.write_all(b"bad").await.unwrap();
        drop(client);

        assert_eq!(h.handler.handle(server, peer()).await, 1);
        assert_eq!(h.store.len(), 1);
        assert_eq!(
            h.status.last_error().unwrap().error,
            "Incomplete message: got 3, expected 10"
        );
    }
}
