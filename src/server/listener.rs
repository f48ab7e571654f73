//! TCP listener for incoming var_send dumps.
//!
//! Binds a `TcpListener` and spawns an accept loop. Every accepted
//! connection is handed to the shared [`ConnectionHandler`] in its own task,
//! so a slow or broken peer never holds up the accept loop or other peers.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use super::connection::ConnectionHandler;
use crate::constants::ACCEPT_RETRY_DELAY;

/// Running viewer server.
#[derive(Debug)]
pub struct ViewerServer {
    /// Address actually bound (resolves port 0).
    local_addr: SocketAddr,
    /// Handle to the accept loop task.
    accept_handle: JoinHandle<()>,
}

impl ViewerServer {
    /// Bind `host:port` and start accepting connections.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound (in use, permission
    /// denied, unresolvable host).
    pub fn start(host: &str, port: u16, handler: ConnectionHandler) -> Result<Self> {
        let listener = std::net::TcpListener::bind((host, port))
            .with_context(|| format!("Failed to bind {host}:{port}"))?;

        // Convert std listener to tokio async listener
        listener.set_nonblocking(true)?;
        let listener = TcpListener::from_std(listener)?;
        let local_addr = listener.local_addr()?;

        log::info!("[Server] Listening on {local_addr}");

        let accept_handle = tokio::spawn(Self::accept_loop(listener, Arc::new(handler)));

        Ok(Self {
            local_addr,
            accept_handle,
        })
    }

    /// Accept loop — runs as a tokio task.
    async fn accept_loop(listener: TcpListener, handler: Arc<ConnectionHandler>) {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    log::debug!("[Server] Client connected: {peer}");
                    let handler = Arc::clone(&handler);
                    tokio::spawn(async move {
                        handler.handle(stream, peer).await;
                    });
                }
                Err(e) => {
                    log::error!("[Server] Accept error: {e}");
                    tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                }
            }
        }
    }

    /// Address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting new connections.
    ///
    /// Connection tasks already running finish on their own.
    pub fn shutdown(self) {
        self.accept_handle.abort();
        log::info!("[Server] Stopped listening on {}", self.local_addr);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{encode_frame, FrameLimits};
    use crate::server::ConnectionMode;
    use crate::sink::{EventSink, MessageSink, ObservabilitySink, ViewerEvent};
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;
    use tokio::sync::mpsc;

    fn start_server() -> (ViewerServer, mpsc::UnboundedReceiver<ViewerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = Arc::new(EventSink::new(tx));
        let handler = ConnectionHandler::new(
            FrameLimits::default(),
            ConnectionMode::OneShot,
            Arc::clone(&sink) as Arc<dyn MessageSink>,
            sink as Arc<dyn ObservabilitySink>,
        );
        (ViewerServer::start("127.0.0.1", 0, handler).unwrap(), rx)
    }

    #[tokio::test]
    async fn test_server_delivers_message_event() {
        let (server, mut rx) = start_server();

        let mut stream = tokio::net::TcpStream::connect(server.local_addr()).await.unwrap();
        let body = b"--- Variable #1 ---\nType: int\nValue: 3\n---END---\n";
        stream.write_all(&encode_frame(body).unwrap()).await.unwrap();

        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("Timed out waiting for message event")
            .expect("Channel closed");

        match event {
            ViewerEvent::Message(msg) => {
                assert_eq!(msg.id, 1);
                assert_eq!(msg.peer, stream.local_addr().unwrap());
                assert_eq!(msg.variables[0].kind, "int");
            }
            other => panic!("Expected Message, got: {other:?}"),
        }

        server.shutdown();
    }

    #[tokio::test]
    async fn test_bad_connection_does_not_stop_server() {
        let (server, mut rx) = start_server();

        let mut bad = tokio::net::TcpStream::connect(server.local_addr()).await.unwrap();
        bad.write_all(&0u32.to_be_bytes()).await.unwrap();

        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("Timed out waiting for error event")
            .expect("Channel closed");
        assert!(matches!(event, ViewerEvent::ConnectionError { .. }));

        let mut good = tokio::net::TcpStream::connect(server.local_addr()).await.unwrap();
        good.write_all(&encode_frame(b"still alive").unwrap()).await.unwrap();

        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("Timed out waiting for message event")
            .expect("Channel closed");
        match event {
            ViewerEvent::Message(msg) => assert_eq!(msg.raw_data, "still alive"),
            other => panic!("Expected Message, got: {other:?}"),
        }

        server.shutdown();
    }

    #[tokio::test]
    async fn test_bind_failure_is_reported() {
        let (server, _rx) = start_server();
        let port = server.local_addr().port();

        let (tx, _rx2) = mpsc::unbounded_channel();
        let sink = Arc::new(EventSink::new(tx));
        let handler = ConnectionHandler::new(
            FrameLimits::default(),
            ConnectionMode::OneShot,
            Arc::clone(&sink) as Arc<dyn MessageSink>,
            sink as Arc<dyn ObservabilitySink>,
        );
        let err = ViewerServer::start("127.0.0.1", port, handler).unwrap_err();
        assert!(err.to_string().contains("Failed to bind"));

        server.shutdown();
    }
}
