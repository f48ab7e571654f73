//! Sending side of the protocol.
//!
//! Frames a dump body and writes it to a running viewer the way the PHP
//! extension does: connect, write one frame, close.

use anyhow::{Context, Result};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use crate::protocol::encode_frame;

/// Send `body` as a single frame to `host:port`.
///
/// Returns the number of bytes written, prefix included.
///
/// # Errors
///
/// Returns an error if the body cannot be framed, the connection fails, or
/// the write fails.
pub async fn send_dump(host: &str, port: u16, body: &[u8]) -> Result<usize> {
    let frame = encode_frame(body)?;
    let mut stream = TcpStream::connect((host, port))
        .await
        .with_context(|| format!("Failed to connect to {host}:{port}"))?;
    stream
        .write_all(&frame)
        .await
        .context("Failed to write frame")?;
    stream.shutdown().await.context("Failed to close connection")?;
    log::debug!("Sent {} bytes to {host}:{port}", frame.len());
    Ok(frame.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{FrameLimits, FrameReader};

    #[tokio::test]
    async fn test_send_dump_writes_one_frame() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let accept = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut reader = FrameReader::new(stream, FrameLimits::default());
            let body = reader.read_frame().await.unwrap();
            let after = reader.next_frame().await.unwrap();
            (body, after)
        });

        let written = send_dump("127.0.0.1", port, b"Value: 1").await.unwrap();
        assert_eq!(written, 12);

        let (body, after) = accept.await.unwrap();
        assert_eq!(body, b"Value: 1");
        assert!(after.is_none());
    }

    #[tokio::test]
    async fn test_send_empty_body_fails_before_connecting() {
        assert!(send_dump("127.0.0.1", 1, b"").await.is_err());
    }
}
