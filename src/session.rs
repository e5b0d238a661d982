//! Session: one client connection's message channel.
//!
//! Frames are newline-delimited text. A message is the bytes up to `\n`,
//! with one trailing `\r` stripped if present. Inbound payloads are opaque
//! text; outbound messages are written with a `\r\n` terminator.

use bytes::BytesMut;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Initial read buffer capacity.
const BUFFER_SIZE: usize = 4096;

/// One client connection and its framed message channel.
///
/// Generic over the underlying byte stream so handlers can be exercised
/// against in-memory transports in tests.
pub struct Session<S> {
    stream: S,
    buffer: BytesMut,
    max_message_bytes: usize,
}

impl<S: AsyncRead + AsyncWrite + Unpin> Session<S> {
    /// Wrap a connected stream.
    pub fn new(stream: S, max_message_bytes: usize) -> Self {
        Session {
            stream,
            buffer: BytesMut::with_capacity(BUFFER_SIZE),
            max_message_bytes,
        }
    }

    /// Receive the next message, or `None` when the peer has closed.
    ///
    /// Bytes of a frame left incomplete at end-of-stream are discarded:
    /// a message that was never terminated was never received.
    pub async fn recv(&mut self) -> io::Result<Option<String>> {
        loop {
            if let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
                let mut frame = self.buffer.split_to(pos + 1);
                frame.truncate(pos);
                if frame.last() == Some(&b'\r') {
                    frame.truncate(frame.len() - 1);
                }

                let message = String::from_utf8(frame.to_vec()).map_err(|_| {
                    io::Error::new(io::ErrorKind::InvalidData, "message is not valid UTF-8")
                })?;
                return Ok(Some(message));
            }

            // Everything buffered belongs to the current frame
            if self.buffer.len() >= self.max_message_bytes {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "message exceeds maximum size",
                ));
            }

            let n = self.stream.read_buf(&mut self.buffer).await?;
            if n == 0 {
                // Connection closed by peer
                return Ok(None);
            }
        }
    }

    /// Send one message, terminated with `\r\n`.
    pub async fn send(&mut self, message: &str) -> io::Result<()> {
        let mut response = BytesMut::with_capacity(message.len() + 2);
        response.extend_from_slice(message.as_bytes());
        response.extend_from_slice(b"\r\n");
        self.stream.write_all(&response).await
    }
}
