//! Inbound client connection.
//!
//! # Responsibilities
//! - Own the accepted socket and the residual buffer (bytes read past the
//!   current message boundary)
//! - Read and parse request heads, bounded by the configured header limit
//! - Expose timed buffered reads for the continue arbiter
//! - Write replies, interim `100 Continue` lines, and streamed body spans
//! - Hand out the raw socket plus residual bytes for upgraded connections

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use http::Version;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time;

use crate::h1::head::{parse_request, version_text, HeadError, RequestHead};

const READ_CHUNK: usize = 16 * 1024;

/// Error raised while reading a request head from the client.
#[derive(Debug)]
pub enum ReadHeadError {
    Io(io::Error),
    /// The peer closed mid-head.
    UnexpectedEof,
    /// Parse failure or over-limit head; answered with 400 upstream of
    /// the relay.
    Head(HeadError),
}

impl std::fmt::Display for ReadHeadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReadHeadError::Io(e) => write!(f, "client read failed: {}", e),
            ReadHeadError::UnexpectedEof => write!(f, "client closed mid-request"),
            ReadHeadError::Head(e) => write!(f, "client request head: {}", e),
        }
    }
}

impl std::error::Error for ReadHeadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ReadHeadError::Io(e) => Some(e),
            ReadHeadError::Head(e) => Some(e),
            ReadHeadError::UnexpectedEof => None,
        }
    }
}

/// An accepted client connection with its residual buffer.
pub struct ClientConn {
    stream: Option<TcpStream>,
    peer: SocketAddr,
    buf: BytesMut,
    response_started: bool,
}

impl ClientConn {
    pub fn new(stream: TcpStream, peer: SocketAddr) -> Self {
        Self {
            stream: Some(stream),
            peer,
            buf: BytesMut::with_capacity(READ_CHUNK),
            response_started: false,
        }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// True once a final response head has been written for the current
    /// cycle; a synthetic error reply is only safe before that.
    pub fn response_started(&self) -> bool {
        self.response_started
    }

    fn stream_mut(&mut self) -> io::Result<&mut TcpStream> {
        self.stream
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "connection taken"))
    }

    /// Read the next request head. `Ok(None)` means the peer closed
    /// cleanly between requests. Body bytes received past the head stay
    /// in the residual buffer.
    pub async fn read_request(
        &mut self,
        max_head_bytes: usize,
    ) -> Result<Option<RequestHead>, ReadHeadError> {
        self.response_started = false;
        loop {
            if !self.buf.is_empty() {
                match parse_request(&self.buf) {
                    Ok(Some((head, consumed))) => {
                        let _ = self.buf.split_to(consumed);
                        return Ok(Some(head));
                    }
                    Ok(None) => {
                        if self.buf.len() > max_head_bytes {
                            return Err(ReadHeadError::Head(HeadError::TooLarge));
                        }
                    }
                    Err(e) => return Err(ReadHeadError::Head(e)),
                }
            }
            let stream = self
                .stream
                .as_mut()
                .ok_or_else(|| {
                    ReadHeadError::Io(io::Error::new(io::ErrorKind::NotConnected, "taken"))
                })?;
            let read = stream
                .read_buf(&mut self.buf)
                .await
                .map_err(ReadHeadError::Io)?;
            if read == 0 {
                return if self.buf.is_empty() {
                    Ok(None)
                } else {
                    Err(ReadHeadError::UnexpectedEof)
                };
            }
        }
    }

    pub fn has_buffered(&self) -> bool {
        !self.buf.is_empty()
    }

    pub fn buffered_len(&self) -> usize {
        self.buf.len()
    }

    /// Take up to `max` residual bytes.
    pub fn take_buffered(&mut self, max: usize) -> Bytes {
        let take = self.buf.len().min(max);
        self.buf.split_to(take).freeze()
    }

    /// Put unconsumed bytes back at the front of the residual buffer.
    pub fn restore_buffered(&mut self, bytes: Bytes) {
        if bytes.is_empty() {
            return;
        }
        let mut restored = BytesMut::with_capacity(bytes.len() + self.buf.len());
        restored.extend_from_slice(&bytes);
        restored.extend_from_slice(&self.buf);
        self.buf = restored;
    }

    /// Read more bytes into the residual buffer. Zero means EOF.
    /// Cancel-safe.
    pub async fn fill(&mut self) -> io::Result<usize> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "connection taken"))?;
        stream.read_buf(&mut self.buf).await
    }

    /// Read within `window`; `Ok(None)` on deadline. A zero window acts
    /// as a single poll for already-arrived bytes.
    pub async fn fill_within(&mut self, window: Duration) -> io::Result<Option<usize>> {
        match time::timeout(window, self.fill()).await {
            Ok(result) => result.map(Some),
            Err(_) => Ok(None),
        }
    }

    pub async fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.stream_mut()?.write_all(bytes).await
    }

    /// Emit the single interim response of a continue negotiation, with
    /// the version the backend speaks.
    pub async fn send_continue(&mut self, version: Version) -> io::Result<()> {
        let line = format!("{} 100 Continue\r\n\r\n", version_text(version));
        self.stream_mut()?.write_all(line.as_bytes()).await
    }

    /// Write an encoded response head (and optional inline body) as one
    /// write. Marks the response as started.
    pub async fn send_reply(&mut self, head: &[u8], body: &[u8]) -> io::Result<()> {
        self.response_started = true;
        let stream = self.stream_mut()?;
        if body.is_empty() {
            stream.write_all(head).await
        } else {
            let mut joined = Vec::with_capacity(head.len() + body.len());
            joined.extend_from_slice(head);
            joined.extend_from_slice(body);
            stream.write_all(&joined).await
        }
    }

    /// Minimal synthetic reply for errors raised before any backend bytes
    /// reached the client.
    pub async fn send_simple(&mut self, status: u16, reason: &str, body: &str) -> io::Result<()> {
        self.response_started = true;
        let reply = format!(
            "HTTP/1.1 {} {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            reason,
            body.len(),
            body
        );
        self.stream_mut()?.write_all(reply.as_bytes()).await
    }

    /// Take the raw socket and residual bytes for the byte pipe. The
    /// connection is unusable afterwards.
    pub fn take_raw(&mut self) -> Option<(TcpStream, Bytes)> {
        let stream = self.stream.take()?;
        let residual = self.buf.split_to(self.buf.len()).freeze();
        Some((stream, residual))
    }

    pub async fn shutdown(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
        }
    }
}
