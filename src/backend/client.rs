//! HTTP/1.1 backend client.
//!
//! # Responsibilities
//! - Own exactly one outbound TCP connection for the lifetime of a cycle
//! - Write raw request bytes, read a response head, stream the body in one
//!   of four framings (known length, chunked, close-delimited, none)
//! - Retain residual bytes read past any message boundary
//! - Close idempotently; the relay guarantees close-once per cycle
//!
//! # Design Decisions
//! - No connection pooling: one dial per cycle, closed before the cycle ends
//! - Reads are cancel-safe so the continue arbiter can poll with deadlines
//!   without losing partially received heads

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use http::{StatusCode, Version};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time;

use crate::h1::chunked::{ChunkDecoder, ChunkError};
use crate::h1::head::{parse_response, HeadError, ResponseHead};

const READ_CHUNK: usize = 16 * 1024;

/// Error raised by backend operations.
#[derive(Debug)]
pub enum BackendError {
    /// Dial failed or timed out.
    Connect(io::Error),
    /// Read or write failed after the connection was established.
    Io(io::Error),
    /// The backend closed mid-head or mid-body.
    Closed,
    /// The response head did not parse.
    Head(HeadError),
    /// The chunked body framing did not parse.
    Chunk(ChunkError),
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendError::Connect(e) => write!(f, "backend connect failed: {}", e),
            BackendError::Io(e) => write!(f, "backend I/O error: {}", e),
            BackendError::Closed => write!(f, "backend closed unexpectedly"),
            BackendError::Head(e) => write!(f, "backend response head: {}", e),
            BackendError::Chunk(e) => write!(f, "backend chunked body: {}", e),
        }
    }
}

impl std::error::Error for BackendError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BackendError::Connect(e) | BackendError::Io(e) => Some(e),
            BackendError::Head(e) => Some(e),
            BackendError::Chunk(e) => Some(e),
            BackendError::Closed => None,
        }
    }
}

/// Body framing of the last response head, in backend terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyType {
    NoBody,
    ContentSize(u64),
    Chunked,
    StreamClose,
}

/// One step of a raw chunked read. `bytes` are the original framing bytes,
/// suitable for verbatim forwarding.
#[derive(Debug)]
pub enum ChunkRead {
    /// More bytes belonging to the current chunk.
    Data(Bytes),
    /// A new chunk of `size` bytes began within `bytes`.
    Boundary { size: u64, bytes: Bytes },
    /// The terminal zero chunk and trailers, ending the body.
    Finished(Bytes),
}

/// One outbound TCP connection to a backend.
pub struct BackendClient {
    stream: Option<TcpStream>,
    buf: BytesMut,
    authority: String,
    head: Option<ResponseHead>,
    chunk: ChunkDecoder,
}

impl BackendClient {
    /// Dial `addr` within `timeout`.
    pub async fn connect(
        addr: SocketAddr,
        authority: String,
        timeout: Duration,
    ) -> Result<Self, BackendError> {
        let stream = match time::timeout(timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(BackendError::Connect(e)),
            Err(_) => {
                return Err(BackendError::Connect(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("connect to {} timed out", addr),
                )))
            }
        };
        Ok(Self {
            stream: Some(stream),
            buf: BytesMut::with_capacity(READ_CHUNK),
            authority,
            head: None,
            chunk: ChunkDecoder::new(),
        })
    }

    /// The `Host` value this client supplies for forwarded requests.
    pub fn authority(&self) -> &str {
        &self.authority
    }

    fn stream_mut(&mut self) -> Result<&mut TcpStream, BackendError> {
        self.stream
            .as_mut()
            .ok_or_else(|| BackendError::Io(io::Error::new(io::ErrorKind::NotConnected, "closed")))
    }

    /// Write raw request bytes.
    pub async fn raw_request(&mut self, bytes: &[u8]) -> Result<(), BackendError> {
        let stream = self.stream_mut()?;
        stream.write_all(bytes).await.map_err(BackendError::Io)
    }

    /// Read more bytes into the residual buffer. Returns the number read;
    /// zero means the backend closed. Cancel-safe.
    async fn fill(&mut self) -> Result<usize, BackendError> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| BackendError::Io(io::Error::new(io::ErrorKind::NotConnected, "closed")))?;
        stream.read_buf(&mut self.buf).await.map_err(BackendError::Io)
    }

    /// Read one response head (status line + headers), leaving any body
    /// bytes in the residual buffer. Cancel-safe: a partial head survives
    /// cancellation and is completed by the next call.
    pub async fn response(&mut self) -> Result<ResponseHead, BackendError> {
        loop {
            if !self.buf.is_empty() {
                if let Some((head, consumed)) =
                    parse_response(&self.buf).map_err(BackendError::Head)?
                {
                    let _ = self.buf.split_to(consumed);
                    self.head = Some(head.clone());
                    self.chunk = ChunkDecoder::new();
                    return Ok(head);
                }
            }
            if self.fill().await? == 0 {
                return Err(BackendError::Closed);
            }
        }
    }

    /// Like [`response`](Self::response) but bounded by `window`; returns
    /// `None` on deadline with any partial head retained.
    pub async fn response_within(
        &mut self,
        window: Duration,
    ) -> Result<Option<ResponseHead>, BackendError> {
        match time::timeout(window, self.response()).await {
            Ok(result) => result.map(Some),
            Err(_) => Ok(None),
        }
    }

    /// HTTP version of the last response head (1.1 before any head).
    pub fn version(&self) -> Version {
        self.head.as_ref().map(|h| h.version).unwrap_or(Version::HTTP_11)
    }

    /// Classify the body framing of the last response head.
    pub fn body_type(&self, head_request: bool) -> Result<BodyType, BackendError> {
        let head = match &self.head {
            Some(head) => head,
            None => return Ok(BodyType::NoBody),
        };
        classify(head.status, head_request, head)
            .map_err(BackendError::Head)
    }

    /// Read the full body of a known-length response.
    pub async fn response_body(&mut self, length: u64) -> Result<Bytes, BackendError> {
        while (self.buf.len() as u64) < length {
            if self.fill().await? == 0 {
                return Err(BackendError::Closed);
            }
        }
        Ok(self.buf.split_to(length as usize).freeze())
    }

    /// Next span of a known-length body. Decrements `remaining`; errors if
    /// the backend closes short.
    pub async fn stream_body(&mut self, remaining: &mut u64) -> Result<Bytes, BackendError> {
        debug_assert!(*remaining > 0);
        if self.buf.is_empty() && self.fill().await? == 0 {
            return Err(BackendError::Closed);
        }
        let take = (*remaining).min(self.buf.len() as u64) as usize;
        *remaining -= take as u64;
        Ok(self.buf.split_to(take).freeze())
    }

    /// Next span of a close-delimited body; empty on clean EOF.
    pub async fn stream_close(&mut self) -> Result<Bytes, BackendError> {
        if self.buf.is_empty() && self.fill().await? == 0 {
            return Ok(Bytes::new());
        }
        Ok(self.buf.split_to(self.buf.len()).freeze())
    }

    /// Next step of a chunked body, as original framing bytes.
    pub async fn stream_chunk(&mut self) -> Result<ChunkRead, BackendError> {
        if self.chunk.is_finished() {
            return Ok(ChunkRead::Finished(Bytes::new()));
        }
        loop {
            if !self.buf.is_empty() {
                let scan = self.chunk.push(&self.buf).map_err(BackendError::Chunk)?;
                if scan.consumed > 0 || scan.finished {
                    let bytes = self.buf.split_to(scan.consumed).freeze();
                    return Ok(if scan.finished {
                        ChunkRead::Finished(bytes)
                    } else if let Some(size) = scan.boundary {
                        ChunkRead::Boundary { size, bytes }
                    } else {
                        ChunkRead::Data(bytes)
                    });
                }
            }
            if self.fill().await? == 0 {
                return Err(BackendError::Closed);
            }
        }
    }

    /// Take the raw socket and any residual bytes, for the byte pipe.
    /// A later [`close`](Self::close) becomes a no-op.
    pub fn take_raw(&mut self) -> Option<(TcpStream, Bytes)> {
        let stream = self.stream.take()?;
        let residual = self.buf.split_to(self.buf.len()).freeze();
        Some((stream, residual))
    }

    /// Close the connection. Idempotent; at most one shutdown is issued.
    pub async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
        }
    }
}

fn classify(
    status: StatusCode,
    head_request: bool,
    head: &ResponseHead,
) -> Result<BodyType, HeadError> {
    if head_request
        || status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED
    {
        return Ok(BodyType::NoBody);
    }
    if head.headers.last_token_is("transfer-encoding", "chunked") {
        return Ok(BodyType::Chunked);
    }
    match head.headers.get("content-length") {
        Some(value) => {
            let length = value
                .to_str()
                .ok()
                .and_then(|v| v.trim().parse::<u64>().ok())
                .ok_or(HeadError::Malformed("content-length"))?;
            Ok(if length == 0 {
                BodyType::NoBody
            } else {
                BodyType::ContentSize(length)
            })
        }
        None => Ok(BodyType::StreamClose),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::h1::head::parse_response;

    fn head_of(raw: &[u8]) -> ResponseHead {
        parse_response(raw).unwrap().unwrap().0
    }

    #[test]
    fn classify_head_and_informational_as_empty() {
        let head = head_of(b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\n");
        assert_eq!(classify(head.status, true, &head).unwrap(), BodyType::NoBody);

        let head = head_of(b"HTTP/1.1 204 No Content\r\n\r\n");
        assert_eq!(classify(head.status, false, &head).unwrap(), BodyType::NoBody);

        let head = head_of(b"HTTP/1.1 304 Not Modified\r\nContent-Length: 9\r\n\r\n");
        assert_eq!(classify(head.status, false, &head).unwrap(), BodyType::NoBody);
    }

    #[test]
    fn classify_prefers_chunked_over_length() {
        let head = head_of(
            b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\nTransfer-Encoding: chunked\r\n\r\n",
        );
        assert_eq!(classify(head.status, false, &head).unwrap(), BodyType::Chunked);
    }

    #[test]
    fn classify_defaults_to_stream_close() {
        let head = head_of(b"HTTP/1.1 200 OK\r\nServer: x\r\n\r\n");
        assert_eq!(
            classify(head.status, false, &head).unwrap(),
            BodyType::StreamClose
        );
    }

    #[test]
    fn classify_known_length() {
        let head = head_of(b"HTTP/1.1 200 OK\r\nContent-Length: 42\r\n\r\n");
        assert_eq!(
            classify(head.status, false, &head).unwrap(),
            BodyType::ContentSize(42)
        );
    }
}
