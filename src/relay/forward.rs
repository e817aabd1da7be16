//! Request forwarding.
//!
//! # Responsibilities
//! - Serialize the request line and rewritten headers for the backend
//! - Send fully known bodies in one write
//! - Stream inbound bodies through in small bursts, raw (known length) or
//!   chunked (original framing preserved), without buffering the whole body
//!
//! # Design Decisions
//! - The serializer re-supplies `Host` from the backend target and
//!   re-emits `Content-Length`/`Transfer-Encoding`, so the header rewrite
//!   may drop them unconditionally

use crate::backend::BackendClient;
use crate::h1::chunked::ChunkDecoder;
use crate::h1::head::{version_text, BodyMode, RequestHead};
use crate::h1::headers::rewrite_request;
use crate::net::ClientConn;
use crate::relay::error::{ProtocolError, RelayError};

/// Serialize the request line plus rewritten headers, ending in the blank
/// line. Pure: same head, same bytes.
pub fn build_request_head(req: &RequestHead, authority: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(512);
    buf.extend_from_slice(req.method.as_str().as_bytes());
    buf.push(b' ');
    buf.extend_from_slice(req.target.as_bytes());
    buf.push(b' ');
    buf.extend_from_slice(version_text(req.version).as_bytes());
    buf.extend_from_slice(b"\r\n");

    rewrite_request(&req.headers, req.upgraded).encode_into(&mut buf);

    buf.extend_from_slice(b"Host: ");
    buf.extend_from_slice(authority.as_bytes());
    buf.extend_from_slice(b"\r\n");

    match req.body {
        BodyMode::ContentLength(n) => {
            buf.extend_from_slice(b"Content-Length: ");
            buf.extend_from_slice(n.to_string().as_bytes());
            buf.extend_from_slice(b"\r\n");
        }
        BodyMode::Chunked => {
            buf.extend_from_slice(b"Transfer-Encoding: chunked\r\n");
        }
        BodyMode::None => {}
    }

    buf.extend_from_slice(b"\r\n");
    buf
}

/// Forward a request whose body is fully known, as a single write.
pub async fn send_request(
    req: &RequestHead,
    backend: &mut BackendClient,
    body: &[u8],
) -> Result<(), RelayError> {
    let mut bytes = build_request_head(req, &backend.authority().to_string());
    bytes.extend_from_slice(body);
    backend.raw_request(&bytes).await.map_err(RelayError::from)
}

/// Forward the request line and headers only; the body follows via
/// [`send_body`] once the continue negotiation (if any) resolves.
pub async fn send_headers(
    req: &RequestHead,
    backend: &mut BackendClient,
) -> Result<(), RelayError> {
    let bytes = build_request_head(req, &backend.authority().to_string());
    backend.raw_request(&bytes).await.map_err(RelayError::from)
}

/// Stream the inbound body to the backend.
///
/// Raw mode forwards exactly `n` bytes; anything read past them stays in
/// the client's residual buffer for the next message. Chunked mode feeds
/// the incremental decoder and forwards the original framing bytes until
/// the terminal chunk and trailers are through.
pub async fn send_body(
    conn: &mut ClientConn,
    backend: &mut BackendClient,
    body: BodyMode,
) -> Result<(), RelayError> {
    match body {
        BodyMode::None => Ok(()),
        BodyMode::ContentLength(n) => send_raw_body(conn, backend, n).await,
        BodyMode::Chunked => send_chunked_body(conn, backend).await,
    }
}

async fn send_raw_body(
    conn: &mut ClientConn,
    backend: &mut BackendClient,
    length: u64,
) -> Result<(), RelayError> {
    let mut remaining = length;
    while remaining > 0 {
        if !conn.has_buffered() {
            let read = conn.fill().await.map_err(RelayError::ClientIo)?;
            if read == 0 {
                return Err(RelayError::ClientIo(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "client closed before request body ended",
                )));
            }
        }
        let span = conn.take_buffered(remaining.min(usize::MAX as u64) as usize);
        remaining -= span.len() as u64;
        backend.raw_request(&span).await?;
    }
    Ok(())
}

async fn send_chunked_body(
    conn: &mut ClientConn,
    backend: &mut BackendClient,
) -> Result<(), RelayError> {
    let mut decoder = ChunkDecoder::new();
    loop {
        if !conn.has_buffered() {
            let read = conn.fill().await.map_err(RelayError::ClientIo)?;
            if read == 0 {
                return Err(RelayError::ClientIo(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "client closed inside chunked request body",
                )));
            }
        }
        let buffered = conn.take_buffered(usize::MAX);
        let scan = decoder
            .push(&buffered)
            .map_err(|e| RelayError::Protocol(ProtocolError::BadChunk(e)))?;
        if scan.consumed > 0 {
            backend.raw_request(&buffered[..scan.consumed]).await?;
        }
        if scan.consumed < buffered.len() {
            // Bytes past the message boundary belong to the next request.
            conn.restore_buffered(buffered.slice(scan.consumed..));
        }
        if scan.finished {
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::h1::head::parse_request;

    fn request(raw: &[u8]) -> RequestHead {
        parse_request(raw).unwrap().unwrap().0
    }

    #[test]
    fn head_serialization_rewrites_and_reframes() {
        let req = request(
            b"POST /u HTTP/1.1\r\nHost: outer.test\r\nConnection: keep-alive\r\nContent-Length: 4\r\nX-Trace: 1\r\n\r\n",
        );
        let bytes = build_request_head(&req, "10.0.0.5:9000");
        let text = String::from_utf8(bytes).unwrap();

        assert!(text.starts_with("POST /u HTTP/1.1\r\n"));
        assert!(text.contains("Host: 10.0.0.5:9000\r\n"));
        assert!(text.contains("Content-Length: 4\r\n"));
        assert!(text.contains("connection: close\r\n"));
        assert!(text.contains("x-trace: 1\r\n"));
        assert!(!text.contains("outer.test"));
        assert!(!text.contains("keep-alive"));
        assert!(text.ends_with("\r\n\r\n"));
    }

    #[test]
    fn chunked_request_reframes_as_chunked() {
        let req = request(
            b"POST /u HTTP/1.1\r\nHost: x\r\nTransfer-Encoding: chunked\r\n\r\n",
        );
        let text = String::from_utf8(build_request_head(&req, "b:1")).unwrap();
        assert!(text.contains("Transfer-Encoding: chunked\r\n"));
        assert!(!text.contains("Content-Length"));
    }

    #[test]
    fn serialization_is_deterministic() {
        let req = request(b"GET / HTTP/1.1\r\nHost: x\r\nAccept: */*\r\n\r\n");
        assert_eq!(build_request_head(&req, "b:1"), build_request_head(&req, "b:1"));
    }
}
