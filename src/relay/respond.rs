//! Backend response reading and delivery to the client.
//!
//! # Responsibilities
//! - Read heads until a terminal status, applying the per-100 rules of the
//!   continue state machine
//! - Classify the body framing and rewrite the response headers
//! - Deliver the body in the right mode, including the raw chunked path
//!   that forwards the backend's framing bytes verbatim
//!
//! # Design Decisions
//! - Bodies at most `INLINE_REPLY_MAX` bytes are sent together with the
//!   head in one write; larger ones stream
//! - A backend read error aborts the reply; the caller closes the client
//!   connection since its framing state is indeterminate

use http::{Method, StatusCode, Version};

use crate::backend::{BackendClient, BodyType, ChunkRead};
use crate::h1::head::{RequestHead, ResponseHead};
use crate::h1::headers::rewrite_response;
use crate::net::ClientConn;
use crate::relay::error::{ProtocolError, RelayError};
use crate::relay::ContinueState;

/// Largest known-length body delivered in the same write as the head.
const INLINE_REPLY_MAX: u64 = 1024;

/// How a finished cycle left the inbound connection.
#[derive(Debug)]
pub struct CycleEnd {
    pub status: StatusCode,
    pub close: bool,
}

/// Read response heads until a terminal status (≥ 101) arrives.
///
/// Interim `100`s are resolved against the continue state: swallowed once
/// after a client-first negotiation, a protocol error after an interim was
/// already forwarded, and otherwise version-gated (swallowed for HTTP/1.0
/// clients, forwarded once for HTTP/1.1+).
pub async fn read_final_response(
    conn: &mut ClientConn,
    backend: &mut BackendClient,
    req: &RequestHead,
    state: &mut ContinueState,
) -> Result<ResponseHead, RelayError> {
    loop {
        let head = backend.response().await?;
        if head.status.as_u16() != 100 {
            return Ok(head);
        }

        match state {
            ContinueState::Pending => {
                // Client already went ahead; it must never see this one.
                tracing::debug!("swallowed backend 100 after client-first body");
                *state = ContinueState::None;
            }
            ContinueState::Forwarded => {
                return Err(RelayError::Protocol(
                    ProtocolError::NonTerminalStatusAfterContinue,
                ));
            }
            ContinueState::None => {
                if req.version == Version::HTTP_10 {
                    tracing::debug!("swallowed backend 100 for HTTP/1.0 client");
                } else {
                    conn.send_continue(head.version)
                        .await
                        .map_err(RelayError::ClientIo)?;
                    *state = ContinueState::Forwarded;
                }
            }
        }
    }
}

/// `Connection: close` is forced exactly when the client asked for a
/// continue that was never granted and the backend answered with a final
/// status anyway.
pub fn should_close(req: &RequestHead, state: &ContinueState, status: StatusCode) -> bool {
    req.expect_continue && !matches!(state, ContinueState::Forwarded) && status.as_u16() >= 200
}

/// Deliver the terminal response to the client.
pub async fn relay_response(
    conn: &mut ClientConn,
    backend: &mut BackendClient,
    req: &RequestHead,
    state: &ContinueState,
    head: ResponseHead,
) -> Result<CycleEnd, RelayError> {
    let body = backend.body_type(req.method == Method::HEAD)?;
    let forced_close = should_close(req, state, head.status);

    let rewritten = ResponseHead {
        headers: rewrite_response(&head.headers, forced_close),
        ..head
    };
    let encoded = rewritten.encode();

    // The inbound connection may only be reused if nobody demanded close:
    // not the law above, not the client, not the backend's own response.
    let mut close =
        forced_close || req.wants_close || rewritten.headers.contains_token("connection", "close");

    match body {
        BodyType::NoBody => {
            conn.send_reply(&encoded, &[])
                .await
                .map_err(RelayError::ClientIo)?;
        }
        BodyType::ContentSize(n) if n <= INLINE_REPLY_MAX => {
            let body = backend.response_body(n).await?;
            conn.send_reply(&encoded, &body)
                .await
                .map_err(RelayError::ClientIo)?;
        }
        BodyType::ContentSize(n) => {
            conn.send_reply(&encoded, &[])
                .await
                .map_err(RelayError::ClientIo)?;
            let mut remaining = n;
            while remaining > 0 {
                let span = backend.stream_body(&mut remaining).await?;
                conn.write_all(&span).await.map_err(RelayError::ClientIo)?;
            }
        }
        BodyType::StreamClose => {
            close = true;
            conn.send_reply(&encoded, &[])
                .await
                .map_err(RelayError::ClientIo)?;
            loop {
                let span = backend.stream_close().await?;
                if span.is_empty() {
                    break;
                }
                conn.write_all(&span).await.map_err(RelayError::ClientIo)?;
            }
        }
        BodyType::Chunked => {
            // Chunked preamble, then the backend's framing bytes verbatim.
            conn.send_reply(&encoded, &[])
                .await
                .map_err(RelayError::ClientIo)?;
            loop {
                let span = match backend.stream_chunk().await? {
                    ChunkRead::Data(bytes) => bytes,
                    ChunkRead::Boundary { bytes, .. } => bytes,
                    ChunkRead::Finished(bytes) => {
                        if !bytes.is_empty() {
                            conn.write_all(&bytes).await.map_err(RelayError::ClientIo)?;
                        }
                        break;
                    }
                };
                conn.write_all(&span).await.map_err(RelayError::ClientIo)?;
            }
        }
    }

    Ok(CycleEnd {
        status: rewritten.status,
        close,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::h1::head::parse_request;

    fn request(raw: &[u8]) -> RequestHead {
        parse_request(raw).unwrap().unwrap().0
    }

    #[test]
    fn should_close_law() {
        let expecting = request(
            b"POST / HTTP/1.1\r\nHost: x\r\nContent-Length: 2\r\nExpect: 100-continue\r\n\r\n",
        );
        let plain = request(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n");

        // Expect without a forwarded 100, final status: close.
        assert!(should_close(
            &expecting,
            &ContinueState::Pending,
            StatusCode::OK
        ));
        assert!(should_close(
            &expecting,
            &ContinueState::None,
            StatusCode::BAD_REQUEST
        ));

        // A forwarded 100 clears the obligation.
        assert!(!should_close(
            &expecting,
            &ContinueState::Forwarded,
            StatusCode::OK
        ));

        // Non-final statuses never force close.
        assert!(!should_close(
            &expecting,
            &ContinueState::Pending,
            StatusCode::SWITCHING_PROTOCOLS
        ));

        // No Expect, no forced close.
        assert!(!should_close(&plain, &ContinueState::None, StatusCode::OK));
    }
}
