//! The request/response relay engine.
//!
//! # Data Flow
//! ```text
//! Parsed inbound request
//!     → upgrade.rs (screen Connection/Upgrade, may 400)
//!     → forward.rs (head + body to the backend)
//!        ⇄ arbiter.rs (Expect: 100-continue race, interleaved)
//!     → respond.rs (terminal head, classification, delivery)
//!     → pipe.rs (only after an honored 101)
//! ```
//!
//! # Design Decisions
//! - One cycle owns both sockets exclusively; no shared state, no locks
//! - The backend connection is dialed per cycle and closed exactly once,
//!   on every terminal path (`run_cycle` wraps the body in a close guard)
//! - First error aborts the cycle; no retries

use std::time::Duration;

use http::StatusCode;

use crate::backend::BackendClient;
use crate::h1::head::{BodyMode, RequestHead, ResponseHead};
use crate::h1::headers::rewrite_response;
use crate::net::ClientConn;
use crate::routing::Target;

pub mod arbiter;
pub mod error;
pub mod forward;
pub mod pipe;
pub mod respond;
pub mod upgrade;

pub use error::{ProtocolError, RelayError};
pub use respond::CycleEnd;

/// Where the continue negotiation stands for the current cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContinueState {
    /// No interim handling in effect.
    None,
    /// Client sent its body first; the first backend `100` is swallowed.
    Pending,
    /// One `100 Continue` reached the client; no further interim may.
    Forwarded,
}

/// Relay timing knobs, derived from `[timeouts]` in the config.
#[derive(Debug, Clone, Copy)]
pub struct RelayConfig {
    pub connect: Duration,
    pub continue_window: Duration,
    pub pipe_idle: Duration,
}

/// Outcome of a completed cycle.
#[derive(Debug)]
pub enum Disposition {
    /// A response was relayed; `close` says whether the inbound
    /// connection may not be reused.
    Relayed { status: StatusCode, close: bool },
    /// The connection pair was promoted to a byte pipe and has ended;
    /// the inbound connection must not be reused.
    Upgraded,
}

/// Run one relay cycle: screen, dial, forward, respond or pipe.
///
/// The backend client is closed before returning on every path,
/// successful or not.
pub async fn run_cycle(
    conn: &mut ClientConn,
    req: &mut RequestHead,
    target: &Target,
    cfg: &RelayConfig,
) -> Result<Disposition, RelayError> {
    upgrade::screen(req)?;

    let mut backend =
        BackendClient::connect(target.addr, target.authority.clone(), cfg.connect).await?;

    let result = drive(conn, req, &mut backend, cfg).await;
    backend.close().await;
    result
}

async fn drive(
    conn: &mut ClientConn,
    req: &RequestHead,
    backend: &mut BackendClient,
    cfg: &RelayConfig,
) -> Result<Disposition, RelayError> {
    let mut state = ContinueState::None;

    match req.body {
        BodyMode::None => {
            forward::send_request(req, backend, &[]).await?;
        }
        // The whole body already sits in the residual buffer: one write.
        BodyMode::ContentLength(n)
            if !req.expect_continue && conn.buffered_len() as u64 >= n =>
        {
            let body = conn.take_buffered(n as usize);
            forward::send_request(req, backend, &body).await?;
        }
        body => {
            forward::send_headers(req, backend).await?;
            if req.expect_continue {
                match arbiter::negotiate(conn, backend, cfg.continue_window).await? {
                    arbiter::Negotiation::ClientFirst => {
                        state = ContinueState::Pending;
                        forward::send_body(conn, backend, body).await?;
                    }
                    arbiter::Negotiation::Continued => {
                        state = ContinueState::Forwarded;
                        forward::send_body(conn, backend, body).await?;
                    }
                    arbiter::Negotiation::ShortCircuit(head) => {
                        // The backend refused to wait for a body; relay its
                        // answer without forwarding one.
                        return finish(conn, backend, req, &state, head, cfg).await;
                    }
                }
            } else {
                forward::send_body(conn, backend, body).await?;
            }
        }
    }

    let head = respond::read_final_response(conn, backend, req, &mut state).await?;
    finish(conn, backend, req, &state, head, cfg).await
}

async fn finish(
    conn: &mut ClientConn,
    backend: &mut BackendClient,
    req: &RequestHead,
    state: &ContinueState,
    head: ResponseHead,
    cfg: &RelayConfig,
) -> Result<Disposition, RelayError> {
    if head.status == StatusCode::SWITCHING_PROTOCOLS && req.upgraded {
        return switch_protocols(conn, backend, head, cfg).await;
    }

    let end = respond::relay_response(conn, backend, req, state, head).await?;
    Ok(Disposition::Relayed {
        status: end.status,
        close: end.close,
    })
}

/// Promote the connection pair to an opaque byte pipe.
async fn switch_protocols(
    conn: &mut ClientConn,
    backend: &mut BackendClient,
    head: ResponseHead,
    cfg: &RelayConfig,
) -> Result<Disposition, RelayError> {
    let rewritten = ResponseHead {
        headers: rewrite_response(&head.headers, false),
        ..head
    };
    let encoded = rewritten.encode();

    let (backend_sock, backend_residual) = backend.take_raw().ok_or_else(|| {
        RelayError::UpstreamIo(std::io::Error::new(
            std::io::ErrorKind::NotConnected,
            "backend socket already taken",
        ))
    })?;
    let (client_sock, client_residual) = conn.take_raw().ok_or_else(|| {
        RelayError::ClientIo(std::io::Error::new(
            std::io::ErrorKind::NotConnected,
            "client socket already taken",
        ))
    })?;

    match pipe::run(
        client_sock,
        client_residual,
        backend_sock,
        backend_residual,
        encoded,
        cfg.pipe_idle,
    )
    .await
    {
        Ok((end, from_client, from_backend)) => {
            tracing::debug!(?end, from_client, from_backend, "byte pipe ended");
            Ok(Disposition::Upgraded)
        }
        Err(e) => Err(RelayError::ClientIo(e)),
    }
}
