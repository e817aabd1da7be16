//! The `Expect: 100-continue` arbiter.
//!
//! Runs after the request head reached the backend and before any body
//! byte is forwarded. Races two events under one deadline: the client
//! starting to send its body (implicit go-ahead) against the backend
//! sending an interim `100 Continue`. Whichever wins decides whether the
//! proxy emits its single interim response to the client.
//!
//! Polling discipline: client-buffered data is checked with a zero
//! timeout; if none arrived, the backend is awaited for up to one second;
//! repeat until the deadline is exhausted.

use std::time::Duration;

use tokio::time::Instant;

use crate::backend::BackendClient;
use crate::h1::head::ResponseHead;
use crate::net::ClientConn;
use crate::relay::error::RelayError;

const BACKEND_POLL: Duration = Duration::from_secs(1);

/// Resolution of the continue race.
#[derive(Debug)]
pub enum Negotiation {
    /// The client sent body bytes first; no interim is synthesized and
    /// the first backend `100` will be swallowed by the response reader.
    ClientFirst,
    /// The backend sent `100` first; it was forwarded to the client and
    /// body forwarding may begin.
    Continued,
    /// The backend answered with a final status before any body moved;
    /// relay it without forwarding the body.
    ShortCircuit(ResponseHead),
}

/// Race the client body against the backend interim response.
pub async fn negotiate(
    conn: &mut ClientConn,
    backend: &mut BackendClient,
    window: Duration,
) -> Result<Negotiation, RelayError> {
    let deadline = Instant::now() + window;

    loop {
        if conn.has_buffered() {
            return Ok(Negotiation::ClientFirst);
        }

        // Zero-timeout poll: pick up bytes that already arrived.
        match conn.fill_within(Duration::ZERO).await {
            Ok(Some(0)) => {
                return Err(RelayError::ClientIo(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "client closed while awaiting 100-continue",
                )))
            }
            Ok(Some(_)) => return Ok(Negotiation::ClientFirst),
            Ok(None) => {}
            Err(e) => return Err(RelayError::ClientIo(e)),
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(RelayError::ContinueTimeout);
        }

        let wait = BACKEND_POLL.min(deadline - now);
        match backend.response_within(wait).await? {
            Some(head) if head.status.as_u16() == 100 => {
                conn.send_continue(head.version)
                    .await
                    .map_err(RelayError::ClientIo)?;
                tracing::debug!("forwarded interim 100 Continue to client");
                return Ok(Negotiation::Continued);
            }
            Some(head) => {
                tracing::debug!(status = %head.status, "backend short-circuited continue negotiation");
                return Ok(Negotiation::ShortCircuit(head));
            }
            None => {}
        }
    }
}
