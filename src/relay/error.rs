//! Error kinds surfaced from a relay cycle.

use std::io;

use http::StatusCode;

use crate::backend::BackendError;
use crate::h1::chunked::ChunkError;
use crate::h1::head::HeadError;

/// Protocol violations detected while relaying.
#[derive(Debug)]
pub enum ProtocolError {
    /// The backend sent another interim `100` after one was already
    /// forwarded to the client.
    NonTerminalStatusAfterContinue,
    /// Malformed chunked framing.
    BadChunk(ChunkError),
    /// Malformed message head.
    BadHead(HeadError),
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtocolError::NonTerminalStatusAfterContinue => {
                write!(f, "non-terminal status after continue")
            }
            ProtocolError::BadChunk(e) => write!(f, "{}", e),
            ProtocolError::BadHead(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for ProtocolError {}

/// First error of a relay cycle. The cycle aborts, the backend is closed,
/// and the caller decides whether a synthetic reply is still possible.
#[derive(Debug)]
pub enum RelayError {
    /// Malformed upgrade request; answered 400 without contacting a
    /// backend.
    BadUpgrade(&'static str),
    /// Backend connect failed or timed out.
    Unreachable(io::Error),
    /// Read or write failure against the backend.
    UpstreamIo(io::Error),
    /// Write failure against the client socket.
    ClientIo(io::Error),
    /// Protocol violation by either peer.
    Protocol(ProtocolError),
    /// The continue-negotiation deadline expired.
    ContinueTimeout,
}

impl RelayError {
    /// Synthetic status to answer with when no response bytes have been
    /// written yet. `None` when the client socket itself is broken.
    pub fn synthetic_status(&self) -> Option<StatusCode> {
        match self {
            RelayError::BadUpgrade(_) => Some(StatusCode::BAD_REQUEST),
            RelayError::Unreachable(_) | RelayError::UpstreamIo(_) | RelayError::Protocol(_) => {
                Some(StatusCode::BAD_GATEWAY)
            }
            RelayError::ContinueTimeout => Some(StatusCode::GATEWAY_TIMEOUT),
            RelayError::ClientIo(_) => None,
        }
    }

    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            RelayError::BadUpgrade(_) => "bad_upgrade",
            RelayError::Unreachable(_) => "unreachable",
            RelayError::UpstreamIo(_) => "upstream_io",
            RelayError::ClientIo(_) => "client_io",
            RelayError::Protocol(_) => "protocol",
            RelayError::ContinueTimeout => "continue_timeout",
        }
    }
}

impl std::fmt::Display for RelayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RelayError::BadUpgrade(what) => write!(f, "malformed upgrade request: {}", what),
            RelayError::Unreachable(e) => write!(f, "backend unreachable: {}", e),
            RelayError::UpstreamIo(e) => write!(f, "backend I/O error: {}", e),
            RelayError::ClientIo(e) => write!(f, "client I/O error: {}", e),
            RelayError::Protocol(e) => write!(f, "protocol error: {}", e),
            RelayError::ContinueTimeout => write!(f, "continue negotiation timed out"),
        }
    }
}

impl std::error::Error for RelayError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RelayError::Unreachable(e) | RelayError::UpstreamIo(e) | RelayError::ClientIo(e) => {
                Some(e)
            }
            RelayError::Protocol(e) => Some(e),
            _ => None,
        }
    }
}

impl From<BackendError> for RelayError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Connect(e) => RelayError::Unreachable(e),
            BackendError::Io(e) => RelayError::UpstreamIo(e),
            BackendError::Closed => RelayError::UpstreamIo(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "backend closed unexpectedly",
            )),
            BackendError::Head(e) => RelayError::Protocol(ProtocolError::BadHead(e)),
            BackendError::Chunk(e) => RelayError::Protocol(ProtocolError::BadChunk(e)),
        }
    }
}
