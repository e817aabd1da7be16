//! HTTP/1.1 wire handling.
//!
//! # Data Flow
//! ```text
//! Inbound bytes
//!     → head.rs (request/response head parsing via httparse)
//!     → headers.rs (ordered header list, token scans, rewrites)
//!     → chunked.rs (incremental chunked transfer-coding decoder)
//! ```
//!
//! # Design Decisions
//! - Header order and duplicates are preserved (ordered pairs, not a map)
//! - Chunked framing bytes are consumed verbatim so relays can forward
//!   them without reconstruction
//! - No body buffering at this layer; callers stream

pub mod chunked;
pub mod head;
pub mod headers;

pub use chunked::{ChunkDecoder, ChunkError, ChunkScan};
pub use head::{BodyMode, HeadError, RequestHead, ResponseHead};
pub use headers::HeaderList;
