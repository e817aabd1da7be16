//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, connection limits)
//!     → connection.rs (residual buffer, head reads, reply writes)
//!     → Hand off to the relay
//! ```

pub mod connection;
pub mod listener;

pub use connection::{ClientConn, ReadHeadError};
pub use listener::{ConnectionPermit, Listener, ListenerError};
