//! Lifecycle management subsystem.
//!
//! # Design Decisions
//! - Ordered shutdown: stop accepting, let in-flight cycles drain
//! - Signal handling lives in `main`; tasks subscribe to the broadcast

pub mod shutdown;

pub use shutdown::Shutdown;
