//! Observability subsystem.
//!
//! # Design Decisions
//! - Structured logging via tracing; level from config, `RUST_LOG` wins
//! - Cycle IDs flow through all relay logs as span fields
//! - Metrics are cheap (atomic increments) and optional

pub mod logging;
pub mod metrics;
