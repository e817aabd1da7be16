//! Outbound backend connections.

pub mod client;

pub use client::{BackendClient, BackendError, BodyType, ChunkRead};
