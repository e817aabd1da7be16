//! strait — an HTTP/1.1 reverse proxy relay engine.
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌────────────────────────────────────────────────┐
//!                 │                    PROXY                       │
//!  Client         │  ┌─────────┐   ┌──────────┐   ┌────────────┐   │
//!  ───────────────┼─▶│   net   │──▶│  server  │──▶│  routing   │   │
//!                 │  │listener │   │   loop   │   │  (target)  │   │
//!                 │  └─────────┘   └────┬─────┘   └─────┬──────┘   │
//!                 │                     │               │          │
//!                 │                     ▼               ▼          │
//!                 │              ┌────────────┐  ┌────────────┐    │
//!  Client         │              │   relay    │─▶│  backend   │────┼──▶ Backend
//!  ◀──────────────┼──────────────│   engine   │◀─│  client    │◀───┼─── Server
//!                 │              └────────────┘  └────────────┘    │
//!                 │  config · observability · lifecycle            │
//!                 └────────────────────────────────────────────────┘
//! ```
//!
//! The relay engine owns HTTP/1.1 framing end to end: it forwards request
//! bodies raw or chunked, arbitrates `Expect: 100-continue`, classifies
//! and streams response bodies (chunked ones verbatim), and degrades to
//! an opaque byte pipe when a `Connection: Upgrade` is honored with
//! `101 Switching Protocols`.

// Core subsystems
pub mod backend;
pub mod config;
pub mod h1;
pub mod net;
pub mod relay;
pub mod routing;
pub mod server;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use config::ProxyConfig;
pub use lifecycle::Shutdown;
pub use server::ProxyServer;
