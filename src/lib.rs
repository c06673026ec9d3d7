//! Database server process bootstrap and lifecycle.
//!
//! # Architecture Overview
//!
//! ```text
//!   flags / env / TOML
//!          │
//!          ▼
//!   ┌─────────────┐   ┌─────────┐   ┌────────────┐   ┌───────────┐   ┌──────────┐
//!   │   config    │──▶│ net/tls │──▶│   store    │──▶│  session  │──▶│  server  │
//!   │  resolver   │   │ policy  │   │  registry  │   │  domain   │   │ run/close│
//!   └─────────────┘   └─────────┘   └────────────┘   └───────────┘   └────┬─────┘
//!                                                                        │
//!          ┌──────────────────────────┬───────────────────────────┬──────┘
//!          ▼                          ▼                           ▼
//!   ┌─────────────┐          ┌────────────────┐          ┌────────────────┐
//!   │  lifecycle  │          │ observability  │          │ observability  │
//!   │   signals   │          │  clock monitor │          │ metrics pusher │
//!   └─────────────┘          └────────────────┘          └────────────────┘
//! ```
//!
//! Startup is strictly sequential and every step before serving is fatal on
//! failure, except TLS which degrades to plaintext. Once the server runs, the
//! first termination signal closes it; the session domain is closed after the
//! server's run returns.

// Core subsystems
pub mod config;
pub mod net;
pub mod server;
pub mod session;
pub mod store;

// Collaborator channels
pub mod binlog;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;
pub mod version;
