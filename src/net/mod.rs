//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP / Unix socket connection
//!     → listener.rs (accept, connection limits)
//!     → tls.rs (optional TLS handshake, policy built once at startup)
//!     → connection.rs (identity, live-connection tracking)
//!     → Hand off to the server's driver
//! ```
//!
//! # Design Decisions
//! - Bounded accept prevents resource exhaustion
//! - Each connection tracked so shutdown can drain
//! - TLS is optional; a failed load degrades to plaintext

pub mod connection;
pub mod listener;
pub mod tls;

pub use connection::{ConnectionId, ConnectionTracker};
pub use listener::{Accepted, Listener, ListenerError, Peer};
pub use tls::{build_tls_policy, ClientAuth, TlsPolicy};
