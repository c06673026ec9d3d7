//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Privilege check → TLS → Store → Binlog → Session domain → Server
//!
//! Serving:
//!     Signals (signals.rs): first SIGHUP/SIGINT/SIGTERM/SIGQUIT → Server close
//!     Background: clock monitor, metrics pusher
//!
//! Teardown:
//!     Server run returns → Domain close (shutdown.rs stops its workers) → Exit
//! ```
//!
//! # Design Decisions
//! - Ordered startup: nothing serves until every fatal step succeeded
//! - Ordered teardown: the domain outlives the server
//! - No shutdown deadline: teardown waits for connections to end

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use signals::{spawn_coordinator, Close, OsSignals, Signal, SignalSource};
pub use startup::{bootstrap, run, Bootstrapped, StartupError};
