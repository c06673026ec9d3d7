//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! defaults (RawSettings::default)
//!     → optional TOML file (loader.rs)
//!     → flags / DBSERVER_* environment (cli.rs)
//!     → validation.rs (lease parsing, log level, privilege)
//!     → ServerConfig (typed, immutable)
//!     → shared via Arc to all subsystems
//! ```
//!
//! # Design Decisions
//! - Resolution is all-or-nothing; no partially resolved config escapes
//! - Any TLS key material implies TLS is requested
//! - Config is never mutated after resolution; TLS fallback is expressed by
//!   the absence of a `TlsPolicy`, not by flipping a flag

pub mod cli;
pub mod loader;
pub mod schema;
pub mod validation;

pub use cli::Args;
pub use loader::{resolve, ConfigError};
pub use schema::{
    LeaseSettings, LogSettings, MetricsSettings, RawSettings, ServerConfig, SessionOptions,
    TlsSettings,
};
