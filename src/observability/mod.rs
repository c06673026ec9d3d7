//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges)
//!
//! Background producers:
//!     → clock.rs (wall-clock jump counter)
//!
//! Consumers:
//!     → Log sink (stderr or daily-rotated file)
//!     → Status endpoint (`GET /metrics`)
//!     → push.rs (periodic pushgateway delivery)
//! ```
//!
//! # Design Decisions
//! - Structured fields on every log line
//! - Metrics are cheap (atomic increments)
//! - Pusher and clock monitor are detached and best-effort

pub mod clock;
pub mod logging;
pub mod metrics;
pub mod push;

pub use logging::{error_chain, init_logging, LoggingError};
pub use metrics::{init_metrics, Gatherer};
pub use push::{instance_name, start_pusher, HttpPushClient, PushClient, PushError};
