//! Configuration schema definitions.
//!
//! Two shapes live here. [`RawSettings`] is what operators write: strings for
//! durations, separate host/port pieces, and every field defaulted so a TOML
//! file may be partial. [`ServerConfig`] is the resolved, typed form built once
//! at startup and shared read-only with every subsystem.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Raw, unresolved settings as they arrive from a file, the environment or flags.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RawSettings {
    /// Registered store backend name (`memory`, `localdisk`).
    pub store: String,

    /// Storage path handed to the backend.
    pub path: String,

    /// Log level (trace, debug, info, warn, error, fatal).
    pub log_level: String,

    /// Log file path. Empty logs to stdout.
    pub log_file: String,

    /// Host the SQL listener binds to.
    pub host: String,

    /// Port the SQL listener binds to.
    pub port: String,

    /// Port of the HTTP status service.
    pub status_port: String,

    /// Unix socket path for local clients. Empty disables it.
    pub socket: String,

    /// Explicit secure transport switch.
    pub ssl: bool,

    /// Trusted CA bundle (PEM) used to verify client certificates.
    pub ssl_ca: String,

    /// Server certificate chain (PEM).
    pub ssl_cert: String,

    /// Server private key (PEM).
    pub ssl_key: String,

    /// Schema lease, e.g. `10s` or `10`.
    pub lease: String,

    /// Statistics lease, e.g. `3s` or `3`.
    pub stats_lease: String,

    /// Enable the performance schema.
    pub perfschema: bool,

    /// Enable privilege checks.
    pub privilege: bool,

    /// Serve the HTTP status service.
    pub report_status: bool,

    /// Number of workers participating in a join.
    pub join_concurrency: i64,

    /// Allow cartesian products in plans.
    pub cross_join: bool,

    /// Pushgateway address. Empty disables the metrics pusher.
    pub metrics_addr: String,

    /// Push interval in seconds. Zero disables the metrics pusher.
    pub metrics_interval: u64,

    /// Unix socket the binlog pump listens on. Empty disables binlog.
    pub binlog_socket: String,

    /// Run the DDL worker on this server.
    pub run_ddl: bool,

    /// Maximum commit retries for a transaction.
    pub retry_limit: u32,

    /// Start without the privilege system (requires root).
    pub skip_grant_table: bool,

    /// Maximum concurrent client connections (backpressure).
    pub max_connections: usize,
}

impl Default for RawSettings {
    fn default() -> Self {
        Self {
            store: "localdisk".to_string(),
            path: "/tmp/dbserver".to_string(),
            log_level: "info".to_string(),
            log_file: String::new(),
            host: "0.0.0.0".to_string(),
            port: "4000".to_string(),
            status_port: "10080".to_string(),
            socket: String::new(),
            ssl: false,
            ssl_ca: String::new(),
            ssl_cert: String::new(),
            ssl_key: String::new(),
            lease: "10s".to_string(),
            stats_lease: "3s".to_string(),
            perfschema: false,
            privilege: true,
            report_status: true,
            join_concurrency: DEFAULT_JOIN_CONCURRENCY,
            cross_join: true,
            metrics_addr: String::new(),
            metrics_interval: 15,
            binlog_socket: String::new(),
            run_ddl: true,
            retry_limit: 10,
            skip_grant_table: false,
            max_connections: 4096,
        }
    }
}

/// Join concurrency used when the configured value is not positive.
pub const DEFAULT_JOIN_CONCURRENCY: i64 = 5;

/// Resolved server configuration.
///
/// Built once by [`crate::config::resolve`]; never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    /// SQL listener address (`host:port`).
    pub addr: String,

    /// Port component of `addr`, used to name this instance.
    pub port: String,

    /// HTTP status service address.
    pub status_addr: String,

    /// Serve the HTTP status service.
    pub report_status: bool,

    /// Optional Unix socket listener.
    pub socket: Option<PathBuf>,

    /// Maximum concurrent client connections.
    pub max_connections: usize,

    /// Store backend name.
    pub store: String,

    /// Store path.
    pub store_path: String,

    /// Transport security settings.
    pub tls: TlsSettings,

    /// Logging settings.
    pub log: LogSettings,

    /// Schema and statistics leases.
    pub lease: LeaseSettings,

    /// Toggles handed through to the session layer.
    pub session: SessionOptions,

    /// Metrics push settings.
    pub metrics: MetricsSettings,

    /// Binlog pump socket.
    pub binlog_socket: Option<PathBuf>,
}

/// Transport security settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsSettings {
    /// Secure transport requested. Forced on when any path is set.
    pub enabled: bool,

    /// Trusted CA bundle for client verification.
    pub ca_path: Option<PathBuf>,

    /// Certificate chain.
    pub cert_path: Option<PathBuf>,

    /// Private key.
    pub key_path: Option<PathBuf>,
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub level: String,
    pub file: Option<PathBuf>,
}

/// Lease durations consumed by the session domain workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaseSettings {
    /// Schema reload period. Zero disables reloading.
    pub schema: Duration,

    /// Statistics load period. Zero disables loading.
    pub stats: Duration,
}

/// Toggles that this process only carries to the session layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    pub run_ddl: bool,
    pub retry_limit: u32,
    pub join_concurrency: u32,
    pub cross_join: bool,
    pub perfschema: bool,
    pub privilege: bool,
    pub skip_grant_table: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            run_ddl: true,
            retry_limit: 10,
            join_concurrency: DEFAULT_JOIN_CONCURRENCY as u32,
            cross_join: true,
            perfschema: false,
            privilege: true,
            skip_grant_table: false,
        }
    }
}

/// Metrics pusher settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSettings {
    /// Pushgateway address. Empty disables pushing.
    pub addr: String,

    /// Push period. Zero disables pushing.
    pub interval: Duration,
}

impl MetricsSettings {
    /// Whether the pusher should run at all.
    pub fn enabled(&self) -> bool {
        !self.addr.is_empty() && !self.interval.is_zero()
    }
}
