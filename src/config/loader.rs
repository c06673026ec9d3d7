//! Configuration loading and resolution.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use crate::config::cli::Args;
use crate::config::schema::{
    LeaseSettings, LogSettings, MetricsSettings, RawSettings, ServerConfig, SessionOptions,
    TlsSettings, DEFAULT_JOIN_CONCURRENCY,
};
use crate::config::validation::{is_known_log_level, parse_lease, LeaseError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read settings file {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse settings file {}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid schema lease")]
    SchemaLease(#[source] LeaseError),

    #[error("invalid stats lease")]
    StatsLease(#[source] LeaseError),

    #[error("unknown log level {0:?}")]
    LogLevel(String),

    #[error("max-connections must be positive")]
    MaxConnections,
}

/// Load raw settings from a TOML file. Missing keys keep their defaults.
pub fn load_settings(path: &Path) -> Result<RawSettings, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Resolve the process configuration from parsed arguments.
///
/// Layers: defaults, then the `--config` file if given, then flags and
/// environment. Either the whole configuration resolves or nothing does.
pub fn resolve(args: Args) -> Result<ServerConfig, ConfigError> {
    let mut raw = match &args.config {
        Some(path) => load_settings(path)?,
        None => RawSettings::default(),
    };
    args.apply(&mut raw);
    raw.resolve()
}

impl RawSettings {
    /// Turn raw settings into a typed [`ServerConfig`].
    pub fn resolve(self) -> Result<ServerConfig, ConfigError> {
        let schema = parse_lease(&self.lease).map_err(ConfigError::SchemaLease)?;
        let stats = parse_lease(&self.stats_lease).map_err(ConfigError::StatsLease)?;

        if !is_known_log_level(&self.log_level) {
            return Err(ConfigError::LogLevel(self.log_level));
        }
        if self.max_connections == 0 {
            return Err(ConfigError::MaxConnections);
        }

        // Supplying any key material implies secure transport.
        let implied_tls =
            !self.ssl_ca.is_empty() || !self.ssl_cert.is_empty() || !self.ssl_key.is_empty();

        let join_concurrency = if self.join_concurrency > 0 {
            self.join_concurrency
        } else {
            DEFAULT_JOIN_CONCURRENCY
        };

        Ok(ServerConfig {
            addr: format!("{}:{}", self.host, self.port),
            status_addr: format!("0.0.0.0:{}", self.status_port),
            port: self.port,
            report_status: self.report_status,
            socket: non_empty_path(self.socket),
            max_connections: self.max_connections,
            store: self.store,
            store_path: self.path,
            tls: TlsSettings {
                enabled: self.ssl || implied_tls,
                ca_path: non_empty_path(self.ssl_ca),
                cert_path: non_empty_path(self.ssl_cert),
                key_path: non_empty_path(self.ssl_key),
            },
            log: LogSettings {
                level: self.log_level.to_ascii_lowercase(),
                file: non_empty_path(self.log_file),
            },
            lease: LeaseSettings { schema, stats },
            session: SessionOptions {
                run_ddl: self.run_ddl,
                retry_limit: self.retry_limit,
                join_concurrency: u32::try_from(join_concurrency).unwrap_or(u32::MAX),
                cross_join: self.cross_join,
                perfschema: self.perfschema,
                privilege: self.privilege,
                skip_grant_table: self.skip_grant_table,
            },
            metrics: MetricsSettings {
                addr: self.metrics_addr,
                interval: Duration::from_secs(self.metrics_interval),
            },
            binlog_socket: non_empty_path(self.binlog_socket),
        })
    }
}

fn non_empty_path(value: String) -> Option<PathBuf> {
    (!value.is_empty()).then(|| PathBuf::from(value))
}
