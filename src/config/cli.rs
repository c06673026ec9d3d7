//! Command-line and environment surface.

use std::path::PathBuf;

use clap::Parser;

use crate::config::schema::RawSettings;

/// Database server
///
/// Every option may also be given through the matching `DBSERVER_*`
/// environment variable. Options left unset fall back to the `--config`
/// file, then to built-in defaults.
#[derive(Parser, Debug, Default)]
#[command(name = "dbserver")]
#[command(about = "Database server process")]
#[command(disable_version_flag = true)]
pub struct Args {
    /// Print version information and exit
    #[arg(short = 'V', long = "version")]
    pub version: bool,

    /// TOML settings file
    #[arg(long, env = "DBSERVER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Registered store name [memory, localdisk]
    #[arg(long, env = "DBSERVER_STORE")]
    pub store: Option<String>,

    /// Storage path
    #[arg(long, env = "DBSERVER_PATH")]
    pub path: Option<String>,

    /// Log level: trace, debug, info, warn, error, fatal
    #[arg(short = 'L', long = "log-level", env = "DBSERVER_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Log file path
    #[arg(long = "log-file", env = "DBSERVER_LOG_FILE")]
    pub log_file: Option<String>,

    /// Server host
    #[arg(long, env = "DBSERVER_HOST")]
    pub host: Option<String>,

    /// Server port
    #[arg(short = 'P', long, env = "DBSERVER_PORT")]
    pub port: Option<String>,

    /// Status service port
    #[arg(long = "status", env = "DBSERVER_STATUS_PORT")]
    pub status_port: Option<String>,

    /// Unix socket file for local connections
    #[arg(long, env = "DBSERVER_SOCKET")]
    pub socket: Option<String>,

    /// Enable secure connections
    #[arg(long, env = "DBSERVER_SSL", num_args = 0..=1, default_missing_value = "true")]
    pub ssl: Option<bool>,

    /// File with the list of trusted SSL CAs
    #[arg(long = "ssl-ca", env = "DBSERVER_SSL_CA")]
    pub ssl_ca: Option<String>,

    /// X509 certificate in PEM format
    #[arg(long = "ssl-cert", env = "DBSERVER_SSL_CERT")]
    pub ssl_cert: Option<String>,

    /// X509 key in PEM format
    #[arg(long = "ssl-key", env = "DBSERVER_SSL_KEY")]
    pub ssl_key: Option<String>,

    /// Schema lease duration
    #[arg(long, env = "DBSERVER_LEASE", allow_hyphen_values = true)]
    pub lease: Option<String>,

    /// Statistics lease duration
    #[arg(long = "stats-lease", env = "DBSERVER_STATS_LEASE", allow_hyphen_values = true)]
    pub stats_lease: Option<String>,

    /// Enable the performance schema
    #[arg(long, env = "DBSERVER_PERFSCHEMA", num_args = 0..=1, default_missing_value = "true")]
    pub perfschema: Option<bool>,

    /// Enable privilege checks
    #[arg(long, env = "DBSERVER_PRIVILEGE", num_args = 0..=1, default_missing_value = "true")]
    pub privilege: Option<bool>,

    /// Serve the HTTP status service
    #[arg(long = "report-status", env = "DBSERVER_REPORT_STATUS", num_args = 0..=1, default_missing_value = "true")]
    pub report_status: Option<bool>,

    /// Number of workers participating in a join
    #[arg(long = "join-concurrency", env = "DBSERVER_JOIN_CONCURRENCY", allow_negative_numbers = true)]
    pub join_concurrency: Option<i64>,

    /// Allow cartesian products
    #[arg(long = "cross-join", env = "DBSERVER_CROSS_JOIN", num_args = 0..=1, default_missing_value = "true")]
    pub cross_join: Option<bool>,

    /// Pushgateway address; empty disables metrics push
    #[arg(long = "metrics-addr", env = "DBSERVER_METRICS_ADDR")]
    pub metrics_addr: Option<String>,

    /// Metrics push interval in seconds; 0 disables metrics push
    #[arg(long = "metrics-interval", env = "DBSERVER_METRICS_INTERVAL")]
    pub metrics_interval: Option<u64>,

    /// Socket file to write binlog to
    #[arg(long = "binlog-socket", env = "DBSERVER_BINLOG_SOCKET")]
    pub binlog_socket: Option<String>,

    /// Run the DDL worker on this server
    #[arg(long = "run-ddl", env = "DBSERVER_RUN_DDL", num_args = 0..=1, default_missing_value = "true")]
    pub run_ddl: Option<bool>,

    /// Maximum retries when committing a transaction
    #[arg(long = "retry-limit", env = "DBSERVER_RETRY_LIMIT")]
    pub retry_limit: Option<u32>,

    /// Start without the privilege system (requires root)
    #[arg(long = "skip-grant-table", env = "DBSERVER_SKIP_GRANT_TABLE", num_args = 0..=1, default_missing_value = "true")]
    pub skip_grant_table: Option<bool>,

    /// Maximum concurrent client connections
    #[arg(long = "max-connections", env = "DBSERVER_MAX_CONNECTIONS")]
    pub max_connections: Option<usize>,
}

impl Args {
    /// Overlay every option that was actually given onto `raw`.
    pub fn apply(self, raw: &mut RawSettings) {
        fn set<T>(slot: &mut T, value: Option<T>) {
            if let Some(value) = value {
                *slot = value;
            }
        }

        set(&mut raw.store, self.store);
        set(&mut raw.path, self.path);
        set(&mut raw.log_level, self.log_level);
        set(&mut raw.log_file, self.log_file);
        set(&mut raw.host, self.host);
        set(&mut raw.port, self.port);
        set(&mut raw.status_port, self.status_port);
        set(&mut raw.socket, self.socket);
        set(&mut raw.ssl, self.ssl);
        set(&mut raw.ssl_ca, self.ssl_ca);
        set(&mut raw.ssl_cert, self.ssl_cert);
        set(&mut raw.ssl_key, self.ssl_key);
        set(&mut raw.lease, self.lease);
        set(&mut raw.stats_lease, self.stats_lease);
        set(&mut raw.perfschema, self.perfschema);
        set(&mut raw.privilege, self.privilege);
        set(&mut raw.report_status, self.report_status);
        set(&mut raw.join_concurrency, self.join_concurrency);
        set(&mut raw.cross_join, self.cross_join);
        set(&mut raw.metrics_addr, self.metrics_addr);
        set(&mut raw.metrics_interval, self.metrics_interval);
        set(&mut raw.binlog_socket, self.binlog_socket);
        set(&mut raw.run_ddl, self.run_ddl);
        set(&mut raw.retry_limit, self.retry_limit);
        set(&mut raw.skip_grant_table, self.skip_grant_table);
        set(&mut raw.max_connections, self.max_connections);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("dbserver").chain(argv.iter().copied())).unwrap()
    }

    #[test]
    fn unset_flags_keep_lower_layers() {
        let mut raw = RawSettings {
            store: "memory".into(),
            ..RawSettings::default()
        };
        parse(&["-P", "5000"]).apply(&mut raw);
        assert_eq!(raw.store, "memory");
        assert_eq!(raw.port, "5000");
        assert_eq!(raw.lease, "10s");
    }

    #[test]
    fn bool_flags_accept_bare_and_explicit_forms() {
        let args = parse(&["--ssl", "--run-ddl=false", "--privilege", "false"]);
        assert_eq!(args.ssl, Some(true));
        assert_eq!(args.run_ddl, Some(false));
        assert_eq!(args.privilege, Some(false));
    }

    #[test]
    fn version_flag() {
        assert!(parse(&["-V"]).version);
        assert!(!parse(&[]).version);
    }

    #[test]
    fn negative_join_concurrency_parses() {
        assert_eq!(parse(&["--join-concurrency", "-1"]).join_concurrency, Some(-1));
    }

    #[test]
    fn negative_leases_reach_lease_validation() {
        let args = parse(&["--lease", "-5", "--stats-lease", "-1s"]);
        assert_eq!(args.lease.as_deref(), Some("-5"));
        assert_eq!(args.stats_lease.as_deref(), Some("-1s"));

        let mut raw = RawSettings::default();
        args.apply(&mut raw);
        assert!(matches!(
            raw.resolve(),
            Err(crate::config::ConfigError::SchemaLease(
                crate::config::validation::LeaseError::Negative(_)
            ))
        ));
    }
}
