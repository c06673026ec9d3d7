//! Startup orchestration.
//!
//! # Responsibilities
//! - Run the fatal pre-serving steps in order: privilege, TLS, store,
//!   binlog, session domain, server
//! - Start the background tasks once the server exists
//! - Tear down in order: server run returns, then the domain closes
//!
//! # Design Decisions
//! - Fail fast: every step before serving returns a [`StartupError`]
//! - TLS problems are never fatal; the server falls back to plaintext
//! - The exit code is decided by `main` alone

use std::sync::Arc;
use std::time::SystemTime;

use thiserror::Error;

use crate::binlog::{BinlogClient, BinlogError};
use crate::config::validation::{check_privilege, has_root_privilege, PrivilegeError};
use crate::config::{ConfigError, ServerConfig};
use crate::lifecycle::signals::{spawn_coordinator, OsSignals, SignalSource};
use crate::net::build_tls_policy;
use crate::observability::clock::start_clock_monitor;
use crate::observability::logging::{error_chain, LoggingError};
use crate::observability::metrics::{self, init_metrics};
use crate::observability::push::{instance_name, start_pusher, HttpPushClient};
use crate::server::{Server, ServerError, StoreDriver};
use crate::session::{bootstrap_session, Domain, SessionError};
use crate::store::{StoreError, StoreHandle, StoreRegistry, StoreUri};

/// Any failure that stops the process before it serves.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid configuration")]
    Config(#[from] ConfigError),

    #[error("failed to initialize logging")]
    Logging(#[from] LoggingError),

    #[error("privilege check failed")]
    Privilege(#[from] PrivilegeError),

    #[error("failed to open store")]
    Store(#[from] StoreError),

    #[error("failed to open binlog channel")]
    Binlog(#[from] BinlogError),

    #[error("failed to bootstrap session")]
    Session(#[from] SessionError),

    #[error("failed to create server")]
    Server(#[from] ServerError),

    #[error("failed to install signal handlers")]
    Signals(#[source] std::io::Error),
}

/// Everything built by [`bootstrap`], ready to serve.
pub struct Bootstrapped {
    config: Arc<ServerConfig>,
    domain: Domain,
    server: Server,
}

/// Run the fatal startup sequence.
pub async fn bootstrap(
    config: Arc<ServerConfig>,
    registry: &StoreRegistry,
) -> Result<Bootstrapped, StartupError> {
    check_privilege(config.session.skip_grant_table, has_root_privilege())?;

    let tls = build_tls_policy(&config.tls);

    let uri = StoreUri::new(&config.store, &config.store_path);
    let store = registry.open(&uri)?;

    let binlog = match &config.binlog_socket {
        Some(path) => Some(BinlogClient::connect(path).await?),
        None => None,
    };

    let domain = bootstrap_session(
        StoreHandle::clone(&store),
        config.lease,
        config.session,
        binlog,
    )
    .await?;

    let driver = Arc::new(StoreDriver::new(store));
    let server = match Server::new(Arc::clone(&config), tls, driver).await {
        Ok(server) => server,
        Err(e) => {
            domain.close().await;
            return Err(e.into());
        }
    };

    Ok(Bootstrapped {
        config,
        domain,
        server,
    })
}

impl Bootstrapped {
    pub fn server(&self) -> &Server {
        &self.server
    }

    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    /// Serve until the first signal from `signals`, then tear down.
    ///
    /// Errors from the server's run are logged, never returned: once
    /// serving has begun the process exits cleanly.
    pub async fn serve<S: SignalSource>(self, signals: S) {
        let Bootstrapped {
            config,
            domain,
            server,
        } = self;

        let coordinator = spawn_coordinator(signals, server.closer());
        let clock = start_clock_monitor(SystemTime::now, metrics::record_time_jump_back);

        let port = server.local_addr().map(|addr| addr.port()).unwrap_or_default();
        let pusher = start_pusher(
            &config.metrics.addr,
            config.metrics.interval,
            &instance_name(port),
            Arc::new(init_metrics()),
            HttpPushClient::new(),
        );

        if let Err(e) = server.run().await {
            tracing::error!(error = %error_chain(&e), "Server run failed");
        }

        domain.close().await;

        coordinator.abort();
        clock.abort();
        if let Some(pusher) = pusher {
            pusher.abort();
        }
        tracing::info!("Shutdown complete");
    }
}

/// Bootstrap with the built-in store backends and serve until an OS signal.
pub async fn run(config: ServerConfig) -> Result<(), StartupError> {
    let registry = StoreRegistry::with_builtin();
    let signals = OsSignals::install().map_err(StartupError::Signals)?;
    let bootstrapped = bootstrap(Arc::new(config), &registry).await?;
    bootstrapped.serve(signals).await;
    Ok(())
}
