//! Session domain bootstrap.
//!
//! # Responsibilities
//! - Create the schema catalog on first start, load or upgrade it afterwards
//! - Refuse to run against a catalog written by a newer server
//! - Own the lease workers and the optional binlog channel
//!
//! # Design Decisions
//! - One domain per process, closed only after the server has stopped
//! - Workers share a broadcast stop signal; closing waits for all of them

pub mod workers;

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::binlog::{BinlogClient, BinlogError};
use crate::config::{LeaseSettings, SessionOptions};
use crate::lifecycle::shutdown::Shutdown;
use crate::store::{StoreError, StoreHandle};
use workers::{LeaseWorker, WorkerKind};

/// Store key holding the bootstrap version of the catalog.
pub const BOOTSTRAP_KEY: &str = "m_bootstrap_version";

/// Store key holding the schema version.
pub const SCHEMA_VERSION_KEY: &str = "m_schema_version";

/// Store key holding the current DDL owner id.
pub const DDL_OWNER_KEY: &str = "m_ddl_owner";

/// Store key holding the statistics snapshot.
pub const STATS_KEY: &str = "m_stats";

/// Bootstrap version written by this server.
pub const CURRENT_BOOTSTRAP_VERSION: i64 = 2;

/// Schema version of a freshly created catalog.
pub const INITIAL_SCHEMA_VERSION: i64 = 1;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("store access failed during bootstrap")]
    Store(#[from] StoreError),

    #[error("catalog bootstrap version {found} is newer than supported version {supported}")]
    NewerBootstrap { found: i64, supported: i64 },

    #[error("invalid value {value:?} for {key}")]
    InvalidVersion { key: &'static str, value: String },

    #[error("failed to record bootstrap in binlog")]
    Binlog(#[from] BinlogError),
}

/// How the catalog was brought up to date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapOutcome {
    Created,
    Upgraded { from: i64 },
    Loaded,
}

/// Process-wide schema and statistics context.
pub struct Domain {
    store: StoreHandle,
    options: SessionOptions,
    outcome: BootstrapOutcome,
    schema_version: Arc<AtomicI64>,
    stats_loads: Arc<AtomicU64>,
    ddl_owner: Option<Uuid>,
    binlog: Option<Arc<BinlogClient>>,
    shutdown: Shutdown,
    workers: Vec<JoinHandle<()>>,
}

impl std::fmt::Debug for Domain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Domain")
            .field("store", &self.store.uri())
            .field("outcome", &self.outcome)
            .field("schema_version", &self.schema_version())
            .field("ddl_owner", &self.ddl_owner)
            .field("workers", &self.workers.len())
            .finish()
    }
}

/// Bootstrap the catalog in `store` and start the domain workers.
pub async fn bootstrap_session(
    store: StoreHandle,
    leases: LeaseSettings,
    options: SessionOptions,
    binlog: Option<BinlogClient>,
) -> Result<Domain, SessionError> {
    let outcome = bootstrap_catalog(&store)?;
    let schema_version = read_version(&store, SCHEMA_VERSION_KEY)?.unwrap_or(INITIAL_SCHEMA_VERSION);

    let binlog = binlog.map(Arc::new);
    if let (Some(binlog), BootstrapOutcome::Created | BootstrapOutcome::Upgraded { .. }) =
        (&binlog, outcome)
    {
        let record = serde_json::json!({
            "event": "bootstrap",
            "version": CURRENT_BOOTSTRAP_VERSION,
        });
        binlog.write_binlog(record.to_string().as_bytes()).await?;
    }

    let ddl_owner = options.run_ddl.then(Uuid::new_v4);
    if let Some(owner) = ddl_owner {
        store.put(DDL_OWNER_KEY, &owner.to_string())?;
    }

    let mut domain = Domain {
        store,
        options,
        outcome,
        schema_version: Arc::new(AtomicI64::new(schema_version)),
        stats_loads: Arc::new(AtomicU64::new(0)),
        ddl_owner,
        binlog,
        shutdown: Shutdown::new(),
        workers: Vec::new(),
    };
    domain.start_workers(leases);

    tracing::info!(
        store = domain.store.uri(),
        outcome = ?outcome,
        schema_version,
        ddl_owner = ?ddl_owner,
        join_concurrency = options.join_concurrency,
        cross_join = options.cross_join,
        retry_limit = options.retry_limit,
        "Session domain bootstrapped"
    );
    Ok(domain)
}

/// Bring the catalog's bootstrap marker up to [`CURRENT_BOOTSTRAP_VERSION`].
fn bootstrap_catalog(store: &StoreHandle) -> Result<BootstrapOutcome, SessionError> {
    match read_version(store, BOOTSTRAP_KEY)? {
        None => {
            store.put(SCHEMA_VERSION_KEY, &INITIAL_SCHEMA_VERSION.to_string())?;
            store.put(BOOTSTRAP_KEY, &CURRENT_BOOTSTRAP_VERSION.to_string())?;
            Ok(BootstrapOutcome::Created)
        }
        Some(found) if found > CURRENT_BOOTSTRAP_VERSION => Err(SessionError::NewerBootstrap {
            found,
            supported: CURRENT_BOOTSTRAP_VERSION,
        }),
        Some(found) if found < CURRENT_BOOTSTRAP_VERSION => {
            tracing::info!(from = found, to = CURRENT_BOOTSTRAP_VERSION, "Upgrading catalog");
            store.put(BOOTSTRAP_KEY, &CURRENT_BOOTSTRAP_VERSION.to_string())?;
            Ok(BootstrapOutcome::Upgraded { from: found })
        }
        Some(_) => Ok(BootstrapOutcome::Loaded),
    }
}

fn read_version(store: &StoreHandle, key: &'static str) -> Result<Option<i64>, SessionError> {
    store
        .get(key)?
        .map(|value| {
            value
                .trim()
                .parse::<i64>()
                .map_err(|_| SessionError::InvalidVersion { key, value })
        })
        .transpose()
}

impl Domain {
    fn start_workers(&mut self, leases: LeaseSettings) {
        let mut spawn = |kind: WorkerKind, lease| {
            let worker = LeaseWorker::new(kind, lease, StoreHandle::clone(&self.store));
            let rx = self.shutdown.subscribe();
            self.workers.push(tokio::spawn(worker.run(rx)));
        };

        spawn(
            WorkerKind::SchemaReload {
                version: Arc::clone(&self.schema_version),
            },
            leases.schema,
        );
        spawn(
            WorkerKind::StatsLoad {
                loads: Arc::clone(&self.stats_loads),
            },
            leases.stats,
        );
        if let Some(owner) = self.ddl_owner {
            spawn(WorkerKind::DdlOwner { owner }, leases.schema);
        }
    }

    /// Schema version as of the last reload.
    pub fn schema_version(&self) -> i64 {
        self.schema_version.load(Ordering::SeqCst)
    }

    /// Completed statistics loads.
    pub fn stats_loads(&self) -> u64 {
        self.stats_loads.load(Ordering::SeqCst)
    }

    pub fn outcome(&self) -> BootstrapOutcome {
        self.outcome
    }

    /// DDL owner id, present when this process runs DDL.
    pub fn ddl_owner(&self) -> Option<Uuid> {
        self.ddl_owner
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn binlog(&self) -> Option<&Arc<BinlogClient>> {
        self.binlog.as_ref()
    }

    /// Stop every worker and wait for them to finish.
    pub async fn close(self) {
        self.shutdown.trigger();
        for handle in self.workers {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Domain worker ended abnormally");
            }
        }
        tracing::info!(store = self.store.uri(), "Session domain closed");
    }
}
