//! Lease-driven domain workers.
//!
//! # Responsibilities
//! - Reload the schema version every schema lease
//! - Load table statistics every stats lease
//! - Renew DDL ownership while this process runs DDL
//!
//! Every worker exits on the domain's shutdown broadcast.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::{self, MissedTickBehavior};
use uuid::Uuid;

use super::{DDL_OWNER_KEY, SCHEMA_VERSION_KEY, STATS_KEY};
use crate::observability::logging::error_chain;
use crate::observability::metrics;
use crate::store::StoreHandle;

/// What a worker does on every lease tick.
#[derive(Debug, Clone)]
pub enum WorkerKind {
    /// Refresh the cached schema version from the store.
    SchemaReload { version: Arc<AtomicI64> },
    /// Refresh the statistics snapshot counter.
    StatsLoad { loads: Arc<AtomicU64> },
    /// Re-assert DDL ownership.
    DdlOwner { owner: Uuid },
}

impl WorkerKind {
    fn name(&self) -> &'static str {
        match self {
            WorkerKind::SchemaReload { .. } => "schema-reload",
            WorkerKind::StatsLoad { .. } => "stats-load",
            WorkerKind::DdlOwner { .. } => "ddl-owner",
        }
    }
}

pub struct LeaseWorker {
    kind: WorkerKind,
    lease: Duration,
    store: StoreHandle,
}

impl LeaseWorker {
    pub fn new(kind: WorkerKind, lease: Duration, store: StoreHandle) -> Self {
        Self { kind, lease, store }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        if self.lease.is_zero() {
            tracing::info!(worker = self.kind.name(), "Lease is zero, worker disabled");
            return;
        }

        tracing::debug!(worker = self.kind.name(), lease = ?self.lease, "Domain worker starting");

        let mut ticker = time::interval(self.lease);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick().await;
                }
                _ = shutdown.recv() => {
                    tracing::debug!(worker = self.kind.name(), "Domain worker stopping");
                    break;
                }
            }
        }
    }

    async fn tick(&self) {
        match &self.kind {
            WorkerKind::SchemaReload { version } => {
                metrics::record_schema_reload();
                match self.store.get(SCHEMA_VERSION_KEY) {
                    Ok(Some(raw)) => match raw.parse::<i64>() {
                        Ok(v) => {
                            let previous = version.swap(v, Ordering::SeqCst);
                            if previous != v {
                                tracing::info!(from = previous, to = v, "Schema version changed");
                            }
                        }
                        Err(_) => tracing::warn!(value = %raw, "Unparsable schema version"),
                    },
                    Ok(None) => tracing::warn!("Schema version missing from store"),
                    Err(e) => tracing::warn!(error = %error_chain(&e), "Schema reload failed"),
                }
            }
            WorkerKind::StatsLoad { loads } => {
                metrics::record_stats_load();
                match self.store.get(STATS_KEY) {
                    Ok(_) => {
                        loads.fetch_add(1, Ordering::SeqCst);
                    }
                    Err(e) => tracing::warn!(error = %error_chain(&e), "Stats load failed"),
                }
            }
            WorkerKind::DdlOwner { owner } => {
                // Store writes may hit the disk.
                let store = StoreHandle::clone(&self.store);
                let owner = owner.to_string();
                match tokio::task::spawn_blocking(move || store.put(DDL_OWNER_KEY, &owner)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        tracing::warn!(error = %error_chain(&e), "DDL owner renewal failed")
                    }
                    Err(e) => tracing::warn!(error = %e, "DDL owner renewal task failed"),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::shutdown::Shutdown;
    use crate::store::{Backend, Memory};

    #[tokio::test(start_paused = true)]
    async fn zero_lease_returns_immediately() {
        let store = Memory::new().open("zero").unwrap();
        let loads = Arc::new(AtomicU64::new(0));
        let shutdown = Shutdown::new();
        let worker = LeaseWorker::new(
            WorkerKind::StatsLoad { loads: Arc::clone(&loads) },
            Duration::ZERO,
            store,
        );
        worker.run(shutdown.subscribe()).await;
        assert_eq!(loads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stats_ticks_until_shutdown() {
        let store = Memory::new().open("stats").unwrap();
        let loads = Arc::new(AtomicU64::new(0));
        let shutdown = Shutdown::new();
        let handle = tokio::spawn(
            LeaseWorker::new(
                WorkerKind::StatsLoad { loads: Arc::clone(&loads) },
                Duration::from_secs(3),
                store,
            )
            .run(shutdown.subscribe()),
        );

        // Ticks at 0s, 3s, 6s.
        time::sleep(Duration::from_secs(7)).await;
        assert_eq!(loads.load(Ordering::SeqCst), 3);

        shutdown.trigger();
        handle.await.unwrap();
        time::sleep(Duration::from_secs(30)).await;
        assert_eq!(loads.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn ddl_owner_is_renewed_every_lease() {
        let store = Memory::new().open("ddl-renew").unwrap();
        let owner = Uuid::new_v4();
        let shutdown = Shutdown::new();
        let handle = tokio::spawn(
            LeaseWorker::new(
                WorkerKind::DdlOwner { owner },
                Duration::from_secs(5),
                StoreHandle::clone(&store),
            )
            .run(shutdown.subscribe()),
        );

        time::sleep(Duration::from_secs(1)).await;
        assert_eq!(store.get(DDL_OWNER_KEY).unwrap(), Some(owner.to_string()));

        store.put(DDL_OWNER_KEY, "another-owner").unwrap();
        time::sleep(Duration::from_secs(5)).await;
        assert_eq!(store.get(DDL_OWNER_KEY).unwrap(), Some(owner.to_string()));

        shutdown.trigger();
        handle.await.unwrap();
    }
}
