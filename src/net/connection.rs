//! Client connection identity and live-connection accounting.
//!
//! The live count is published through a `watch` channel so a closing
//! server can await the moment it reaches zero instead of polling.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::watch;

use crate::observability::metrics;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique client connection number, written `conn-N` in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Allocate the next id.
    pub fn new() -> Self {
        ConnectionId(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Counts open client connections.
#[derive(Debug, Clone)]
pub struct ConnectionTracker {
    live: Arc<watch::Sender<u64>>,
}

impl Default for ConnectionTracker {
    fn default() -> Self {
        let (live, _) = watch::channel(0);
        Self {
            live: Arc::new(live),
        }
    }
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an open connection. The count drops again with the guard.
    pub fn track(&self) -> ConnectionGuard {
        let mut live = 0;
        self.live.send_modify(|n| {
            *n += 1;
            live = *n;
        });
        metrics::record_connection_opened(live);
        ConnectionGuard {
            live: Arc::clone(&self.live),
            id: ConnectionId::new(),
        }
    }

    /// Connections currently open.
    pub fn active_count(&self) -> u64 {
        *self.live.borrow()
    }

    /// Resolve once no connection is open.
    pub async fn wait_for_drain(&self) {
        let mut live = self.live.subscribe();
        // The sender is owned by `self`, so the channel cannot close here.
        let _ = live.wait_for(|n| *n == 0).await;
    }
}

/// Keeps one connection counted while alive.
#[derive(Debug)]
pub struct ConnectionGuard {
    live: Arc<watch::Sender<u64>>,
    id: ConnectionId,
}

impl ConnectionGuard {
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let mut live = 0;
        self.live.send_modify(|n| {
            *n = n.saturating_sub(1);
            live = *n;
        });
        metrics::record_connection_closed(live);
        tracing::trace!(connection_id = %self.id, live, "Connection released");
    }
}
