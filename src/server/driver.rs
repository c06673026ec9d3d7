//! Storage driver adapter.
//!
//! The wire protocol lives outside this crate. The server only asks its
//! driver for the greeting to send on each new connection.

use serde::{Deserialize, Serialize};

use crate::net::ConnectionId;
use crate::store::StoreHandle;
use crate::version;

/// Greeting written to a client as one JSON line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handshake {
    pub connection_id: u64,
    pub server_version: String,
    pub store: String,
    /// Set by the server when the connection went through TLS.
    #[serde(default)]
    pub secure: bool,
}

/// What the server needs from the storage layer.
pub trait Driver: Send + Sync + 'static {
    /// Short name for logs.
    fn name(&self) -> &str;

    fn handshake(&self, id: ConnectionId) -> Handshake;
}

/// Exposes a [`StoreHandle`] as a [`Driver`].
#[derive(Debug, Clone)]
pub struct StoreDriver {
    store: StoreHandle,
}

impl StoreDriver {
    pub fn new(store: StoreHandle) -> Self {
        Self { store }
    }
}

impl Driver for StoreDriver {
    fn name(&self) -> &str {
        self.store.uri()
    }

    fn handshake(&self, id: ConnectionId) -> Handshake {
        Handshake {
            connection_id: id.as_u64(),
            server_version: version::RELEASE_VERSION.to_string(),
            store: self.store.uri().to_string(),
            secure: false,
        }
    }
}
