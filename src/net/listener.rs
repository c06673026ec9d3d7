//! Client listeners.
//!
//! One TCP listener for the SQL address plus an optional Unix socket, both
//! drawing from a single pool of connection slots. A full pool stalls
//! `accept` until a slot is released.

use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tokio::net::{TcpListener, TcpStream, UnixListener, UnixStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("cannot bind {0}")]
    Bind(String, #[source] std::io::Error),

    #[error("accept failed")]
    Accept(#[source] std::io::Error),

    #[error("connection slots closed")]
    Closed,
}

/// Where a connection came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Peer {
    Tcp(SocketAddr),
    Unix,
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Peer::Tcp(addr) => write!(f, "{}", addr),
            Peer::Unix => write!(f, "unix-socket"),
        }
    }
}

/// An accepted client stream.
#[derive(Debug)]
pub enum Accepted {
    Tcp(TcpStream),
    Unix(UnixStream),
}

/// TCP listener plus optional Unix socket sharing `max_connections` slots.
pub struct Listener {
    tcp: TcpListener,
    unix: Option<UnixSocket>,
    slots: Arc<Semaphore>,
    max_connections: usize,
}

impl Listener {
    /// Bind the TCP address and optional Unix socket with connection limits.
    pub async fn bind(
        addr: &str,
        socket: Option<&Path>,
        max_connections: usize,
    ) -> Result<Self, ListenerError> {
        let tcp = TcpListener::bind(addr)
            .await
            .map_err(|e| ListenerError::Bind(addr.to_string(), e))?;

        let local_addr = tcp
            .local_addr()
            .map_err(|e| ListenerError::Bind(addr.to_string(), e))?;

        let unix = socket.map(UnixSocket::bind).transpose()?;

        tracing::info!(
            address = %local_addr,
            socket = ?socket,
            max_connections,
            "Listener bound"
        );

        Ok(Self {
            tcp,
            unix,
            slots: Arc::new(Semaphore::new(max_connections)),
            max_connections,
        })
    }

    /// Wait for a free slot, then for the next client on either listener.
    ///
    /// The returned permit holds the slot until it is dropped.
    pub async fn accept(&self) -> Result<(Accepted, Peer, ConnectionPermit), ListenerError> {
        let slot = Arc::clone(&self.slots)
            .acquire_owned()
            .await
            .map_err(|_| ListenerError::Closed)?;

        let (stream, peer) = tokio::select! {
            res = self.tcp.accept() => {
                let (stream, addr) = res.map_err(ListenerError::Accept)?;
                (Accepted::Tcp(stream), Peer::Tcp(addr))
            }
            res = accept_unix(self.unix.as_ref()) => {
                (Accepted::Unix(res.map_err(ListenerError::Accept)?), Peer::Unix)
            }
        };

        tracing::debug!(
            peer = %peer,
            free_slots = self.slots.available_permits(),
            "Client accepted"
        );

        Ok((stream, peer, ConnectionPermit { _slot: slot }))
    }

    /// Bound TCP address.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.tcp.local_addr()
    }

    /// Path of the Unix socket, if one is bound.
    pub fn socket_path(&self) -> Option<&Path> {
        self.unix.as_ref().map(|s| s.path.as_path())
    }

    /// Free connection slots.
    pub fn available_permits(&self) -> usize {
        self.slots.available_permits()
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }
}

async fn accept_unix(socket: Option<&UnixSocket>) -> std::io::Result<UnixStream> {
    match socket {
        Some(socket) => socket.inner.accept().await.map(|(stream, _)| stream),
        None => std::future::pending().await,
    }
}

/// Unix socket listener that removes its socket file when dropped.
struct UnixSocket {
    inner: UnixListener,
    path: PathBuf,
}

impl UnixSocket {
    fn bind(path: &Path) -> Result<Self, ListenerError> {
        let bind_err = |e| ListenerError::Bind(path.display().to_string(), e);

        // A stale socket from a previous run would make bind fail.
        match std::fs::remove_file(path) {
            Ok(()) => tracing::debug!(path = %path.display(), "Removed stale socket file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(bind_err(e)),
        }

        let inner = UnixListener::bind(path).map_err(bind_err)?;
        Ok(Self {
            inner,
            path: path.to_path_buf(),
        })
    }
}

impl Drop for UnixSocket {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// One occupied connection slot, released on drop.
#[derive(Debug)]
pub struct ConnectionPermit {
    _slot: OwnedSemaphorePermit,
}
