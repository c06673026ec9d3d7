use std::net::SocketAddr;

use thiserror::Error;

use crate::net::ListenerError;

/// Error type for the server lifecycle.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("client listener failed")]
    Listener(#[from] ListenerError),

    #[error("failed to bind status address {addr}")]
    StatusBind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("status service on {addr} failed")]
    Status {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("server is already running")]
    AlreadyRunning,

    #[error("server has already stopped")]
    AlreadyStopped,
}
