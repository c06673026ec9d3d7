//! Server lifecycle.
//!
//! # Data Flow
//! ```text
//! Server::new   → bind client listener(s) and the status address
//! Server::run   → accept loop
//!                   → optional TLS handshake
//!                   → driver handshake written as one JSON line
//!                   → connection held until EOF or close
//! Server::close → Closing; run stops accepting, waits for connections
//!                 and the status service, then reports Stopped
//! ```
//!
//! # States
//! `Constructed → Running → Closing → Stopped`, held in a `watch` channel so
//! `close` can be called from any task while `run` is blocked.
//!
//! # Design Decisions
//! - `close` never blocks and is a no-op once Closing or Stopped
//! - `close` before `run` is latched; `run` then returns at once
//! - No shutdown timeouts: `run` returns when the last connection is gone

pub mod driver;
pub mod error;
pub mod status;

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_rustls::TlsAcceptor;

use crate::config::ServerConfig;
use crate::net::listener::ConnectionPermit;
use crate::net::{Accepted, ConnectionTracker, Listener, ListenerError, Peer, TlsPolicy};
use crate::observability::logging::error_chain;
use crate::observability::metrics;

pub use driver::{Driver, Handshake, StoreDriver};
pub use error::ServerError;
use status::StatusState;

/// Pause after a failed accept before trying again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// Lifecycle state of a [`Server`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Constructed,
    Running,
    Closing,
    Stopped,
}

impl ServerState {
    fn is_closing(self) -> bool {
        matches!(self, ServerState::Closing | ServerState::Stopped)
    }
}

/// Cloneable handle that closes a [`Server`] from another task.
#[derive(Debug, Clone)]
pub struct ServerCloser {
    state: Arc<watch::Sender<ServerState>>,
}

impl ServerCloser {
    /// Request shutdown. Safe to call any number of times from any task.
    pub fn close(&self) {
        let mut previous = ServerState::Stopped;
        self.state.send_if_modified(|state| {
            previous = *state;
            match *state {
                ServerState::Constructed | ServerState::Running => {
                    *state = ServerState::Closing;
                    true
                }
                ServerState::Closing | ServerState::Stopped => false,
            }
        });

        match previous {
            ServerState::Running => tracing::info!("Server closing"),
            ServerState::Constructed => tracing::info!("Server closed before it started running"),
            ServerState::Closing | ServerState::Stopped => {
                tracing::debug!(state = ?previous, "Close ignored")
            }
        }
    }

    pub fn state(&self) -> ServerState {
        *self.state.borrow()
    }
}

/// The client-facing server.
pub struct Server {
    config: Arc<ServerConfig>,
    tls: Option<TlsAcceptor>,
    driver: Arc<dyn Driver>,
    listener: Listener,
    status: Mutex<Option<TcpListener>>,
    status_addr: Option<SocketAddr>,
    tracker: ConnectionTracker,
    state: Arc<watch::Sender<ServerState>>,
}

impl Server {
    /// Bind every listener. Nothing is accepted until [`Server::run`].
    pub async fn new(
        config: Arc<ServerConfig>,
        tls: Option<TlsPolicy>,
        driver: Arc<dyn Driver>,
    ) -> Result<Self, ServerError> {
        let listener = Listener::bind(
            &config.addr,
            config.socket.as_deref(),
            config.max_connections,
        )
        .await?;

        let (status, status_addr) = if config.report_status {
            let status = TcpListener::bind(&config.status_addr)
                .await
                .map_err(|source| ServerError::StatusBind {
                    addr: config.status_addr.clone(),
                    source,
                })?;
            let addr = status.local_addr().ok();
            (Some(status), addr)
        } else {
            (None, None)
        };

        let (state, _) = watch::channel(ServerState::Constructed);

        tracing::info!(
            driver = driver.name(),
            secure = tls.is_some(),
            status = ?status_addr,
            "Server constructed"
        );

        Ok(Self {
            config,
            tls: tls.map(|policy| policy.acceptor()),
            driver,
            listener,
            status: Mutex::new(status),
            status_addr,
            tracker: ConnectionTracker::new(),
            state: Arc::new(state),
        })
    }

    /// Address of the TCP client listener.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Address of the status service, if reporting is enabled.
    pub fn status_addr(&self) -> Option<SocketAddr> {
        self.status_addr
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn state(&self) -> ServerState {
        *self.state.borrow()
    }

    /// Live client connections.
    pub fn connection_count(&self) -> u64 {
        self.tracker.active_count()
    }

    pub fn closer(&self) -> ServerCloser {
        ServerCloser {
            state: Arc::clone(&self.state),
        }
    }

    /// Request shutdown. See [`ServerCloser::close`].
    pub fn close(&self) {
        self.closer().close();
    }

    /// Serve until closed.
    ///
    /// Returns once accepting has stopped, every connection has ended and
    /// the status service has shut down.
    pub async fn run(&self) -> Result<(), ServerError> {
        let mut start = Err(ServerError::AlreadyStopped);
        self.state.send_if_modified(|state| match *state {
            ServerState::Constructed => {
                *state = ServerState::Running;
                start = Ok(true);
                true
            }
            ServerState::Closing => {
                *state = ServerState::Stopped;
                start = Ok(false);
                true
            }
            ServerState::Running => {
                start = Err(ServerError::AlreadyRunning);
                false
            }
            ServerState::Stopped => false,
        });
        if !start? {
            tracing::info!("Server was closed before running");
            return Ok(());
        }

        tracing::info!(
            address = ?self.listener.local_addr().ok(),
            socket = ?self.listener.socket_path(),
            "Server is running"
        );

        let status_task = self.spawn_status();
        let accept_result = self.accept_loop().await;

        // Also reached on a fatal accept error.
        self.state.send_if_modified(|state| {
            if *state == ServerState::Running {
                *state = ServerState::Closing;
                true
            } else {
                false
            }
        });

        let active = self.tracker.active_count();
        if active > 0 {
            tracing::info!(active, "Waiting for connections to drain");
        }
        self.tracker.wait_for_drain().await;

        let status_result = match status_task {
            Some((addr, task)) => match task.await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(source)) => Err(ServerError::Status { addr, source }),
                Err(e) => {
                    tracing::error!(error = %e, "Status service task failed");
                    Ok(())
                }
            },
            None => Ok(()),
        };

        self.state.send_replace(ServerState::Stopped);
        tracing::info!("Server stopped");

        accept_result.and(status_result)
    }

    fn spawn_status(
        &self,
    ) -> Option<(SocketAddr, tokio::task::JoinHandle<std::io::Result<()>>)> {
        let listener = self
            .status
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()?;
        let addr = self.status_addr?;

        let state = StatusState {
            tracker: self.tracker.clone(),
            gatherer: Arc::new(metrics::init_metrics()),
        };
        let mut closing = self.state.subscribe();
        let shutdown = async move { wait_closing(&mut closing).await };
        Some((addr, tokio::spawn(status::serve(listener, state, shutdown))))
    }

    async fn accept_loop(&self) -> Result<(), ServerError> {
        let mut closing = self.state.subscribe();
        loop {
            tokio::select! {
                _ = wait_closing(&mut closing) => return Ok(()),
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer, permit)) => self.spawn_connection(stream, peer, permit),
                    Err(ListenerError::Accept(e)) => {
                        tracing::warn!(error = %e, "Accept failed");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                    Err(e) => return Err(e.into()),
                },
            }
        }
    }

    fn spawn_connection(&self, stream: Accepted, peer: Peer, permit: ConnectionPermit) {
        let guard = self.tracker.track();
        let handshake = self.driver.handshake(guard.id());
        let tls = self.tls.clone();
        let closing = self.state.subscribe();

        tokio::spawn(async move {
            let id = guard.id();
            tracing::debug!(connection_id = %id, peer = %peer, "Connection opened");
            if let Err(e) = handle_connection(stream, tls, handshake, closing).await {
                tracing::debug!(connection_id = %id, error = %error_chain(&e), "Connection ended with error");
            }
            drop(permit);
            drop(guard);
        });
    }
}

/// Resolve once the server is Closing or Stopped.
async fn wait_closing(state: &mut watch::Receiver<ServerState>) {
    let _ = state.wait_for(|s| s.is_closing()).await;
}

async fn handle_connection(
    stream: Accepted,
    tls: Option<TlsAcceptor>,
    mut handshake: Handshake,
    mut closing: watch::Receiver<ServerState>,
) -> std::io::Result<()> {
    match (stream, tls) {
        (Accepted::Tcp(tcp), Some(acceptor)) => {
            let tls_stream = tokio::select! {
                res = acceptor.accept(tcp) => res?,
                _ = wait_closing(&mut closing) => return Ok(()),
            };
            handshake.secure = true;
            hold(tls_stream, &handshake, closing).await
        }
        (Accepted::Tcp(tcp), None) => hold(tcp, &handshake, closing).await,
        (Accepted::Unix(unix), _) => hold(unix, &handshake, closing).await,
    }
}

/// Greet the client, then keep the connection until the peer hangs up or
/// the server closes.
async fn hold<S>(
    mut stream: S,
    handshake: &Handshake,
    mut closing: watch::Receiver<ServerState>,
) -> std::io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut line = serde_json::to_vec(handshake)?;
    line.push(b'\n');
    stream.write_all(&line).await?;
    stream.flush().await?;

    let mut buf = [0u8; 1024];
    loop {
        tokio::select! {
            read = stream.read(&mut buf) => {
                if read? == 0 {
                    return Ok(());
                }
            }
            _ = wait_closing(&mut closing) => {
                return stream.shutdown().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::net::TcpStream;

    use super::*;
    use crate::config::RawSettings;
    use crate::store::{Backend, Memory};

    fn config(report_status: bool) -> Arc<ServerConfig> {
        let mut raw = RawSettings::default();
        raw.host = "127.0.0.1".into();
        raw.port = "0".into();
        raw.status_port = "0".into();
        raw.report_status = report_status;
        Arc::new(raw.resolve().unwrap())
    }

    async fn server(report_status: bool) -> Server {
        let store = Memory::new().open("server-tests").unwrap();
        Server::new(config(report_status), None, Arc::new(StoreDriver::new(store)))
            .await
            .unwrap()
    }

    async fn within<T>(fut: impl std::future::Future<Output = T>) -> T {
        tokio::time::timeout(Duration::from_secs(5), fut)
            .await
            .expect("timed out")
    }

    #[tokio::test]
    async fn close_unblocks_run() {
        let server = Arc::new(server(false).await);
        let runner = tokio::spawn({
            let server = Arc::clone(&server);
            async move { server.run().await }
        });

        let mut state = server.state.subscribe();
        within(state.wait_for(|s| *s == ServerState::Running)).await.unwrap();

        server.close();
        within(runner).await.unwrap().unwrap();
        assert_eq!(server.state(), ServerState::Stopped);
    }

    #[tokio::test]
    async fn concurrent_double_close_is_harmless() {
        let server = Arc::new(server(false).await);
        let runner = tokio::spawn({
            let server = Arc::clone(&server);
            async move { server.run().await }
        });
        let mut state = server.state.subscribe();
        within(state.wait_for(|s| *s == ServerState::Running)).await.unwrap();

        let a = server.closer();
        let b = server.closer();
        let (ra, rb) = tokio::join!(
            tokio::spawn(async move { a.close() }),
            tokio::spawn(async move { b.close() }),
        );
        ra.unwrap();
        rb.unwrap();

        within(runner).await.unwrap().unwrap();
        server.close();
        assert_eq!(server.state(), ServerState::Stopped);
    }

    #[tokio::test]
    async fn close_before_run_is_latched() {
        let server = server(false).await;
        server.close();
        assert_eq!(server.state(), ServerState::Closing);

        within(server.run()).await.unwrap();
        assert_eq!(server.state(), ServerState::Stopped);
        assert!(matches!(
            server.run().await,
            Err(ServerError::AlreadyStopped)
        ));
    }

    #[tokio::test]
    async fn second_run_is_rejected() {
        let server = Arc::new(server(false).await);
        let runner = tokio::spawn({
            let server = Arc::clone(&server);
            async move { server.run().await }
        });
        let mut state = server.state.subscribe();
        within(state.wait_for(|s| *s == ServerState::Running)).await.unwrap();

        assert!(matches!(server.run().await, Err(ServerError::AlreadyRunning)));

        server.close();
        within(runner).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn client_gets_handshake_and_is_released_on_close() {
        let server = Arc::new(server(false).await);
        let addr = server.local_addr().unwrap();
        let runner = tokio::spawn({
            let server = Arc::clone(&server);
            async move { server.run().await }
        });

        let client = TcpStream::connect(addr).await.unwrap();
        let mut lines = BufReader::new(client).lines();
        let line = within(lines.next_line()).await.unwrap().unwrap();
        let handshake: Handshake = serde_json::from_str(&line).unwrap();
        assert_eq!(handshake.store, "memory://server-tests");
        assert!(!handshake.secure);
        assert_eq!(server.connection_count(), 1);

        server.close();
        // Server side shuts the stream down, so the client sees EOF.
        assert_eq!(within(lines.next_line()).await.unwrap(), None);
        within(runner).await.unwrap().unwrap();
        assert_eq!(server.connection_count(), 0);
    }

    #[tokio::test]
    async fn status_service_runs_with_the_server() {
        let server = Arc::new(server(true).await);
        // Bound on 0.0.0.0; reach it through loopback.
        let status_addr = SocketAddr::from(([127, 0, 0, 1], server.status_addr().unwrap().port()));
        let runner = tokio::spawn({
            let server = Arc::clone(&server);
            async move { server.run().await }
        });
        let mut state = server.state.subscribe();
        within(state.wait_for(|s| *s == ServerState::Running)).await.unwrap();

        let status: status::ServerStatus = reqwest::get(format!("http://{status_addr}/status"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(status.connections, 0);

        server.close();
        within(runner).await.unwrap().unwrap();
        assert!(TcpStream::connect(status_addr).await.is_err());
    }
}
