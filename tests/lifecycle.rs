//! End-to-end startup, serving and shutdown.

mod common;

use std::sync::Arc;

use dbserver::lifecycle::{bootstrap, Signal, StartupError};
use dbserver::server::status::ServerStatus;
use dbserver::server::ServerState;
use dbserver::session::{BOOTSTRAP_KEY, CURRENT_BOOTSTRAP_VERSION};
use dbserver::store::{Backend, LocalDisk, StoreRegistry};
use rustls::pki_types::{CertificateDer, ServerName};
use tokio::io::AsyncBufReadExt;
use tokio::net::{TcpStream, UnixStream};
use tokio_rustls::TlsConnector;

use common::{read_handshake, resolve, settings, start, within};

#[tokio::test]
async fn memory_store_serves_until_signal() {
    let running = start(resolve(settings("memory", "/tmp/x"))).await;

    let client = TcpStream::connect(running.addr).await.unwrap();
    let (handshake, mut reader) = read_handshake(client).await;
    assert_eq!(handshake.store, "memory:///tmp/x");
    assert!(!handshake.secure);

    running.stop(Signal::Interrupt).await;

    // The server hung up on its way down.
    let mut rest = String::new();
    assert_eq!(within(reader.read_line(&mut rest)).await.unwrap(), 0);
}

#[tokio::test]
async fn repeated_signals_are_harmless() {
    let running = start(resolve(settings("memory", "repeated-signals"))).await;

    running.signals.send(Signal::Terminate).await.unwrap();
    // The coordinator may already be gone; either outcome is fine.
    let _ = running.signals.send(Signal::Hangup).await;

    within(running.serve).await.unwrap();
}

#[tokio::test]
async fn missing_key_material_falls_back_to_plaintext() {
    let mut raw = settings("memory", "plaintext-fallback");
    raw.ssl_cert = "/nonexistent/cert.pem".into();
    raw.ssl_key = "/nonexistent/key.pem".into();
    let config = resolve(raw);
    assert!(config.tls.enabled);

    let running = start(config).await;
    let client = TcpStream::connect(running.addr).await.unwrap();
    let (handshake, _reader) = read_handshake(client).await;
    assert!(!handshake.secure);

    running.stop(Signal::Terminate).await;
}

#[tokio::test]
async fn tls_clients_get_a_secure_handshake() {
    let dir = tempfile::tempdir().unwrap();
    let cert = common::self_signed(dir.path());

    let mut raw = settings("memory", "tls");
    raw.ssl_cert = cert.cert.display().to_string();
    raw.ssl_key = cert.key.display().to_string();
    let running = start(resolve(raw)).await;

    let mut roots = rustls::RootCertStore::empty();
    roots.add(CertificateDer::from(cert.der.clone())).unwrap();
    let client_config = rustls::ClientConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .unwrap()
    .with_root_certificates(roots)
    .with_no_client_auth();
    let connector = TlsConnector::from(Arc::new(client_config));

    let tcp = TcpStream::connect(running.addr).await.unwrap();
    let tls = within(connector.connect(ServerName::try_from("localhost").unwrap(), tcp))
        .await
        .unwrap();
    let (handshake, _reader) = read_handshake(tls).await;
    assert!(handshake.secure);

    running.stop(Signal::Quit).await;
}

#[tokio::test]
async fn status_service_reports_connections() {
    let mut raw = settings("memory", "status");
    raw.report_status = true;
    let running = start(resolve(raw)).await;
    let status_addr = running.status_addr.unwrap();

    let client = TcpStream::connect(running.addr).await.unwrap();
    let (_handshake, reader) = read_handshake(client).await;

    let status: ServerStatus = reqwest::get(format!("http://{status_addr}/status"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status.connections, 1);

    let metrics = reqwest::get(format!("http://{status_addr}/metrics"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(metrics.contains("dbserver_connections"), "{metrics}");

    drop(reader);
    running.stop(Signal::Terminate).await;
}

#[tokio::test]
async fn unix_socket_clients_are_served() {
    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("dbserver.sock");
    let mut raw = settings("memory", "unix");
    raw.socket = socket.display().to_string();
    let running = start(resolve(raw)).await;

    let client = UnixStream::connect(&socket).await.unwrap();
    let (handshake, _reader) = read_handshake(client).await;
    assert_eq!(handshake.store, "memory://unix");

    running.stop(Signal::Terminate).await;
}

#[tokio::test]
async fn localdisk_catalog_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data").display().to_string();

    start(resolve(settings("localdisk", &path)))
        .await
        .stop(Signal::Terminate)
        .await;

    let store = LocalDisk::new().open(&path).unwrap();
    assert_eq!(
        store.get(BOOTSTRAP_KEY).unwrap(),
        Some(CURRENT_BOOTSTRAP_VERSION.to_string())
    );
}

#[tokio::test]
async fn unknown_store_fails_before_binding() {
    let err = bootstrap(
        resolve(settings("goleveldb", "/tmp/x")),
        &StoreRegistry::with_builtin(),
    )
    .await
    .err()
    .unwrap();
    assert!(matches!(err, StartupError::Store(_)));
    assert!(err.to_string().contains("store"));
}

#[tokio::test]
async fn server_is_stopped_after_serve() {
    let bootstrapped = bootstrap(
        resolve(settings("memory", "stopped-state")),
        &StoreRegistry::with_builtin(),
    )
    .await
    .unwrap();
    let closer = bootstrapped.server().closer();
    assert_eq!(closer.state(), ServerState::Constructed);

    let running = common::start_bootstrapped(bootstrapped);
    running.stop(Signal::Hangup).await;
    assert_eq!(closer.state(), ServerState::Stopped);
}
