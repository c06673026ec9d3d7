//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use dbserver::config::{RawSettings, ServerConfig};
use dbserver::lifecycle::{bootstrap, Bootstrapped, Signal};
use dbserver::server::Handshake;
use dbserver::store::StoreRegistry;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Settings for a loopback server on ephemeral ports with no push and no
/// status service.
pub fn settings(store: &str, path: &str) -> RawSettings {
    RawSettings {
        store: store.into(),
        path: path.into(),
        host: "127.0.0.1".into(),
        port: "0".into(),
        status_port: "0".into(),
        report_status: false,
        metrics_interval: 0,
        ..RawSettings::default()
    }
}

pub fn resolve(raw: RawSettings) -> Arc<ServerConfig> {
    Arc::new(raw.resolve().expect("settings resolve"))
}

/// A served instance plus the handle that delivers its signals.
pub struct Running {
    pub addr: SocketAddr,
    pub status_addr: Option<SocketAddr>,
    pub signals: mpsc::Sender<Signal>,
    pub serve: JoinHandle<()>,
}

impl Running {
    /// Deliver a signal and wait for the full teardown.
    pub async fn stop(self, signal: Signal) {
        self.signals.send(signal).await.expect("coordinator alive");
        within(self.serve).await.expect("serve task");
    }
}

/// Bootstrap with the built-in backends and start serving on a task.
pub async fn start(config: Arc<ServerConfig>) -> Running {
    let bootstrapped = bootstrap(config, &StoreRegistry::with_builtin())
        .await
        .expect("bootstrap");
    start_bootstrapped(bootstrapped)
}

pub fn start_bootstrapped(bootstrapped: Bootstrapped) -> Running {
    let addr = bootstrapped.server().local_addr().expect("local addr");
    let status_addr = bootstrapped
        .server()
        .status_addr()
        .map(|a| SocketAddr::from(([127, 0, 0, 1], a.port())));
    let (signals, rx) = mpsc::channel(4);
    let serve = tokio::spawn(bootstrapped.serve(rx));
    Running {
        addr,
        status_addr,
        signals,
        serve,
    }
}

/// Read the greeting line a server sends on connect.
pub async fn read_handshake<S: AsyncRead + Unpin>(stream: S) -> (Handshake, BufReader<S>) {
    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    within(reader.read_line(&mut line)).await.expect("handshake line");
    let handshake = serde_json::from_str(line.trim_end()).expect("handshake json");
    (handshake, reader)
}

/// Fail the test instead of hanging.
pub async fn within<T>(fut: impl Future<Output = T>) -> T {
    tokio::time::timeout(Duration::from_secs(10), fut)
        .await
        .expect("timed out")
}

/// Self-signed certificate for `localhost`.
pub struct Certificate {
    pub cert: PathBuf,
    pub key: PathBuf,
    pub der: Vec<u8>,
}

pub fn self_signed(dir: &Path) -> Certificate {
    let rcgen::CertifiedKey { cert, key_pair } =
        rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
    let cert_path = dir.join("cert.pem");
    let key_path = dir.join("key.pem");
    std::fs::write(&cert_path, cert.pem()).unwrap();
    std::fs::write(&key_path, key_pair.serialize_pem()).unwrap();
    Certificate {
        cert: cert_path,
        key: key_path,
        der: cert.der().to_vec(),
    }
}
